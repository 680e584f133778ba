//! # Connection Options
//!
//! Purpose: Parse the `host:port[,option=value,...]` connection descriptor
//! once, and hand the immutable result to the holder.
//!
//! ## Design Principles
//! 1. **Parse, Don't Validate**: a `RedisOptions` value is always usable;
//!    every malformed input is rejected with `CacheError::Argument`.
//! 2. **Immutable After Construction**: fields are private and only read
//!    through accessors; `with_*` builders consume and return `self`.
//! 3. **No Secret Leakage**: `Debug` redacts the password.
//!
//! ## Recognized options (case-insensitive keys)
//!
//! | key               | meaning                                     |
//! |-------------------|---------------------------------------------|
//! | `password`        | AUTH password                               |
//! | `user`            | ACL user name                               |
//! | `defaultDatabase` | SELECTed database index                     |
//! | `connectTimeout`  | TCP connect timeout, milliseconds           |
//! | `syncTimeout`     | read/write timeout, milliseconds            |
//! | `name`            | client name sent with `CLIENT SETNAME`      |
//! | `abortConnect`    | `false` makes eager `connect()` non-fatal   |
//! | `allowAdmin`      | accepted for compatibility, no effect       |
//! | `ssl`             | only `false` is accepted                    |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, CacheResult};

/// Port used when an endpoint omits one.
pub const DEFAULT_PORT: u16 = 6379;

/// Environment variable read by [`RedisOptions::from_env`].
pub const ENV_CONNECTION: &str = "REDIS_CONNECTION";

/// A single `host:port` server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = CacheError;

    fn from_str(token: &str) -> CacheResult<Self> {
        let token = token.trim();
        let (host, port) = if let Some(rest) = token.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| {
                    CacheError::argument(format!("unterminated IPv6 endpoint `{}`", token))
                })?;
            let port = match after {
                "" => None,
                _ => Some(after.strip_prefix(':').ok_or_else(|| {
                    CacheError::argument(format!("malformed endpoint `{}`", token))
                })?),
            };
            (host, port)
        } else {
            match token.split_once(':') {
                None => (token, None),
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                Some(_) => {
                    return Err(CacheError::argument(format!(
                        "IPv6 endpoint `{}` must be written as [host]:port",
                        token
                    )))
                }
            }
        };

        if host.is_empty() {
            return Err(CacheError::argument(format!("endpoint `{}` has no host", token)));
        }

        let port = match port {
            None => DEFAULT_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(0) | Err(_) => {
                    return Err(CacheError::argument(format!(
                        "invalid port `{}` in endpoint `{}`",
                        raw, token
                    )))
                }
                Ok(port) => port,
            },
        };

        Ok(Endpoint::new(host, port))
    }
}

/// Immutable connection parameters for a [`RedisContext`](crate::RedisContext).
#[derive(Clone, PartialEq, Eq)]
pub struct RedisOptions {
    endpoints: Vec<Endpoint>,
    user: Option<String>,
    password: Option<String>,
    default_database: i64,
    connect_timeout: Option<Duration>,
    sync_timeout: Option<Duration>,
    client_name: Option<String>,
    abort_connect: bool,
    allow_admin: bool,
}

impl RedisOptions {
    /// Creates options for a single endpoint with every setting at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        RedisOptions {
            endpoints: vec![Endpoint::new(host, port)],
            user: None,
            password: None,
            default_database: 0,
            connect_timeout: None,
            sync_timeout: None,
            client_name: None,
            abort_connect: true,
            allow_admin: false,
        }
    }

    /// Parses a connection descriptor such as
    /// `127.0.0.1:6379,password=secret,defaultDatabase=2`.
    pub fn parse(descriptor: &str) -> CacheResult<Self> {
        descriptor.parse()
    }

    /// Loads and parses the descriptor stored in `REDIS_CONNECTION`.
    pub fn from_env() -> CacheResult<Self> {
        let raw = std::env::var(ENV_CONNECTION)
            .map_err(|_| CacheError::argument(format!("{} is not set", ENV_CONNECTION)))?;
        raw.parse()
    }

    /// Adds a fail-over endpoint, tried after the existing ones.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.default_database = database;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_abort_connect(mut self, abort: bool) -> Self {
        self.abort_connect = abort;
        self
    }

    /// Endpoints in fail-over order; never empty.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn default_database(&self) -> i64 {
        self.default_database
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn abort_connect(&self) -> bool {
        self.abort_connect
    }

    pub fn allow_admin(&self) -> bool {
        self.allow_admin
    }

    /// Builds the `redis` crate connection info for one endpoint.
    pub(crate) fn connection_info(&self, endpoint: &Endpoint) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
            redis: redis::RedisConnectionInfo {
                db: self.default_database,
                username: self.user.clone(),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> CacheResult<()> {
        match key.to_ascii_lowercase().as_str() {
            "password" => self.password = non_empty(value),
            "user" => self.user = non_empty(value),
            "name" => self.client_name = non_empty(value),
            "defaultdatabase" => {
                self.default_database = match value.parse::<i64>() {
                    Ok(db) if db >= 0 => db,
                    _ => return Err(invalid_value(key, value)),
                }
            }
            "connecttimeout" => self.connect_timeout = parse_millis(key, value)?,
            "synctimeout" => self.sync_timeout = parse_millis(key, value)?,
            "abortconnect" => self.abort_connect = parse_bool(key, value)?,
            "allowadmin" => self.allow_admin = parse_bool(key, value)?,
            "ssl" => {
                if parse_bool(key, value)? {
                    return Err(CacheError::argument("TLS endpoints are not supported"));
                }
            }
            _ => return Err(CacheError::argument(format!("unknown option `{}`", key))),
        }
        Ok(())
    }
}

impl Default for RedisOptions {
    fn default() -> Self {
        RedisOptions::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl FromStr for RedisOptions {
    type Err = CacheError;

    fn from_str(descriptor: &str) -> CacheResult<Self> {
        if descriptor.trim().is_empty() {
            return Err(CacheError::argument("connection string is empty"));
        }

        let mut options = RedisOptions {
            endpoints: Vec::new(),
            ..RedisOptions::default()
        };

        for token in descriptor.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.split_once('=') {
                Some((key, value)) => options.apply(key.trim(), value.trim())?,
                None => options.endpoints.push(token.parse()?),
            }
        }

        if options.endpoints.is_empty() {
            return Err(CacheError::argument("connection string names no endpoint"));
        }
        Ok(options)
    }
}

impl fmt::Display for RedisOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for endpoint in &self.endpoints {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", endpoint)?;
            first = false;
        }
        if let Some(user) = &self.user {
            write!(f, ",user={}", user)?;
        }
        if let Some(password) = &self.password {
            write!(f, ",password={}", password)?;
        }
        if self.default_database != 0 {
            write!(f, ",defaultDatabase={}", self.default_database)?;
        }
        if let Some(timeout) = self.connect_timeout {
            write!(f, ",connectTimeout={}", timeout.as_millis())?;
        }
        if let Some(timeout) = self.sync_timeout {
            write!(f, ",syncTimeout={}", timeout.as_millis())?;
        }
        if let Some(name) = &self.client_name {
            write!(f, ",name={}", name)?;
        }
        if !self.abort_connect {
            f.write_str(",abortConnect=false")?;
        }
        if self.allow_admin {
            f.write_str(",allowAdmin=true")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RedisOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisOptions")
            .field("endpoints", &self.endpoints)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("default_database", &self.default_database)
            .field("connect_timeout", &self.connect_timeout)
            .field("sync_timeout", &self.sync_timeout)
            .field("client_name", &self.client_name)
            .field("abort_connect", &self.abort_connect)
            .field("allow_admin", &self.allow_admin)
            .finish()
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn invalid_value(key: &str, value: &str) -> CacheError {
    CacheError::argument(format!("invalid value `{}` for option `{}`", value, key))
}

// Zero disables the timeout.
fn parse_millis(key: &str, value: &str) -> CacheResult<Option<Duration>> {
    match value.parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(ms) => Ok(Some(Duration::from_millis(ms))),
        Err(_) => Err(invalid_value(key, value)),
    }
}

fn parse_bool(key: &str, value: &str) -> CacheResult<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(invalid_value(key, value))
    }
}
