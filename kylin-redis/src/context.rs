//! # Connection Holder
//!
//! Purpose: Own the single connection to the cache server, create it on
//! first use, and replace it when it breaks.
//!
//! ## Design Principles
//! 1. **Lazy Initialization**: nothing touches the network until the first
//!    `get_handle()` (or an explicit `connect()`).
//! 2. **Double-Checked Reconnect**: readers take the `RwLock` fast path; the
//!    slow path serializes on a dedicated mutex and re-checks the generation
//!    so only one physical reconnect runs at a time.
//! 3. **RAII Guards**: `HandleGuard` locks the connection for one command
//!    sequence and marks the handle broken when the socket fails; a closed
//!    handle refuses every further command.
//! 4. **Fail Fast**: connect failures go straight back to the caller.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use redis::{ConnectionLike, RedisResult};
use tracing::{debug, info, warn};

use crate::error::{breaks_connection, CacheError, CacheResult};
use crate::options::{Endpoint, RedisOptions};

/// Snapshot of the holder's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Successful physical connects.
    pub connects_total: u64,
    /// Failed connect attempts, one per endpoint tried.
    pub connect_failures_total: u64,
    /// Calls to `reconnect()`.
    pub reconnects_requested: u64,
    /// Generation of the most recent handle (0 before the first connect).
    pub generation: u64,
}

#[derive(Default)]
struct Counters {
    connects_total: AtomicU64,
    connect_failures_total: AtomicU64,
    reconnects_requested: AtomicU64,
    generation: AtomicU64,
}

/// A live connection produced by one physical connect.
pub struct RedisHandle {
    // None once the handle was shut down.
    conn: Mutex<Option<redis::Connection>>,
    generation: u64,
    database: i64,
    endpoint: Endpoint,
    broken: AtomicBool,
}

impl RedisHandle {
    fn new(conn: redis::Connection, generation: u64, database: i64, endpoint: Endpoint) -> Self {
        RedisHandle {
            conn: Mutex::new(Some(conn)),
            generation,
            database,
            endpoint,
            broken: AtomicBool::new(false),
        }
    }

    /// Which connect produced this handle; strictly increasing per holder.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Database index selected on this connection.
    pub fn database(&self) -> i64 {
        self.database
    }

    /// Endpoint this handle is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Locks the connection for exclusive use.
    ///
    /// The guard implements `redis::ConnectionLike`, so both
    /// `redis::Commands` and [`SerdeCommands`](crate::SerdeCommands) work on
    /// it. Once the handle is closed every command fails with
    /// `CacheError::Connection`.
    pub fn connection(&self) -> HandleGuard<'_> {
        HandleGuard {
            handle: self,
            conn: self.conn.lock(),
        }
    }

    /// False once the handle was closed or its socket failed.
    pub fn is_open(&self) -> bool {
        if self.broken.load(Ordering::Acquire) {
            return false;
        }
        // A busy connection is assumed healthy; its guard reports failures.
        self.conn
            .try_lock()
            .map_or(true, |conn| conn.as_ref().map_or(false, |conn| conn.is_open()))
    }

    /// Round-trips a `PING`.
    pub fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection();
        redis::cmd("PING").query::<String>(&mut conn)?;
        Ok(())
    }

    fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::AcqRel) {
            debug!(generation = self.generation, endpoint = %self.endpoint, "handle marked broken");
        }
    }

    // Refuses further commands and drops the socket. A guard held elsewhere
    // keeps the socket until it is released, but can no longer send.
    fn shut_down(&self) {
        self.mark_broken();
        if let Some(mut conn) = self.conn.try_lock() {
            *conn = None;
        }
    }
}

/// Exclusive access to a handle's connection.
pub struct HandleGuard<'a> {
    handle: &'a RedisHandle,
    conn: MutexGuard<'a, Option<redis::Connection>>,
}

impl HandleGuard<'_> {
    fn live(&mut self) -> RedisResult<&mut redis::Connection> {
        if self.handle.broken.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        self.conn.as_mut().ok_or_else(closed_error)
    }

    fn observe<T>(&self, result: RedisResult<T>) -> RedisResult<T> {
        let open = self.conn.as_ref().map_or(false, |conn| conn.is_open());
        match &result {
            Err(err) if breaks_connection(err) => self.handle.mark_broken(),
            _ if !open => self.handle.mark_broken(),
            _ => {}
        }
        result
    }
}

fn closed_error() -> redis::RedisError {
    io::Error::new(io::ErrorKind::NotConnected, "handle is closed").into()
}

impl ConnectionLike for HandleGuard<'_> {
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<redis::Value> {
        let result = self.live().and_then(|conn| conn.req_packed_command(cmd));
        self.observe(result)
    }

    fn req_packed_commands(
        &mut self,
        cmd: &[u8],
        offset: usize,
        count: usize,
    ) -> RedisResult<Vec<redis::Value>> {
        let result = self
            .live()
            .and_then(|conn| conn.req_packed_commands(cmd, offset, count));
        self.observe(result)
    }

    fn get_db(&self) -> i64 {
        self.handle.database
    }

    fn check_connection(&mut self) -> bool {
        let alive = self.live().map_or(false, |conn| conn.check_connection());
        if !alive {
            self.handle.mark_broken();
        }
        alive
    }

    fn is_open(&self) -> bool {
        !self.handle.broken.load(Ordering::Acquire)
            && self.conn.as_ref().map_or(false, |conn| conn.is_open())
    }
}

/// Lazily connected, thread-safe holder of one Redis connection.
pub struct RedisContext {
    options: RedisOptions,
    current: RwLock<Option<Arc<RedisHandle>>>,
    // Serializes connect, reconnect and close.
    gate: Mutex<()>,
    counters: Counters,
}

impl RedisContext {
    /// Creates a holder; no connection is made yet.
    pub fn new(options: RedisOptions) -> Self {
        RedisContext {
            options,
            current: RwLock::new(None),
            gate: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    /// Parses `host:port[,option=value,...]` and creates a holder.
    pub fn from_connection_string(descriptor: &str) -> CacheResult<Self> {
        Ok(RedisContext::new(descriptor.parse()?))
    }

    pub fn options(&self) -> &RedisOptions {
        &self.options
    }

    /// Returns the current handle, connecting first if there is none or the
    /// current one is broken.
    pub fn get_handle(&self) -> CacheResult<Arc<RedisHandle>> {
        let seen = {
            let current = self.current.read();
            match current.as_ref() {
                Some(handle) if handle.is_open() => return Ok(Arc::clone(handle)),
                Some(handle) => Some(handle.generation()),
                None => None,
            }
        };
        self.replace(seen)
    }

    /// Connects up front.
    ///
    /// With `abortConnect=false` a failure is only logged; the next
    /// `get_handle()` tries again.
    pub fn connect(&self) -> CacheResult<()> {
        match self.get_handle() {
            Ok(_) => Ok(()),
            Err(err) if !self.options.abort_connect() => {
                warn!(error = %err, "initial connect failed, continuing without a connection");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Whether a live handle is held. Never touches the network.
    pub fn is_connected(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .map_or(false, |handle| handle.is_open())
    }

    /// Drops the current handle and connects again.
    ///
    /// Callers that queued behind a concurrent reconnect get the handle it
    /// produced instead of reconnecting a second time.
    pub fn reconnect(&self) -> CacheResult<Arc<RedisHandle>> {
        self.counters
            .reconnects_requested
            .fetch_add(1, Ordering::Relaxed);
        let seen = self.current.read().as_ref().map(|handle| handle.generation());
        debug!(generation = ?seen, "reconnect requested");
        self.replace(seen)
    }

    /// Releases the current handle. A later `get_handle()` connects again.
    pub fn close(&self) {
        let _gate = self.gate.lock();
        if let Some(handle) = self.current.write().take() {
            handle.shut_down();
            debug!(generation = handle.generation(), "handle closed");
        }
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            connects_total: self.counters.connects_total.load(Ordering::Relaxed),
            connect_failures_total: self.counters.connect_failures_total.load(Ordering::Relaxed),
            reconnects_requested: self.counters.reconnects_requested.load(Ordering::Relaxed),
            generation: self.counters.generation.load(Ordering::Relaxed),
        }
    }

    // Slow path. `seen` is the generation the caller found stale (None when
    // there was no handle at all).
    fn replace(&self, seen: Option<u64>) -> CacheResult<Arc<RedisHandle>> {
        let _gate = self.gate.lock();

        if let Some(handle) = self.current.read().as_ref() {
            if handle.is_open() && Some(handle.generation()) != seen {
                return Ok(Arc::clone(handle));
            }
        }

        if let Some(old) = self.current.write().take() {
            old.shut_down();
        }

        let handle = Arc::new(self.open_handle()?);
        *self.current.write() = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn open_handle(&self) -> CacheResult<RedisHandle> {
        let mut last_error = None;
        for endpoint in self.options.endpoints() {
            match self.connect_endpoint(endpoint) {
                Ok(conn) => {
                    let generation = self.counters.generation.fetch_add(1, Ordering::Relaxed) + 1;
                    self.counters.connects_total.fetch_add(1, Ordering::Relaxed);
                    let database = self.options.default_database();
                    info!(endpoint = %endpoint, db = database, generation, "connected to redis");
                    return Ok(RedisHandle::new(conn, generation, database, endpoint.clone()));
                }
                Err(err) => {
                    self.counters
                        .connect_failures_total
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(endpoint = %endpoint, error = %err, "failed to connect to redis");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(CacheError::Connection(err)),
            None => Err(CacheError::argument("no endpoint configured")),
        }
    }

    fn connect_endpoint(&self, endpoint: &Endpoint) -> RedisResult<redis::Connection> {
        let client = redis::Client::open(self.options.connection_info(endpoint))?;
        let mut conn = match self.options.connect_timeout() {
            Some(timeout) => client.get_connection_with_timeout(timeout)?,
            None => client.get_connection()?,
        };
        conn.set_read_timeout(self.options.sync_timeout())?;
        conn.set_write_timeout(self.options.sync_timeout())?;
        if let Some(name) = self.options.client_name() {
            redis::cmd("CLIENT")
                .arg("SETNAME")
                .arg(name)
                .query::<()>(&mut conn)?;
        }
        Ok(conn)
    }
}

impl Drop for RedisContext {
    fn drop(&mut self) {
        if let Some(handle) = self.current.get_mut().take() {
            handle.shut_down();
            debug!(generation = handle.generation(), "context dropped, handle closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Duration;

    fn dead_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn unreachable_options() -> RedisOptions {
        RedisOptions::new("127.0.0.1", dead_port()).with_connect_timeout(Duration::from_millis(200))
    }

    #[test]
    fn fresh_context_is_not_connected() {
        let context = RedisContext::new(unreachable_options());
        assert!(!context.is_connected());
        assert_eq!(context.stats(), ContextStats::default());
    }

    #[test]
    fn unreachable_server_surfaces_connection_error() {
        let context = RedisContext::new(unreachable_options());
        let err = context.get_handle().err().unwrap();
        assert!(err.is_connection(), "unexpected error: {:?}", err);
        assert!(!context.is_connected());

        let stats = context.stats();
        assert_eq!(stats.connects_total, 0);
        assert_eq!(stats.connect_failures_total, 1);
        assert_eq!(stats.generation, 0);
    }

    #[test]
    fn every_endpoint_is_tried_before_failing() {
        let options = unreachable_options().with_endpoint(Endpoint::new("127.0.0.1", dead_port()));
        let context = RedisContext::new(options);
        assert!(context.get_handle().is_err());
        assert_eq!(context.stats().connect_failures_total, 2);
    }

    #[test]
    fn eager_connect_honours_abort_connect() {
        let strict = RedisContext::new(unreachable_options());
        assert!(strict.connect().is_err());

        let lenient = RedisContext::new(unreachable_options().with_abort_connect(false));
        assert!(lenient.connect().is_ok());
        assert!(!lenient.is_connected());
    }

    #[test]
    fn reconnect_counts_requests_even_when_failing() {
        let context = RedisContext::new(unreachable_options());
        assert!(context.reconnect().is_err());
        assert!(context.reconnect().is_err());
        assert_eq!(context.stats().reconnects_requested, 2);
    }

    #[test]
    fn close_without_handle_is_a_no_op() {
        let context = RedisContext::new(unreachable_options());
        context.close();
        assert!(!context.is_connected());
    }

    #[test]
    fn closed_handle_error_is_a_connection_error() {
        assert!(CacheError::from(closed_error()).is_connection());
    }

    #[test]
    fn malformed_connection_string_is_rejected() {
        let err = RedisContext::from_connection_string("host,bogus=1").err().unwrap();
        assert!(matches!(err, CacheError::Argument(_)));
    }
}
