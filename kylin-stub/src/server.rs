//! # Stub Server
//!
//! Accept RESP2 connections on a loopback port, parse commands, and run them
//! against the in-memory keyspace.
//!
//! ## Design Principles
//! 1. **Owned Runtime**: the server drives its own tokio runtime on a
//!    dedicated thread, so synchronous tests can use it without `#[tokio::test]`.
//! 2. **Per-Connection Task**: each client gets one task with its own
//!    session state (selected db, auth, name).
//! 3. **Broadcast Control**: `disconnect_all` and `shutdown` are signals the
//!    tasks select on, not shared flags polled in a loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::keyspace;
use crate::metrics::{Metrics, StubStats};
use crate::protocol::{Reply, RespError, RespParser};
use crate::store::Store;

const DATABASES: i64 = 16;
const DISCONNECT_WAIT: Duration = Duration::from_secs(5);

struct Shared {
    store: Store,
    metrics: Metrics,
    password: Option<String>,
    client_names: Mutex<Vec<String>>,
    kick: broadcast::Sender<()>,
}

/// Per-connection state.
struct Session {
    db: i64,
    authenticated: bool,
    quit: bool,
}

/// An in-process Redis-compatible server bound to `127.0.0.1:0`.
///
/// Dropping the server shuts it down.
pub struct StubServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl StubServer {
    /// Starts a server that accepts every client.
    pub fn start() -> io::Result<Self> {
        StubServer::spawn(None)
    }

    /// Starts a server that requires `AUTH <password>` before any command.
    pub fn with_password(password: impl Into<String>) -> io::Result<Self> {
        StubServer::spawn(Some(password.into()))
    }

    fn spawn(password: Option<String>) -> io::Result<Self> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("kylin-stub")
            .enable_all()
            .build()?;

        let (kick, _) = broadcast::channel(4);
        let shared = Arc::new(Shared {
            store: Store::new(),
            metrics: Metrics::new(),
            password,
            client_names: Mutex::new(Vec::new()),
            kick,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(format!("kylin-stub-{}", addr.port()))
            .spawn(move || {
                runtime.block_on(serve(listener, task_shared, shutdown_rx));
                runtime.shutdown_timeout(Duration::from_secs(1));
            })?;

        debug!(%addr, "stub server listening");
        Ok(StubServer {
            addr,
            shared,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port[,password=...]`, ready for `RedisOptions::parse`.
    pub fn connection_string(&self) -> String {
        match &self.shared.password {
            Some(password) => format!("{},password={}", self.addr, password),
            None => self.addr.to_string(),
        }
    }

    pub fn stats(&self) -> StubStats {
        self.shared.metrics.snapshot()
    }

    /// Names registered with `CLIENT SETNAME`, in arrival order.
    pub fn client_names(&self) -> Vec<String> {
        self.shared.client_names.lock().clone()
    }

    /// Whether `key` exists in database `db`.
    pub fn contains_key(&self, db: i64, key: &str) -> bool {
        self.shared.store.contains_key(db, key.as_bytes())
    }

    /// Closes every client socket and waits until all of them are gone.
    ///
    /// The listener stays open; clients may connect again afterwards.
    pub fn disconnect_all(&self) {
        // No receivers means no open connections.
        let _ = self.shared.kick.send(());

        let deadline = Instant::now() + DISCONNECT_WAIT;
        while self.stats().active > 0 {
            if Instant::now() >= deadline {
                warn!(active = self.stats().active, "connections still open after disconnect");
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        debug!("all stub connections closed");
    }

    /// Stops accepting, closes every connection and joins the server thread.
    pub fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("stub server thread panicked");
            }
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve(
    listener: std::net::TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(err) => {
            warn!(error = %err, "stub listener could not be registered");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    shared.metrics.connection_opened();
                    debug!(%peer, "connection accepted");
                    let kick = shared.kick.subscribe();
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, &shared, kick).await {
                            debug!(%peer, error = %err, "connection failed");
                        }
                        shared.metrics.connection_closed();
                        debug!(%peer, "connection closed");
                    });
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
        }
    }
    debug!("stub server stopped");
}

/// Handles a single client connection until EOF, QUIT, a protocol error or
/// a disconnect signal.
async fn handle_connection(
    mut stream: TcpStream,
    shared: &Shared,
    mut kick: broadcast::Receiver<()>,
) -> io::Result<()> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut parser = RespParser::new();
    let mut out = Vec::with_capacity(1024);
    let mut session = Session {
        db: 0,
        authenticated: shared.password.is_none(),
        quit: false,
    };

    loop {
        tokio::select! {
            _ = kick.recv() => return Ok(()),
            read = stream.read_buf(&mut buffer) => {
                if read? == 0 {
                    return Ok(());
                }
            }
        }

        loop {
            match parser.parse(&mut buffer) {
                Ok(Some(args)) => {
                    shared.metrics.command();
                    let reply = dispatch(&args, &mut session, shared);
                    if reply.is_error() {
                        let command = args
                            .first()
                            .map(|name| String::from_utf8_lossy(name).into_owned());
                        debug!(?command, db = session.db, "command rejected");
                    }
                    out.clear();
                    reply.encode(&mut out);
                    stream.write_all(&out).await?;
                    if session.quit {
                        return Ok(());
                    }
                }
                Ok(None) => break,
                Err(RespError::Protocol) => {
                    out.clear();
                    Reply::err("Protocol error").encode(&mut out);
                    stream.write_all(&out).await?;
                    return Ok(());
                }
            }
        }
    }
}

fn dispatch(args: &[Vec<u8>], session: &mut Session, shared: &Shared) -> Reply {
    let name = match args.first() {
        Some(first) => String::from_utf8_lossy(first).to_ascii_uppercase(),
        None => return Reply::err("empty command"),
    };

    match name.as_str() {
        "AUTH" => return handle_auth(args, session, shared),
        "QUIT" => {
            session.quit = true;
            return Reply::ok();
        }
        _ => {}
    }
    if !session.authenticated {
        return Reply::Error("NOAUTH Authentication required.".to_string());
    }

    match name.as_str() {
        "PING" => handle_ping(args),
        "ECHO" if args.len() == 2 => Reply::Bulk(args[1].clone()),
        "ECHO" => Reply::arity("echo"),
        "SELECT" => handle_select(args, session),
        "CLIENT" => handle_client(args, shared),
        "FLUSHDB" => {
            shared.store.flush(session.db);
            Reply::ok()
        }
        _ => shared
            .store
            .with_db(session.db, |db| keyspace::execute(db, &name, args))
            .unwrap_or_else(|| {
                Reply::err(format!("unknown command '{}'", name.to_ascii_lowercase()))
            }),
    }
}

fn handle_ping(args: &[Vec<u8>]) -> Reply {
    match args.len() {
        1 => Reply::Simple("PONG"),
        2 => Reply::Bulk(args[1].clone()),
        _ => Reply::arity("ping"),
    }
}

// `AUTH password` or `AUTH user password`; the user name is not checked.
fn handle_auth(args: &[Vec<u8>], session: &mut Session, shared: &Shared) -> Reply {
    if args.len() != 2 && args.len() != 3 {
        return Reply::arity("auth");
    }
    let expected = match &shared.password {
        Some(password) => password,
        None => {
            session.authenticated = true;
            return Reply::ok();
        }
    };
    if args[args.len() - 1] == expected.as_bytes() {
        session.authenticated = true;
        Reply::ok()
    } else {
        session.authenticated = false;
        Reply::Error("WRONGPASS invalid username-password pair or user is disabled.".to_string())
    }
}

fn handle_select(args: &[Vec<u8>], session: &mut Session) -> Reply {
    if args.len() != 2 {
        return Reply::arity("select");
    }
    let index = std::str::from_utf8(&args[1])
        .ok()
        .and_then(|text| text.parse::<i64>().ok());
    match index {
        Some(index) if (0..DATABASES).contains(&index) => {
            session.db = index;
            Reply::ok()
        }
        Some(_) => Reply::err("DB index is out of range"),
        None => Reply::err("value is not an integer or out of range"),
    }
}

// Every CLIENT subcommand succeeds; SETNAME is recorded for inspection.
fn handle_client(args: &[Vec<u8>], shared: &Shared) -> Reply {
    let is_setname = args
        .get(1)
        .map_or(false, |sub| sub.eq_ignore_ascii_case(b"SETNAME"));
    if is_setname {
        if let Some(name) = args.get(2) {
            shared
                .client_names
                .lock()
                .push(String::from_utf8_lossy(name).into_owned());
        }
    }
    Reply::ok()
}
