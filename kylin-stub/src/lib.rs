//! # Kylin Stub
//!
//! Purpose: A small in-process RESP2 server that speaks enough of the Redis
//! command set for `kylin-redis` integration tests, so they run without an
//! external Redis.
//!
//! ## Design Principles
//! 1. **Real Sockets**: clients connect over loopback TCP, so the real
//!    `redis` client code path is exercised end to end.
//! 2. **Observable**: counters, registered client names and key lookups let
//!    tests assert on what reached the server.
//! 3. **Fault Injection**: `disconnect_all` drops every client socket to
//!    simulate a server-side disconnect.
//!
//! ## Example
//!
//! ```ignore
//! let server = kylin_stub::StubServer::start()?;
//! let context = kylin_redis::RedisContext::from_connection_string(&server.connection_string())?;
//! context.get_handle()?.ping()?;
//! assert_eq!(server.stats().accepted, 1);
//! ```

mod keyspace;
mod metrics;
mod protocol;
mod server;
mod store;

pub use metrics::StubStats;
pub use server::StubServer;
