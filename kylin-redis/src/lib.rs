//! # Kylin Redis
//!
//! Purpose: Provide a lazily connected, thread-safe Redis holder plus typed
//! accessors that store application values as JSON text.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RedisContext` hides connect, reconnect and teardown.
//! 2. **Extension Trait**: `SerdeCommands` decorates any `redis::ConnectionLike`
//!    with JSON encode/decode, one raw command per call.
//! 3. **Explicit Wiring**: callers own a context built from `RedisOptions`;
//!    the process-wide holder in [`manager`] is an optional thin wrapper.
//! 4. **Fail Fast**: connection failures surface immediately, no retry loop.
//!
//! ## Example
//!
//! ```ignore
//! use kylin_redis::{RedisContext, SerdeCommands};
//!
//! let context = RedisContext::from_connection_string("127.0.0.1:6379,defaultDatabase=2")?;
//! let handle = context.get_handle()?;
//! handle.connection().string_set("user:1", &user)?;
//! let cached: User = handle.connection().string_get("user:1")?;
//! ```

mod codec;
mod commands;
mod context;
mod error;
pub mod manager;
mod options;

pub use commands::{Exclude, LexBound, Order, ScoreRange, SerdeCommands, When};
pub use context::{ContextStats, HandleGuard, RedisContext, RedisHandle};
pub use error::{CacheError, CacheResult};
pub use options::{Endpoint, RedisOptions, DEFAULT_PORT, ENV_CONNECTION};

// Raw command surface, so callers do not need a direct `redis` dependency.
pub use redis::{Commands, ExistenceCheck, SetExpiry, SetOptions};
