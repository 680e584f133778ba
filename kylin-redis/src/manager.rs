//! Process-wide holder.
//!
//! A thin optional wrapper over one [`RedisContext`] stored in a
//! `OnceCell`. Code that can receive a context explicitly should do so;
//! this exists for hosts that want a single shared holder.

use once_cell::sync::OnceCell;
use tracing::info;

use crate::context::RedisContext;
use crate::error::{CacheError, CacheResult};
use crate::options::RedisOptions;

static GLOBAL: OnceCell<RedisContext> = OnceCell::new();

/// Installs the process-wide holder. Fails if one is already installed.
pub fn install(options: RedisOptions) -> CacheResult<&'static RedisContext> {
    let mut installed = false;
    let context = GLOBAL.get_or_init(|| {
        installed = true;
        RedisContext::new(options)
    });
    if !installed {
        return Err(CacheError::argument("global redis context is already installed"));
    }
    info!(endpoints = context.options().endpoints().len(), "global redis context installed");
    Ok(context)
}

/// Parses a connection string and installs the process-wide holder.
pub fn install_from_str(descriptor: &str) -> CacheResult<&'static RedisContext> {
    install(descriptor.parse()?)
}

/// Returns the installed holder, creating it from `REDIS_CONNECTION` on
/// first access.
pub fn global() -> CacheResult<&'static RedisContext> {
    GLOBAL.get_or_try_init(|| {
        let options = RedisOptions::from_env()?;
        info!("global redis context created from environment");
        Ok(RedisContext::new(options))
    })
}

/// Returns the holder if one has been installed or created.
pub fn try_global() -> Option<&'static RedisContext> {
    GLOBAL.get()
}
