//! # Kylin Console
//!
//! Purpose: Exercise the process-wide holder the way a host application
//! would: one thread writes a key every 100 ms, another reads the keys back
//! every 200 ms starting one second later.
//!
//! Usage: `kylin-console [connection-string] [count] [prefix]`
//! (defaults: `127.0.0.1:6379`, `50`, `kylin:`). Log level via `RUST_LOG`.

use std::env;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use kylin_redis::{manager, SerdeCommands};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONNECTION: &str = "127.0.0.1:6379";
const DEFAULT_COUNT: usize = 50;
const DEFAULT_PREFIX: &str = "kylin:";

const WRITE_INTERVAL: Duration = Duration::from_millis(100);
const READ_DELAY: Duration = Duration::from_secs(1);
const READ_INTERVAL: Duration = Duration::from_millis(200);

struct DemoConfig {
    connection: String,
    count: usize,
    prefix: String,
}

impl DemoConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let connection = args.next().unwrap_or_else(|| DEFAULT_CONNECTION.to_string());
        let count = args
            .next()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_COUNT);
        let prefix = args.next().unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        DemoConfig {
            connection,
            count,
            prefix,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DemoConfig::from_args();
    let context = manager::install_from_str(&config.connection)
        .with_context(|| format!("invalid connection string `{}`", config.connection))?;
    context.connect().context("initial connect failed")?;
    // Not fatal: every worker fetches its own handle.
    if let Err(err) = context.get_handle().and_then(|handle| handle.ping()) {
        warn!(error = %err, "PING failed, continuing");
    }

    let writer = {
        let prefix = config.prefix.clone();
        let count = config.count;
        thread::spawn(move || -> anyhow::Result<()> {
            for i in 0..count {
                let key = format!("{}{}", prefix, i);
                let handle = manager::global()?.get_handle()?;
                handle.connection().string_set(&key, &i)?;
                info!(%key, value = i, "written");
                thread::sleep(WRITE_INTERVAL);
            }
            Ok(())
        })
    };

    let reader = {
        let prefix = config.prefix.clone();
        let count = config.count;
        thread::spawn(move || -> anyhow::Result<()> {
            thread::sleep(READ_DELAY);
            for j in 0..count {
                let key = format!("{}{}", prefix, j);
                let handle = manager::global()?.get_handle()?;
                match handle.connection().string_get_opt::<usize>(&key)? {
                    Some(value) => info!(%key, value, "read"),
                    None => warn!(%key, "not written yet"),
                }
                thread::sleep(READ_INTERVAL);
            }
            Ok(())
        })
    };

    for (role, worker) in [("writer", writer), ("reader", reader)] {
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("{} thread panicked", role))??;
    }

    let stats = context.stats();
    info!(
        connects = stats.connects_total,
        failures = stats.connect_failures_total,
        generation = stats.generation,
        "demo finished"
    );
    Ok(())
}
