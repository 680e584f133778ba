#![allow(dead_code)]

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use kylin_redis::{RedisContext, RedisOptions};
use kylin_stub::StubServer;
use serde::{Deserialize, Serialize};

pub fn options_for(server: &StubServer) -> RedisOptions {
    RedisOptions::parse(&server.connection_string())
        .expect("stub connection string")
        .with_connect_timeout(Duration::from_secs(1))
        .with_sync_timeout(Duration::from_secs(2))
}

pub fn context_for(server: &StubServer) -> RedisContext {
    RedisContext::new(options_for(server))
}

/// A loopback port nothing listens on.
pub fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub tags: Vec<String>,
    pub active: bool,
}

impl User {
    pub fn new(id: u32, name: &str) -> Self {
        User {
            id,
            name: name.to_string(),
            tags: vec![format!("group-{}", id % 2)],
            active: id % 2 == 1,
        }
    }
}
