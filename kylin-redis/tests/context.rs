mod common;

use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use kylin_redis::{CacheError, Endpoint, RedisContext, RedisOptions, SerdeCommands};
use kylin_stub::StubServer;

use common::{context_for, dead_port, options_for, wait_until};

#[test]
fn connects_lazily_on_first_handle() {
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);
    assert!(!context.is_connected());
    assert_eq!(server.stats().accepted, 0);

    let handle = context.get_handle().expect("handle");
    handle.ping().expect("ping");
    assert!(context.is_connected());
    assert_eq!(handle.generation(), 1);
    assert_eq!(server.stats().accepted, 1);

    // Fast path returns the same handle without another connect.
    let again = context.get_handle().expect("handle");
    assert_eq!(again.generation(), 1);
    assert_eq!(context.stats().connects_total, 1);
}

#[test]
fn reconnect_twice_yields_usable_handles() {
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);

    let first = context.reconnect().expect("first reconnect");
    first.ping().expect("ping first");
    let second = context.reconnect().expect("second reconnect");
    second.ping().expect("ping second");

    assert_eq!(first.generation(), 1);
    assert_eq!(second.generation(), 2);
    assert!(!first.is_open());
    assert!(second.is_open());

    let stats = context.stats();
    assert_eq!(stats.reconnects_requested, 2);
    assert_eq!(stats.connects_total, 2);
    assert_eq!(stats.generation, 2);
}

#[test]
fn concurrent_first_access_connects_once() {
    const CALLERS: usize = 16;
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);
    let barrier = Barrier::new(CALLERS);

    let generations: Vec<u64> = thread::scope(|scope| {
        let workers: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let handle = context.get_handle().expect("handle");
                    handle.ping().expect("ping");
                    handle.generation()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().expect("worker")).collect()
    });

    assert!(generations.iter().all(|&g| g == 1), "{:?}", generations);
    assert_eq!(context.stats().connects_total, 1);
    assert_eq!(server.stats().accepted, 1);
}

#[test]
fn concurrent_reconnects_settle_on_one_open_handle() {
    const CALLERS: usize = 8;
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);
    context.get_handle().expect("initial handle");
    let barrier = Barrier::new(CALLERS);

    thread::scope(|scope| {
        for _ in 0..CALLERS {
            scope.spawn(|| {
                barrier.wait();
                let handle = context.reconnect().expect("reconnect");
                assert!(handle.generation() >= 2);
            });
        }
    });

    let stats = context.stats();
    assert_eq!(stats.reconnects_requested, CALLERS as u64);
    // Waiters reuse the handle produced while they queued.
    assert!(stats.connects_total >= 2 && stats.connects_total <= CALLERS as u64 + 1);
    assert!(context.is_connected());
    context.get_handle().expect("handle").ping().expect("ping");
}

#[test]
fn server_disconnect_is_detected_and_replaced() {
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);

    let handle = context.get_handle().expect("handle");
    handle.connection().string_set("survivor", &42).expect("set");

    server.disconnect_all();

    let err = handle
        .connection()
        .string_get::<i32>("survivor")
        .expect_err("socket was closed");
    assert!(err.is_connection(), "unexpected error: {:?}", err);
    assert!(!handle.is_open());
    assert!(!context.is_connected());

    let fresh = context.get_handle().expect("replacement handle");
    assert_eq!(fresh.generation(), 2);
    let value: i32 = fresh.connection().string_get("survivor").expect("get");
    assert_eq!(value, 42);
    assert_eq!(server.stats().accepted, 2);
}

#[test]
fn concurrent_access_after_disconnect_reconnects_once() {
    const CALLERS: usize = 16;
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);
    context.get_handle().expect("handle").ping().expect("ping");

    server.disconnect_all();
    let stale = context.get_handle().expect("stale handle");
    assert!(stale.ping().expect_err("socket was closed").is_connection());
    assert!(!context.is_connected());

    let barrier = Barrier::new(CALLERS);
    let generations: Vec<u64> = thread::scope(|scope| {
        let workers: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let handle = context.get_handle().expect("handle");
                    handle.ping().expect("ping");
                    handle.generation()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().expect("worker")).collect()
    });

    assert!(generations.iter().all(|&g| g == 2), "{:?}", generations);
    assert_eq!(context.stats().connects_total, 2);
    assert_eq!(server.stats().accepted, 2);
}

#[test]
fn closed_handle_refuses_commands() {
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);

    let old = context.get_handle().expect("handle");
    context.close();

    let err = old
        .connection()
        .string_set("after_close", &1)
        .expect_err("closed handle must not write");
    assert!(err.is_connection(), "unexpected error: {:?}", err);
    assert!(!server.contains_key(0, "after_close"));
    // The socket is released even though `old` is still held.
    assert!(wait_until(|| server.stats().active == 0));
}

#[test]
fn replaced_handle_refuses_commands() {
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);

    let first = context.get_handle().expect("handle");
    let second = context.reconnect().expect("reconnect");
    assert_eq!(second.generation(), 2);

    let err = first
        .connection()
        .string_set("stale_write", &1)
        .expect_err("replaced handle must not write");
    assert!(err.is_connection(), "unexpected error: {:?}", err);
    assert!(!server.contains_key(0, "stale_write"));

    second.connection().string_set("fresh_write", &1).expect("set");
    assert!(server.contains_key(0, "fresh_write"));
}

#[test]
fn close_releases_and_next_access_reconnects() {
    let server = StubServer::start().expect("stub");
    let context = context_for(&server);

    let old = context.get_handle().expect("handle");
    context.close();
    assert!(!context.is_connected());
    assert!(!old.is_open());
    drop(old);
    assert!(wait_until(|| server.stats().active == 0));

    let handle = context.get_handle().expect("handle after close");
    assert_eq!(handle.generation(), 2);
    handle.ping().expect("ping");
}

#[test]
fn dropping_context_closes_connection() {
    let server = StubServer::start().expect("stub");
    {
        let context = context_for(&server);
        context.get_handle().expect("handle").ping().expect("ping");
        assert_eq!(server.stats().active, 1);
    }
    assert!(wait_until(|| server.stats().active == 0));
}

#[test]
fn unreachable_server_fails_fast_without_retry() {
    let options = RedisOptions::new("127.0.0.1", dead_port())
        .with_connect_timeout(Duration::from_millis(300));
    let context = RedisContext::new(options);

    let err = context.get_handle().err().expect("connect must fail");
    assert!(matches!(err, CacheError::Connection(_)));
    assert_eq!(context.stats().connect_failures_total, 1);
}

#[test]
fn fails_over_to_next_endpoint() {
    let server = StubServer::start().expect("stub");
    let options = RedisOptions::new("127.0.0.1", dead_port())
        .with_endpoint(Endpoint::new("127.0.0.1", server.addr().port()))
        .with_connect_timeout(Duration::from_millis(500));
    let context = RedisContext::new(options);

    let handle = context.get_handle().expect("second endpoint");
    assert_eq!(handle.endpoint().port, server.addr().port());
    let stats = context.stats();
    assert_eq!(stats.connect_failures_total, 1);
    assert_eq!(stats.connects_total, 1);
}

#[test]
fn password_is_sent_on_connect() {
    let server = StubServer::with_password("kylinjonfee++").expect("stub");
    let context = context_for(&server);
    context.get_handle().expect("authenticated").ping().expect("ping");

    let wrong = RedisContext::new(options_for(&server).with_password("nope"));
    let err = wrong.get_handle().err().expect("auth must fail");
    assert!(err.is_connection(), "unexpected error: {:?}", err);
}

#[test]
fn default_database_is_selected() {
    let server = StubServer::start().expect("stub");
    let context = RedisContext::new(options_for(&server).with_database(5));

    let handle = context.get_handle().expect("handle");
    assert_eq!(handle.database(), 5);
    handle.connection().string_set("scoped", "value").expect("set");

    assert!(server.contains_key(5, "scoped"));
    assert!(!server.contains_key(0, "scoped"));
}

#[test]
fn client_name_is_registered() {
    let server = StubServer::start().expect("stub");
    let descriptor = format!("{},name=kylin-test", server.connection_string());
    let context = RedisContext::from_connection_string(&descriptor).expect("options");

    context.get_handle().expect("handle");
    assert_eq!(server.client_names(), vec!["kylin-test".to_string()]);
}

#[test]
fn lenient_connect_logs_instead_of_failing() {
    let port = dead_port();
    let options = RedisOptions::new("127.0.0.1", port)
        .with_connect_timeout(Duration::from_millis(300))
        .with_abort_connect(false);
    let context = RedisContext::new(options);

    context.connect().expect("lenient connect");
    assert!(!context.is_connected());
    assert_eq!(context.stats().connect_failures_total, 1);
}
