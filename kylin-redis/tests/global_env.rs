//! First access without `install` builds the holder from `REDIS_CONNECTION`.

mod common;

use kylin_redis::{manager, ENV_CONNECTION};
use kylin_stub::StubServer;

#[test]
fn global_is_created_from_environment() {
    let server = StubServer::start().expect("stub");
    let descriptor = format!("{},defaultDatabase=2", server.connection_string());

    temp_env::with_var(ENV_CONNECTION, Some(descriptor.as_str()), || {
        let context = manager::global().expect("global from env");
        assert_eq!(context.options().default_database(), 2);
        context.get_handle().expect("handle").ping().expect("ping");
    });

    // The holder outlives the variable.
    temp_env::with_var_unset(ENV_CONNECTION, || {
        assert!(manager::global().is_ok());
        assert!(manager::try_global().is_some());
    });
}
