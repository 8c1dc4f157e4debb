use std::time::Duration;

use serial_test::serial;
use temp_env::with_vars;

use crate::ClientOptions;

#[test]
fn test_default_timeouts_match_conventions() {
    let options = ClientOptions::new("127.0.0.1:2181");

    assert_eq!(options.connection_string, "127.0.0.1:2181");
    assert_eq!(options.connection_timeout(), Duration::from_secs(10));
    assert_eq!(options.session_timeout(), Duration::from_secs(20));
    assert_eq!(options.operating_timeout(), Duration::from_secs(60));
    assert!(!options.read_only);
    assert_eq!(options.session_id, 0);
    assert!(options.session_password.is_none());
    assert!(options.base_path.is_none());
}

#[test]
fn test_chained_setters_override_defaults() {
    let options = ClientOptions::new("10.0.0.1:2181,10.0.0.2:2181")
        .with_connection_timeout(Duration::from_secs(3))
        .with_session_timeout(Duration::from_secs(5))
        .with_operating_timeout(Duration::from_millis(1500))
        .with_read_only(true)
        .with_session(42, b"secret".to_vec())
        .with_base_path("/apps/demo");

    assert_eq!(options.connection_timeout(), Duration::from_secs(3));
    assert_eq!(options.session_timeout(), Duration::from_secs(5));
    assert_eq!(options.operating_timeout(), Duration::from_millis(1500));
    assert!(options.read_only);
    assert_eq!(options.session_id, 42);
    assert_eq!(options.session_password.as_deref(), Some(&b"secret"[..]));
    assert_eq!(options.base_path.as_deref(), Some("/apps/demo"));
}

#[test]
#[serial]
fn test_load_reads_environment_overlay() {
    with_vars(
        vec![
            ("ZK__CONNECTION_STRING", Some("10.1.1.1:2181")),
            ("ZK__OPERATING_TIMEOUT_MS", Some("1234")),
        ],
        || {
            let options =
                ClientOptions::load(None).expect("env overlay should satisfy required fields");

            assert_eq!(options.connection_string, "10.1.1.1:2181");
            assert_eq!(options.operating_timeout(), Duration::from_millis(1234));
            // Untouched fields keep their defaults
            assert_eq!(options.session_timeout(), Duration::from_secs(20));
        },
    );
}
