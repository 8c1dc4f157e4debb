use std::sync::Arc;

use crate::Error;
use crate::MockKeeperSession;
use crate::Session;

#[tokio::test]
async fn test_session_exposes_resumption_credentials() {
    let mut mock = MockKeeperSession::new();
    mock.expect_session_id().return_const(77i64);
    mock.expect_session_password().returning(|| b"pw".to_vec());
    mock.expect_close().times(1).returning(|| Ok(()));

    let session = Session::new(Arc::new(mock));

    assert_eq!(session.id(), 77);
    assert_eq!(session.password(), b"pw".to_vec());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_session_close_surfaces_underlying_error() {
    let mut mock = MockKeeperSession::new();
    mock.expect_close()
        .returning(|| Err(Error::Fatal("socket already gone".to_string())));

    let session = Session::new(Arc::new(mock));

    // Callers treat this as best-effort; the error is still reported.
    assert!(session.close().await.is_err());
}
