//! Shared plumbing for unit tests: the in-memory service, client
//! construction helpers, and channel-backed notification probes.

mod sim;

pub use sim::*;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::ChildrenChange;
use crate::ChildrenChangeHandler;
use crate::ClientOptions;
use crate::DataChange;
use crate::DataChangeHandler;
use crate::KeeperState;
use crate::StateChangeHandler;
use crate::ZkClient;

/// Options tuned for tests: short budgets so failure paths resolve quickly.
pub fn sim_options() -> ClientOptions {
    ClientOptions::new("sim:2181")
        .with_operating_timeout(Duration::from_secs(5))
        .with_connection_timeout(Duration::from_secs(1))
}

pub async fn sim_client(hub: &Arc<SimHub>) -> ZkClient {
    ZkClient::connect(sim_options(), SimConnector::new(hub.clone()))
        .await
        .expect("sim connect never fails")
}

pub async fn sim_client_with_options(hub: &Arc<SimHub>, options: ClientOptions) -> ZkClient {
    ZkClient::connect(options, SimConnector::new(hub.clone()))
        .await
        .expect("sim connect never fails")
}

/// Handler that forwards every data notification into a channel.
pub fn data_probe() -> (DataChangeHandler, mpsc::UnboundedReceiver<DataChange>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: DataChangeHandler = Arc::new(move |change| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(change);
            Ok(())
        })
    });
    (handler, rx)
}

pub fn children_probe() -> (
    ChildrenChangeHandler,
    mpsc::UnboundedReceiver<ChildrenChange>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: ChildrenChangeHandler = Arc::new(move |change| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(change);
            Ok(())
        })
    });
    (handler, rx)
}

pub fn state_probe() -> (StateChangeHandler, mpsc::UnboundedReceiver<KeeperState>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: StateChangeHandler = Arc::new(move |state| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(state);
            Ok(())
        })
    });
    (handler, rx)
}

pub async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

pub async fn assert_quiet<T>(rx: &mut mpsc::UnboundedReceiver<T>) {
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "unexpected notification"
    );
}
