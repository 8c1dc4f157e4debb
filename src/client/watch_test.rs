use std::sync::Arc;

use tokio::sync::mpsc;

use crate::test_utils::assert_quiet;
use crate::test_utils::children_probe;
use crate::test_utils::data_probe;
use crate::test_utils::next_event;
use crate::test_utils::sim_client;
use crate::test_utils::SimHub;
use crate::ChangeKind;
use crate::DataChangeHandler;
use crate::Error;
use crate::KeeperState;
use crate::RawEvent;
use crate::RawEventKind;

#[tokio::test]
async fn test_first_connection_does_not_notify_subscribers() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    let (data_handler, mut data_rx) = data_probe();
    let (children_handler, mut children_rx) = children_probe();
    client
        .subscribe_data_change("/quiet", data_handler)
        .await
        .unwrap();
    client
        .subscribe_children_change("/quiet", children_handler)
        .await
        .unwrap();

    // The initial SyncConnected must not manufacture change notifications.
    assert_quiet(&mut data_rx).await;
    assert_quiet(&mut children_rx).await;
}

#[tokio::test]
async fn test_data_change_lifecycle_notifications() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    let (handler, mut rx) = data_probe();
    client.subscribe_data_change("/y", handler).await.unwrap();

    client.create_persistent("/y", b"v1").await.unwrap();
    let change = next_event(&mut rx).await;
    assert_eq!(change.path, "/y");
    assert_eq!(change.kind, ChangeKind::Created);
    assert_eq!(change.data.as_deref(), Some(&b"v1"[..]));

    client.set_data("/y", b"v2", -1).await.unwrap();
    let change = next_event(&mut rx).await;
    assert_eq!(change.kind, ChangeKind::DataChanged);
    assert_eq!(change.data.as_deref(), Some(&b"v2"[..]));

    client.delete("/y", -1).await.unwrap();
    let change = next_event(&mut rx).await;
    assert_eq!(change.kind, ChangeKind::Deleted);
    assert!(change.data.is_none());
}

#[tokio::test]
async fn test_deleted_notification_has_no_payload() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    client.create_persistent("/gone", b"payload").await.unwrap();

    let (handler, mut rx) = data_probe();
    client.subscribe_data_change("/gone", handler).await.unwrap();

    client.delete("/gone", -1).await.unwrap();
    let change = next_event(&mut rx).await;
    assert_eq!(change.kind, ChangeKind::Deleted);
    assert!(change.data.is_none());
}

#[tokio::test]
async fn test_children_watch_arms_lazily_on_creation() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    let (children_handler, mut children_rx) = children_probe();
    let (_, current) = client
        .subscribe_children_change("/lazy", children_handler)
        .await
        .unwrap();
    // Node does not exist yet, so there is no child list to return.
    assert!(current.is_none());

    let (data_handler, mut data_rx) = data_probe();
    client
        .subscribe_data_change("/lazy", data_handler)
        .await
        .unwrap();

    // Creation arms the deferred children watch before data handlers run.
    client.create_persistent("/lazy", b"").await.unwrap();
    assert_eq!(next_event(&mut data_rx).await.kind, ChangeKind::Created);

    client.create_persistent("/lazy/kid", b"").await.unwrap();
    let change = next_event(&mut children_rx).await;
    assert_eq!(change.kind, ChangeKind::ChildrenChanged);
    assert_eq!(change.children, Some(vec!["kid".to_string()]));
}

#[tokio::test]
async fn test_deleting_dual_subscribed_node_notifies_once() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    client.create_persistent("/both", b"d").await.unwrap();

    let (data_handler, mut data_rx) = data_probe();
    let (children_handler, mut children_rx) = children_probe();
    client
        .subscribe_data_change("/both", data_handler)
        .await
        .unwrap();
    client
        .subscribe_children_change("/both", children_handler)
        .await
        .unwrap();

    client.delete("/both", -1).await.unwrap();

    // One Deleted on the data chain, no duplicate from the children watch.
    let change = next_event(&mut data_rx).await;
    assert_eq!(change.kind, ChangeKind::Deleted);
    assert!(change.data.is_none());
    assert_quiet(&mut data_rx).await;
    assert_quiet(&mut children_rx).await;
}

#[tokio::test]
async fn test_subscribe_children_returns_current_list() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    client.create_persistent("/c", b"").await.unwrap();
    client.create_persistent("/c/one", b"").await.unwrap();

    let (handler, _rx) = children_probe();
    let (_, current) = client
        .subscribe_children_change("/c", handler)
        .await
        .unwrap();
    assert_eq!(current, Some(vec!["one".to_string()]));
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications_and_is_idempotent() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    client.create_persistent("/detach", b"0").await.unwrap();

    let (handler, mut rx) = data_probe();
    let id = client.subscribe_data_change("/detach", handler).await.unwrap();

    client.set_data("/detach", b"1", -1).await.unwrap();
    assert_eq!(next_event(&mut rx).await.kind, ChangeKind::DataChanged);

    client.unsubscribe_data_change("/detach", id);
    client.set_data("/detach", b"2", -1).await.unwrap();
    assert_quiet(&mut rx).await;

    // Unsubscribing an id that is no longer registered is a no-op.
    client.unsubscribe_data_change("/detach", id);
    client.unsubscribe_children_change("/detach", id);
}

#[tokio::test]
async fn test_reconnect_replay_revalidates_subscriptions() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    client.create_persistent("/r", b"seed").await.unwrap();

    let (data_handler, mut data_rx) = data_probe();
    let (children_handler, mut children_rx) = children_probe();
    client
        .subscribe_data_change("/r", data_handler)
        .await
        .unwrap();
    client
        .subscribe_children_change("/r", children_handler)
        .await
        .unwrap();

    hub.drop_connection();
    hub.restore_connection();

    // In-flight watches may have been lost; both chains re-validate against
    // current server state.
    let change = next_event(&mut data_rx).await;
    assert_eq!(change.kind, ChangeKind::DataChanged);
    assert_eq!(change.data.as_deref(), Some(&b"seed"[..]));

    let change = next_event(&mut children_rx).await;
    assert_eq!(change.kind, ChangeKind::ChildrenChanged);
    assert_eq!(change.children, Some(Vec::new()));
}

#[tokio::test]
async fn test_handlers_run_in_subscription_order() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    client.create_persistent("/ordered", b"").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    for tag in [1u32, 2, 3] {
        let tx = tx.clone();
        let handler: DataChangeHandler = Arc::new(move |_| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(tag);
                Ok(())
            })
        });
        client
            .subscribe_data_change("/ordered", handler)
            .await
            .unwrap();
    }

    client.set_data("/ordered", b"x", -1).await.unwrap();

    assert_eq!(next_event(&mut rx).await, 1);
    assert_eq!(next_event(&mut rx).await, 2);
    assert_eq!(next_event(&mut rx).await, 3);
}

#[tokio::test]
async fn test_failing_handler_aborts_dispatch_of_that_event() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    client.create_persistent("/faulty", b"").await.unwrap();

    let failing: DataChangeHandler =
        Arc::new(|_| Box::pin(async { Err(Error::Handler("subscriber bug".to_string())) }));
    client
        .subscribe_data_change("/faulty", failing)
        .await
        .unwrap();

    let (probe, mut rx) = data_probe();
    client
        .subscribe_data_change("/faulty", probe)
        .await
        .unwrap();

    client.set_data("/faulty", b"x", -1).await.unwrap();

    // The failure aborts the chain before the second handler runs.
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_first_connection_flag_suppresses_entry_replay() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    let (handler, mut rx) = data_probe();
    client.subscribe_data_change("/s", handler).await.unwrap();

    let entry = client.node_entry("/s");
    let event = RawEvent::state_change(KeeperState::SyncConnected);
    entry.on_change(&client, &event, true).await.unwrap();

    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_unsupported_event_kind_is_an_error() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    let entry = client.node_entry("/weird");
    let event = RawEvent::node("/weird", RawEventKind::None, KeeperState::SyncConnected);

    let err = entry.on_change(&client, &event, false).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedEvent { .. }));
}

#[tokio::test]
async fn test_event_for_other_path_is_ignored() {
    let hub = SimHub::new();
    let client = sim_client(&hub).await;

    let (handler, mut rx) = data_probe();
    client
        .subscribe_data_change("/mine", handler)
        .await
        .unwrap();

    let entry = client.node_entry("/mine");
    let event = RawEvent::node(
        "/theirs",
        RawEventKind::NodeDataChanged,
        KeeperState::SyncConnected,
    );
    entry.on_change(&client, &event, false).await.unwrap();

    assert_quiet(&mut rx).await;
}
