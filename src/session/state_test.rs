use std::sync::Arc;
use std::time::Duration;

use crate::ConnectionStateTracker;
use crate::KeeperState;

#[tokio::test]
async fn test_initial_state_is_disconnected() {
    let tracker = ConnectionStateTracker::new();
    assert_eq!(tracker.current_state(), KeeperState::Disconnected);
}

#[tokio::test]
async fn test_set_state_replaces_current_value() {
    let tracker = ConnectionStateTracker::new();

    tracker.set_state(KeeperState::SyncConnected);
    assert_eq!(tracker.current_state(), KeeperState::SyncConnected);

    tracker.set_state(KeeperState::Expired);
    assert_eq!(tracker.current_state(), KeeperState::Expired);
}

#[tokio::test]
async fn test_wait_returns_immediately_when_already_in_target_state() {
    let tracker = ConnectionStateTracker::new();
    tracker.set_state(KeeperState::SyncConnected);

    assert!(
        tracker
            .wait_for_state(KeeperState::SyncConnected, Duration::from_millis(10))
            .await
    );
}

#[tokio::test]
async fn test_wait_times_out_when_target_never_reached() {
    let tracker = ConnectionStateTracker::new();

    assert!(
        !tracker
            .wait_for_state(KeeperState::SyncConnected, Duration::from_millis(50))
            .await
    );
    // Still in the initial state afterwards
    assert_eq!(tracker.current_state(), KeeperState::Disconnected);
}

#[tokio::test]
async fn test_wait_is_woken_by_transition_from_another_task() {
    let tracker = Arc::new(ConnectionStateTracker::new());

    let setter = tracker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        setter.set_state(KeeperState::SyncConnected);
    });

    assert!(
        tracker
            .wait_for_state(KeeperState::SyncConnected, Duration::from_secs(5))
            .await
    );
}

#[tokio::test]
async fn test_wait_ignores_transitions_to_other_states() {
    let tracker = Arc::new(ConnectionStateTracker::new());

    let setter = tracker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        setter.set_state(KeeperState::Disconnected);
        tokio::time::sleep(Duration::from_millis(20)).await;
        setter.set_state(KeeperState::AuthFailed);
    });

    assert!(
        !tracker
            .wait_for_state(KeeperState::SyncConnected, Duration::from_millis(200))
            .await
    );
}

#[tokio::test]
async fn test_multiple_waiters_are_woken_by_one_transition() {
    let tracker = Arc::new(ConnectionStateTracker::new());

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let tracker = tracker.clone();
        waiters.push(tokio::spawn(async move {
            tracker
                .wait_for_state(KeeperState::SyncConnected, Duration::from_secs(5))
                .await
        }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    tracker.set_state(KeeperState::SyncConnected);

    for waiter in waiters {
        assert!(waiter.await.unwrap());
    }
}
