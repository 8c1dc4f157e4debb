//! Connection state holder with blocking wait support.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::KeeperState;

/// Tracks the last observed [`KeeperState`] and wakes waiters on every
/// transition.
///
/// Backed by a broadcast watch channel: `set_state` atomically replaces the
/// value and notifies all pending `wait_for_state` calls. Waits re-check the
/// condition after every wakeup, so a transition that races past the target
/// state is never mistaken for a match.
pub struct ConnectionStateTracker {
    tx: watch::Sender<KeeperState>,
}

impl ConnectionStateTracker {
    /// Starts out [`KeeperState::Disconnected`] until the first raw event
    /// arrives.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(KeeperState::Disconnected);
        Self { tx }
    }

    /// Replace the current state and wake every waiter.
    pub fn set_state(&self, state: KeeperState) {
        self.tx.send_replace(state);
    }

    /// Non-blocking read of the current state.
    pub fn current_state(&self) -> KeeperState {
        *self.tx.borrow()
    }

    /// Wait until the current state equals `target`, bounded by `timeout`.
    ///
    /// Returns whether the target was reached. Never fails otherwise.
    pub async fn wait_for_state(&self, target: KeeperState, wait: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let reached = matches!(
            timeout(wait, rx.wait_for(|state| *state == target)).await,
            Ok(Ok(_))
        );
        reached
    }
}

impl Default for ConnectionStateTracker {
    fn default() -> Self {
        Self::new()
    }
}
