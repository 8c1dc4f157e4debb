//! Retry-until-connected policy.

use std::future::Future;
use std::sync::atomic::Ordering;

use tokio::task::yield_now;
use tokio::time::Instant;
use tracing::debug;

use super::ZkClient;
use crate::Error;
use crate::KeeperState;
use crate::Result;

impl ZkClient {
    /// Run `op`, masking transient connectivity failures.
    ///
    /// On connection loss or session expiry the loop yields to the scheduler,
    /// waits for the tracker to report `SyncConnected`, and tries again. One
    /// wall-clock budget (the operating timeout) spans the whole loop; once
    /// elapsed the call fails with [`Error::OperationTimeout`]. Every other
    /// failure propagates to the caller on the first occurrence.
    ///
    /// `op` is re-invoked from scratch on every attempt, so closures that
    /// load the current session per call transparently pick up a session
    /// rebuilt mid-retry.
    pub async fn retry_until_connected<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let budget = self.inner.options.operating_timeout();
        let started = Instant::now();
        loop {
            if self.inner.disposed.load(Ordering::SeqCst) {
                return Err(Error::Closed);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    debug!("operation hit transient failure ({e}), waiting for reconnection");
                    // Cooperative point: let the event pipeline make progress
                    // before blocking on the state tracker.
                    yield_now().await;
                    let remaining = budget.saturating_sub(started.elapsed());
                    if !remaining.is_zero() {
                        self.inner
                            .state
                            .wait_for_state(KeeperState::SyncConnected, remaining)
                            .await;
                    }
                }
                Err(e) => return Err(e),
            }

            if started.elapsed() >= budget {
                return Err(Error::OperationTimeout { budget });
            }
        }
    }
}
