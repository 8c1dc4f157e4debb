//! Client module: the session manager and everything it composes.
//!
//! [`ZkClient`] owns the one live [`Session`], the global raw-event intake,
//! and the per-path watch registry. Raw events flow through a two-stage
//! pipeline: the intake stage applies connection-state transitions the moment
//! an event arrives, the dispatch stage performs entry fan-out, reconnection
//! and subscriber callbacks behind it. A retry loop blocked inside dispatch
//! therefore still observes later state transitions instead of deadlocking
//! the pipeline.

mod apis;
mod retry;
mod watch;

#[cfg(test)]
mod watch_test;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::ClientOptions;
use crate::ConnectionStateTracker;
use crate::EventSink;
use crate::KeeperConnector;
use crate::KeeperSession;
use crate::KeeperState;
use crate::RawEvent;
use crate::Result;
use crate::Session;
use crate::StateChangeHandler;
use crate::SubscriptionId;
use watch::NodeEntry;

/// Resilient client for a ZooKeeper-style coordination service.
///
/// Wraps the raw session behind durable subscriptions: one-shot watches are
/// re-armed after every firing and re-validated after every reconnection, and
/// every operation is retried across transient connection loss within the
/// configured operating timeout.
///
/// Watch entries are created on first access per path and never evicted; the
/// registry grows with the set of distinct paths ever touched. Unsubscribing
/// removes handlers only, never the entry or its armed watch.
#[derive(Clone)]
pub struct ZkClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ZkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZkClient").finish_non_exhaustive()
    }
}

pub(crate) struct ClientInner {
    pub(crate) options: ClientOptions,
    connector: Arc<dyn KeeperConnector>,
    session: ArcSwap<Session>,
    pub(crate) state: ConnectionStateTracker,
    pub(crate) entries: DashMap<String, Arc<NodeEntry>>,
    state_handlers: Mutex<Vec<(SubscriptionId, StateChangeHandler)>>,
    reconnect_lock: tokio::sync::Mutex<()>,
    event_tx: EventSink,
    first_connection: AtomicBool,
    pub(crate) disposed: AtomicBool,
    next_subscription: AtomicU64,
    shutdown: CancellationToken,
}

impl ZkClient {
    /// Establish the initial session and start the event pipeline.
    pub async fn connect(
        options: ClientOptions,
        connector: Arc<dyn KeeperConnector>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let raw = connector.connect(&options, event_tx.clone()).await?;

        let inner = Arc::new(ClientInner {
            options,
            connector,
            session: ArcSwap::from_pointee(Session::new(raw)),
            state: ConnectionStateTracker::new(),
            entries: DashMap::new(),
            state_handlers: Mutex::new(Vec::new()),
            reconnect_lock: tokio::sync::Mutex::new(()),
            event_tx,
            first_connection: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            next_subscription: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });

        let client = Self { inner };
        client.spawn_event_pipeline(event_rx);
        Ok(client)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// The current session. Replaced wholesale after expiry; hold the
    /// returned handle only briefly.
    pub fn session(&self) -> Arc<Session> {
        self.inner.session.load_full()
    }

    /// Best-effort shutdown: stops event processing and closes the session.
    ///
    /// Idempotent and safe to call from any task; raw events arriving after
    /// disposal are ignored.
    pub async fn close(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();

        let _guard = self.inner.reconnect_lock.lock().await;
        if let Err(e) = self.inner.session.load_full().close().await {
            debug!("closing session during shutdown failed: {e}");
        }
    }

    pub(crate) fn keeper(&self) -> Arc<dyn KeeperSession> {
        self.inner.session.load().keeper().clone()
    }

    pub(crate) fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register_state_handler(&self, id: SubscriptionId, handler: StateChangeHandler) {
        self.inner.state_handlers.lock().push((id, handler));
    }

    pub(crate) fn remove_state_handler(&self, id: SubscriptionId) {
        self.inner
            .state_handlers
            .lock()
            .retain(|(sid, _)| *sid != id);
    }

    fn spawn_event_pipeline(&self, mut raw_rx: mpsc::UnboundedReceiver<RawEvent>) {
        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<RawEvent>();

        // Intake: applies state transitions immediately so retry loops
        // blocked inside dispatch keep seeing fresh state.
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    event = raw_rx.recv() => {
                        let Some(event) = event else { break };
                        if inner.disposed.load(Ordering::SeqCst) {
                            continue;
                        }
                        if event.path.is_none() {
                            inner.state.set_state(event.state);
                        }
                        if dispatch_tx.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Dispatch: entry fan-out, reconnection, subscriber callbacks.
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = client.inner.shutdown.cancelled() => break,
                    event = dispatch_rx.recv() => {
                        let Some(event) = event else { break };
                        if let Err(e) = client.dispatch(event).await {
                            // No caller is waiting on event dispatch; surface
                            // handler and re-arm failures in the log.
                            error!("raw event dispatch failed: {e}");
                        }
                    }
                }
            }
        });
    }

    async fn dispatch(&self, event: RawEvent) -> Result<()> {
        match event.path.as_deref() {
            None => self.on_connection_event(&event).await,
            Some(path) => {
                let Some(entry) = self.inner.entries.get(path).map(|e| e.value().clone()) else {
                    // Never subscribed or queried; nothing to notify.
                    return Ok(());
                };
                entry.on_change(self, &event, false).await
            }
        }
    }

    /// Connection-level event: the intake stage has already applied the state
    /// to the tracker and woken its waiters.
    async fn on_connection_event(&self, event: &RawEvent) -> Result<()> {
        let state = event.state;
        info!("connection state changed to {state:?}");

        let result = match state {
            KeeperState::Expired => {
                self.reconnect().await;
                Ok(())
            }
            KeeperState::SyncConnected => {
                if self.inner.first_connection.swap(false, Ordering::SeqCst) {
                    // Initial connect must not manufacture change
                    // notifications.
                    Ok(())
                } else {
                    self.replay_to_entries(event).await
                }
            }
            _ => Ok(()),
        };

        // Subscribers run last so they never observe a stale local state.
        let handlers: Vec<StateChangeHandler> = self
            .inner
            .state_handlers
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(state).await?;
        }

        result
    }

    /// A rebuilt session may have silently dropped in-flight watches; forward
    /// the state event to every entry so interested subscribers re-validate
    /// against current server state.
    async fn replay_to_entries(&self, event: &RawEvent) -> Result<()> {
        let entries: Vec<Arc<NodeEntry>> = self
            .inner
            .entries
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for entry in entries {
            entry.on_change(self, event, false).await?;
        }
        Ok(())
    }

    /// Replace the expired session with a freshly connected one.
    ///
    /// Guarded by a bounded try-acquire: if another rebuild (or shutdown)
    /// holds the lock past the connection timeout, this attempt is abandoned.
    async fn reconnect(&self) {
        let lock_window = self.inner.options.connection_timeout();
        let Ok(_guard) = timeout(lock_window, self.inner.reconnect_lock.lock()).await else {
            warn!("session rebuild abandoned: reconnect lock not acquired within {lock_window:?}");
            return;
        };

        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.inner.session.load_full().close().await {
            debug!("closing expired session failed: {e}");
        }

        match self
            .inner
            .connector
            .connect(&self.inner.options, self.inner.event_tx.clone())
            .await
        {
            Ok(raw) => {
                self.inner.session.store(Arc::new(Session::new(raw)));
                info!("session rebuilt after expiry");
            }
            Err(e) => error!("session rebuild failed: {e}"),
        }
    }

    pub(crate) fn node_entry(&self, path: &str) -> Arc<NodeEntry> {
        self.inner
            .entries
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(NodeEntry::new(path.to_string())))
            .clone()
    }
}
