//! Per-path watch entry.
//!
//! A [`NodeEntry`] owns the data-change and children-change handler chains
//! for one normalized path, translates raw watch firings into notifications
//! with freshly fetched payloads, and re-arms the one-shot watch after every
//! firing. Entries are created on first access and live for the life of the
//! client; an armed watch firing into an empty chain is a no-op rather than
//! a cancellation (the protocol has no cancel primitive).

use parking_lot::Mutex;

use super::ZkClient;
use crate::Acl;
use crate::ChangeKind;
use crate::ChildrenChange;
use crate::ChildrenChangeHandler;
use crate::CreateMode;
use crate::DataChange;
use crate::DataChangeHandler;
use crate::Error;
use crate::RawEvent;
use crate::RawEventKind;
use crate::Result;
use crate::Stat;
use crate::SubscriptionId;

pub(crate) struct NodeEntry {
    path: String,
    data_handlers: Mutex<Vec<(SubscriptionId, DataChangeHandler)>>,
    children_handlers: Mutex<Vec<(SubscriptionId, ChildrenChangeHandler)>>,
}

impl NodeEntry {
    pub(crate) fn new(path: String) -> Self {
        Self {
            path,
            data_handlers: Mutex::new(Vec::new()),
            children_handlers: Mutex::new(Vec::new()),
        }
    }

    // ---- raw operations against the current session ----
    //
    // No retry here; callers decide whether to wrap these in the policy.

    pub(crate) async fn get_data(&self, client: &ZkClient, watch: bool) -> Result<Vec<u8>> {
        client.keeper().get_data(&self.path, watch).await
    }

    pub(crate) async fn get_children(&self, client: &ZkClient, watch: bool) -> Result<Vec<String>> {
        client.keeper().get_children(&self.path, watch).await
    }

    pub(crate) async fn exists(&self, client: &ZkClient, watch: bool) -> Result<bool> {
        client.keeper().exists(&self.path, watch).await
    }

    pub(crate) async fn create(
        &self,
        client: &ZkClient,
        data: &[u8],
        acls: &[Acl],
        mode: CreateMode,
    ) -> Result<String> {
        client.keeper().create(&self.path, data, acls, mode).await
    }

    pub(crate) async fn set_data(
        &self,
        client: &ZkClient,
        data: &[u8],
        version: i32,
    ) -> Result<Stat> {
        client.keeper().set_data(&self.path, data, version).await
    }

    pub(crate) async fn delete(&self, client: &ZkClient, version: i32) -> Result<()> {
        client.keeper().delete(&self.path, version).await
    }

    // ---- subscriptions ----

    /// Append `handler` to the data chain and arm the data watch so the next
    /// relevant event is observable before this returns.
    pub(crate) async fn subscribe_data_change(
        &self,
        client: &ZkClient,
        id: SubscriptionId,
        handler: DataChangeHandler,
    ) -> Result<()> {
        self.data_handlers.lock().push((id, handler));
        self.watch_data_change(client).await
    }

    pub(crate) fn unsubscribe_data_change(&self, id: SubscriptionId) {
        self.data_handlers.lock().retain(|(sid, _)| *sid != id);
    }

    /// Append `handler` to the children chain, arm an existence watch, and
    /// fetch the current child list with a children watch attached.
    ///
    /// Fetching and arming happen in one retried step, so no change can slip
    /// between "read the children" and "start watching". `None` means the
    /// node does not exist yet; the existence watch then drives deferred
    /// arming once it appears.
    pub(crate) async fn subscribe_children_change(
        &self,
        client: &ZkClient,
        id: SubscriptionId,
        handler: ChildrenChangeHandler,
    ) -> Result<Option<Vec<String>>> {
        self.children_handlers.lock().push((id, handler));
        self.watch_children_change(client).await
    }

    pub(crate) fn unsubscribe_children_change(&self, id: SubscriptionId) {
        self.children_handlers.lock().retain(|(sid, _)| *sid != id);
    }

    fn has_data_handlers(&self) -> bool {
        !self.data_handlers.lock().is_empty()
    }

    fn has_children_handlers(&self) -> bool {
        !self.children_handlers.lock().is_empty()
    }

    // ---- event handling ----

    /// Sole entry point for raw events concerning this path, including
    /// connection-level events forwarded to every entry.
    pub(crate) async fn on_change(
        &self,
        client: &ZkClient,
        event: &RawEvent,
        is_first_connection: bool,
    ) -> Result<()> {
        match event.path.as_deref() {
            None => self.on_state_change(client, is_first_connection).await,
            Some(path) if path == self.path => match event.kind {
                RawEventKind::NodeCreated
                | RawEventKind::NodeDataChanged
                | RawEventKind::NodeDeleted => {
                    // Deferred arming: a children subscription taken while
                    // the node was absent could not register its watch; do it
                    // now that the node exists.
                    if event.kind == RawEventKind::NodeCreated && self.has_children_handlers() {
                        let path = self.path.clone();
                        client
                            .retry_until_connected(|| {
                                let keeper = client.keeper();
                                let path = path.clone();
                                async move { keeper.get_children(&path, true).await }
                            })
                            .await?;
                    }
                    self.on_data_event(client, event.kind).await
                }
                RawEventKind::NodeChildrenChanged => self.on_children_event(client, event.kind).await,
                RawEventKind::None => Err(Error::UnsupportedEvent {
                    path: self.path.clone(),
                    kind: event.kind,
                }),
            },
            Some(_) => Ok(()),
        }
    }

    /// Forwarded connection-state event. After a reconnection, in-flight
    /// watches may have been silently dropped, so every populated chain is
    /// re-validated against current server state. The initial connection
    /// must not manufacture notifications.
    async fn on_state_change(&self, client: &ZkClient, is_first_connection: bool) -> Result<()> {
        if is_first_connection {
            return Ok(());
        }

        if self.has_data_handlers() {
            self.on_data_event(client, RawEventKind::None).await?;
        }
        if self.has_children_handlers() {
            self.on_children_event(client, RawEventKind::None).await?;
        }
        Ok(())
    }

    async fn on_data_event(&self, client: &ZkClient, kind: RawEventKind) -> Result<()> {
        if self.has_data_handlers() {
            let change = match kind {
                RawEventKind::NodeCreated => DataChange {
                    path: self.path.clone(),
                    kind: ChangeKind::Created,
                    data: self.fetch_data(client).await?,
                },
                // No round-trip to a node that is known to be gone.
                RawEventKind::NodeDeleted => DataChange {
                    path: self.path.clone(),
                    kind: ChangeKind::Deleted,
                    data: None,
                },
                // None is the reconnection replay: the exact change is
                // unknown, so current state is fetched and reported as the
                // new truth.
                RawEventKind::NodeDataChanged | RawEventKind::None => DataChange {
                    path: self.path.clone(),
                    kind: ChangeKind::DataChanged,
                    data: self.fetch_data(client).await?,
                },
                other => {
                    return Err(Error::UnsupportedEvent {
                        path: self.path.clone(),
                        kind: other,
                    })
                }
            };

            for handler in self.data_handler_chain() {
                handler(change.clone()).await?;
            }
        }

        // Re-arm even with an empty chain: the entry's watch persists across
        // unsubscribe so the next real change stays observable.
        self.watch_data_change(client).await
    }

    async fn on_children_event(&self, client: &ZkClient, kind: RawEventKind) -> Result<()> {
        if self.has_children_handlers() {
            let change = match kind {
                RawEventKind::NodeChildrenChanged | RawEventKind::None => ChildrenChange {
                    path: self.path.clone(),
                    kind: ChangeKind::ChildrenChanged,
                    children: self.fetch_children(client).await?,
                },
                other => {
                    return Err(Error::UnsupportedEvent {
                        path: self.path.clone(),
                        kind: other,
                    })
                }
            };

            for handler in self.children_handler_chain() {
                handler(change.clone()).await?;
            }
        }

        self.watch_children_change(client).await.map(|_| ())
    }

    /// Snapshot of the data chain in subscription order. Handlers run
    /// outside the lock so they may freely call back into the client.
    fn data_handler_chain(&self) -> Vec<DataChangeHandler> {
        self.data_handlers
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect()
    }

    fn children_handler_chain(&self) -> Vec<ChildrenChangeHandler> {
        self.children_handlers
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect()
    }

    /// Current payload for a notification. A node deleted between the watch
    /// firing and this read is reported as an absent payload, not an error.
    async fn fetch_data(&self, client: &ZkClient) -> Result<Option<Vec<u8>>> {
        let path = self.path.clone();
        client
            .retry_until_connected(|| {
                let keeper = client.keeper();
                let path = path.clone();
                async move {
                    match keeper.get_data(&path, false).await {
                        Ok(data) => Ok(Some(data)),
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e),
                    }
                }
            })
            .await
    }

    async fn fetch_children(&self, client: &ZkClient) -> Result<Option<Vec<String>>> {
        let path = self.path.clone();
        client
            .retry_until_connected(|| {
                let keeper = client.keeper();
                let path = path.clone();
                async move {
                    match keeper.get_children(&path, false).await {
                        Ok(children) => Ok(Some(children)),
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e),
                    }
                }
            })
            .await
    }

    /// Arm (or re-arm) the data watch. An existence probe registers the
    /// watch whether or not the node currently exists; arming twice is
    /// idempotent.
    async fn watch_data_change(&self, client: &ZkClient) -> Result<()> {
        let path = self.path.clone();
        client
            .retry_until_connected(|| {
                let keeper = client.keeper();
                let path = path.clone();
                async move { keeper.exists(&path, true).await }
            })
            .await
            .map(|_| ())
    }

    /// Arm (or re-arm) the children watch and return the current child list,
    /// `None` when the node does not exist yet. The existence watch covers
    /// the not-yet-created case so arming can be deferred to creation.
    async fn watch_children_change(&self, client: &ZkClient) -> Result<Option<Vec<String>>> {
        let path = self.path.clone();
        client
            .retry_until_connected(|| {
                let keeper = client.keeper();
                let path = path.clone();
                async move {
                    keeper.exists(&path, true).await?;
                    match keeper.get_children(&path, true).await {
                        Ok(children) => Ok(Some(children)),
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e),
                    }
                }
            })
            .await
    }
}
