//! Public node operations and subscription APIs.
//!
//! Every operation normalizes its logical path against the configured base
//! path, lazily creates the path's watch entry, and runs the raw call through
//! the retry policy.

use std::time::Duration;

use futures::future::BoxFuture;

use super::ZkClient;
use crate::Acl;
use crate::ChildrenChangeHandler;
use crate::CreateMode;
use crate::DataChangeHandler;
use crate::KeeperState;
use crate::Result;
use crate::Stat;
use crate::StateChangeHandler;
use crate::SubscriptionId;

impl ZkClient {
    /// Read a node's payload. Fails with a not-found error when the node
    /// does not exist.
    pub async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        self.retry_until_connected(|| {
            let entry = entry.clone();
            async move { entry.get_data(self, false).await }
        })
        .await
    }

    /// List a node's children (names only, unordered).
    pub async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        self.retry_until_connected(|| {
            let entry = entry.clone();
            async move { entry.get_children(self, false).await }
        })
        .await
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        self.retry_until_connected(|| {
            let entry = entry.clone();
            async move { entry.exists(self, false).await }
        })
        .await
    }

    /// Create a node, returning the actual created path (differs from the
    /// requested one for sequential modes).
    pub async fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: &[Acl],
        mode: CreateMode,
    ) -> Result<String> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        self.retry_until_connected(|| {
            let entry = entry.clone();
            async move { entry.create(self, data, acls, mode).await }
        })
        .await
    }

    /// Replace a node's payload. `version = -1` skips the version check.
    pub async fn set_data(&self, path: &str, data: &[u8], version: i32) -> Result<Stat> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        self.retry_until_connected(|| {
            let entry = entry.clone();
            async move { entry.set_data(self, data, version).await }
        })
        .await
    }

    /// Delete a node. `version = -1` skips the version check.
    pub async fn delete(&self, path: &str, version: i32) -> Result<()> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        self.retry_until_connected(|| {
            let entry = entry.clone();
            async move { entry.delete(self, version).await }
        })
        .await
    }

    /// Ephemeral node with the open ACL.
    pub async fn create_ephemeral(&self, path: &str, data: &[u8]) -> Result<String> {
        self.create(path, data, &Acl::open_unsafe(), CreateMode::Ephemeral)
            .await
    }

    /// Persistent node with the open ACL.
    pub async fn create_persistent(&self, path: &str, data: &[u8]) -> Result<String> {
        self.create(path, data, &Acl::open_unsafe(), CreateMode::Persistent)
            .await
    }

    /// Create `path`, building missing ancestors as persistent nodes.
    ///
    /// An already existing target counts as success; only the leaf gets
    /// `data` and `mode`.
    pub fn create_recursive<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
        mode: CreateMode,
    ) -> BoxFuture<'a, Result<()>> {
        self.create_recursive_with_acls(path, data, Acl::open_unsafe(), mode)
    }

    pub fn create_recursive_with_acls<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
        acls: Vec<Acl>,
        mode: CreateMode,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.create(path, data, &acls, mode).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_already_exists() => Ok(()),
                Err(e) if e.is_not_found() => {
                    // No parent left to build (the base path's own ancestors
                    // are out of reach); surface the original failure.
                    let parent = match path.rfind('/') {
                        Some(idx) => &path[..idx],
                        None => return Err(e),
                    };
                    self.create_recursive_with_acls(
                        parent,
                        &[],
                        acls.clone(),
                        CreateMode::Persistent,
                    )
                    .await?;
                    self.create(path, data, &acls, mode).await?;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Depth-first delete of `path` and everything below it.
    ///
    /// A missing node counts as deleted. Returns whether the whole subtree
    /// went.
    pub fn delete_recursive<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let children = match self.get_children(path).await {
                Ok(children) => children,
                Err(e) if e.is_not_found() => return Ok(true),
                Err(e) => return Err(e),
            };

            for child in children {
                if !self.delete_recursive(&format!("{path}/{child}")).await? {
                    return Ok(false);
                }
            }

            self.delete(path, -1).await?;
            Ok(true)
        })
    }

    // ---- subscriptions ----

    /// Subscribe to data changes on `path`. The watch is armed before this
    /// returns, so the very next relevant event is observable.
    pub async fn subscribe_data_change(
        &self,
        path: &str,
        handler: DataChangeHandler,
    ) -> Result<SubscriptionId> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        let id = self.next_subscription_id();
        entry.subscribe_data_change(self, id, handler).await?;
        Ok(id)
    }

    /// Remove a data-change handler. Unknown ids are a no-op; the armed
    /// watch persists either way.
    pub fn unsubscribe_data_change(&self, path: &str, id: SubscriptionId) {
        let path = self.to_keeper_path(path);
        self.node_entry(&path).unsubscribe_data_change(id);
    }

    /// Subscribe to children changes on `path`, returning the current child
    /// list atomically with arming. `None` means the node does not exist yet;
    /// the watch then arms itself once the node appears.
    pub async fn subscribe_children_change(
        &self,
        path: &str,
        handler: ChildrenChangeHandler,
    ) -> Result<(SubscriptionId, Option<Vec<String>>)> {
        let path = self.to_keeper_path(path);
        let entry = self.node_entry(&path);
        let id = self.next_subscription_id();
        let children = entry.subscribe_children_change(self, id, handler).await?;
        Ok((id, children))
    }

    pub fn unsubscribe_children_change(&self, path: &str, id: SubscriptionId) {
        let path = self.to_keeper_path(path);
        self.node_entry(&path).unsubscribe_children_change(id);
    }

    /// Subscribe to connection-state transitions. Handlers observe the state
    /// only after it has been applied locally.
    pub fn subscribe_state_change(&self, handler: StateChangeHandler) -> SubscriptionId {
        let id = self.next_subscription_id();
        self.register_state_handler(id, handler);
        id
    }

    pub fn unsubscribe_state_change(&self, id: SubscriptionId) {
        self.remove_state_handler(id);
    }

    // ---- state waits ----

    pub fn current_state(&self) -> KeeperState {
        self.inner.state.current_state()
    }

    /// Block until the tracker reports `state`, bounded by `timeout`.
    pub async fn wait_for_state(&self, state: KeeperState, timeout: Duration) -> bool {
        self.inner.state.wait_for_state(state, timeout).await
    }

    /// Block until connected, bounded by `timeout`.
    pub async fn wait_until_connected(&self, timeout: Duration) -> bool {
        self.wait_for_state(KeeperState::SyncConnected, timeout).await
    }

    /// Apply the base path and normalize: exactly one leading slash, no
    /// trailing slash, collapsing to `/` when everything trims away.
    pub(crate) fn to_keeper_path(&self, path: &str) -> String {
        let base = self.inner.options.base_path.as_deref().unwrap_or("/");
        let base = if base.starts_with('/') {
            base.to_string()
        } else {
            format!("/{base}")
        };
        let base = base.trim_end_matches('/');

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let full = format!("{base}{}", path.trim_end_matches('/'));
        if full.is_empty() {
            "/".to_string()
        } else {
            full
        }
    }
}
