//! Event vocabulary shared between the transport boundary and subscribers.
//!
//! [`RawEvent`] is what the wrapped client library delivers; [`DataChange`]
//! and [`ChildrenChange`] are the stable notifications handed to application
//! handlers after the client has re-fetched current node state.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::Result;

/// The service's view of connectivity, as observed by this client.
///
/// Exactly one value is current at any time; it is replaced only by the
/// global raw-event intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperState {
    /// Link to the ensemble is down; the session may still be recoverable
    Disconnected,
    /// Session is established and fully usable
    SyncConnected,
    /// Session is established against a read-only replica
    ConnectedReadOnly,
    /// The server gave up on the session; it cannot be resumed
    Expired,
    /// Session credentials were rejected
    AuthFailed,
}

/// Low-level event kind as emitted by the wrapped client library.
///
/// `None` carries a pure state transition (no path); the node kinds are
/// one-shot watch firings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// A single raw event from the wrapped client library.
///
/// An absent path marks a connection-level event; a present path names the
/// node whose watch fired.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub path: Option<String>,
    pub kind: RawEventKind,
    pub state: KeeperState,
}

impl RawEvent {
    /// Connection-level event carrying only a state transition.
    pub fn state_change(state: KeeperState) -> Self {
        Self {
            path: None,
            kind: RawEventKind::None,
            state,
        }
    }

    /// Node-level event for a fired watch.
    pub fn node(path: impl Into<String>, kind: RawEventKind, state: KeeperState) -> Self {
        Self {
            path: Some(path.into()),
            kind,
            state,
        }
    }
}

/// Semantic change kind surfaced to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    DataChanged,
    Deleted,
    ChildrenChanged,
}

/// Data-change notification: path, semantic kind, and the freshly fetched
/// payload. `data` is `None` for [`ChangeKind::Deleted`] or when the node
/// vanished between the watch firing and the follow-up read.
#[derive(Debug, Clone)]
pub struct DataChange {
    pub path: String,
    pub kind: ChangeKind,
    pub data: Option<Vec<u8>>,
}

/// Children-change notification with the freshly fetched child list.
#[derive(Debug, Clone)]
pub struct ChildrenChange {
    pub path: String,
    pub kind: ChangeKind,
    pub children: Option<Vec<String>>,
}

/// Handle returned by every subscribe call; unsubscribing by an id that is
/// no longer (or never was) registered is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

pub type DataChangeHandler = Arc<dyn Fn(DataChange) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub type ChildrenChangeHandler =
    Arc<dyn Fn(ChildrenChange) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub type StateChangeHandler =
    Arc<dyn Fn(KeeperState) -> BoxFuture<'static, Result<()>> + Send + Sync>;
