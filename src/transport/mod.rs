//! Boundary to the wrapped coordination-service client library.
//!
//! The wire protocol, session negotiation, heartbeats, and ACL enforcement
//! all live behind these two traits. [`KeeperConnector`] mints sessions;
//! [`KeeperSession`] exposes the raw node operations, every watch-carrying
//! read registering a one-shot watch delivered through the shared
//! [`EventSink`].

mod types;

pub use types::*;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::ClientOptions;
use crate::RawEvent;
use crate::Result;

/// Channel end the wrapped library pushes raw events into.
///
/// Every session produced by one connector feeds the same sink, so a session
/// rebuilt after expiry keeps delivering into the same intake.
pub type EventSink = mpsc::UnboundedSender<RawEvent>;

/// One live session with the coordination service.
///
/// `watch = true` on a read registers a one-shot watch on the target path;
/// `exists` registers even when the node is absent (the watch then fires on
/// creation). `version = -1` on writes skips the version check.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeeperSession: Send + Sync {
    async fn get_data(&self, path: &str, watch: bool) -> Result<Vec<u8>>;

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>>;

    async fn exists(&self, path: &str, watch: bool) -> Result<bool>;

    /// Returns the actual created path (differs from `path` for sequential
    /// modes).
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        acls: &[Acl],
        mode: CreateMode,
    ) -> Result<String>;

    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> Result<Stat>;

    async fn delete(&self, path: &str, version: i32) -> Result<()>;

    /// Ends the session; ephemeral nodes owned by it are removed server-side.
    async fn close(&self) -> Result<()>;

    fn session_id(&self) -> i64;

    fn session_password(&self) -> Vec<u8>;
}

/// Factory for [`KeeperSession`]s.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeeperConnector: Send + Sync {
    /// Establish a new session using `options` (connection string, session
    /// timeout, resumption credentials, read-only flag). State transitions
    /// and watch firings for the session are pushed into `events`.
    async fn connect(
        &self,
        options: &ClientOptions,
        events: EventSink,
    ) -> Result<Arc<dyn KeeperSession>>;
}
