mod state;

pub use state::*;

#[cfg(test)]
mod session_test;
#[cfg(test)]
mod state_test;

use std::sync::Arc;

use crate::KeeperSession;
use crate::Result;

/// The single live handle to the coordination service.
///
/// Owned exclusively by the session manager and replaced wholesale on
/// reconnection; nothing mutates a `Session` in place.
pub struct Session {
    raw: Arc<dyn KeeperSession>,
}

impl Session {
    pub(crate) fn new(raw: Arc<dyn KeeperSession>) -> Self {
        Self { raw }
    }

    /// The wrapped library session the raw node operations go through.
    pub fn keeper(&self) -> &Arc<dyn KeeperSession> {
        &self.raw
    }

    /// Server-assigned id usable for resumption.
    pub fn id(&self) -> i64 {
        self.raw.session_id()
    }

    pub fn password(&self) -> Vec<u8> {
        self.raw.session_password()
    }

    pub(crate) async fn close(&self) -> Result<()> {
        self.raw.close().await
    }
}
