//! The capability every discovery tier implements

use crate::error::Result;
use crate::types::{DiscoveredServer, DiscoveryTier};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A single discovery strategy in the fallback chain.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Which tier this source implements
    fn tier(&self) -> DiscoveryTier;

    /// Looks for a gateway within `budget`.
    ///
    /// Returns `Ok(None)` when nothing was found in time. Must observe `cancel`
    /// at every suspension point and either return `Ok(None)` or
    /// `Err(DiscoveryError::Cancelled)` once it fires.
    async fn discover(
        &self,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveredServer>>;

    /// Aborts any in-flight `discover` call. Idempotent.
    fn cancel(&self);
}

/// Tracks the token of a source's in-flight `discover` call so `cancel()`
/// can reach it from another task.
#[derive(Debug, Default)]
pub struct CancelSlot {
    current: Mutex<Option<CancellationToken>>,
}

impl CancelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a call scoped under `parent`; the returned token fires when
    /// either the parent or this slot is cancelled.
    pub fn begin(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        *self.current.lock() = Some(token.clone());
        token
    }

    /// Cancels the in-flight call, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().as_ref() {
            token.cancel();
        }
    }
}
