//! Remote result storage: per-user history and aggregate statistics.

use async_trait::async_trait;
use quiz_core::model::{ResultRecord, SessionId, StatsDelta, UserId};

use crate::error::RemoteError;

mod http;
mod memory;

pub use http::{HttpRemoteConfig, HttpRemoteStore};
pub use memory::InMemoryRemoteStore;

/// Remote side of result submission.
///
/// Both operations carry the session's idempotency key; an implementation must
/// apply each operation at most once per key.
#[async_trait]
pub trait RemoteResultStore: Send + Sync {
    /// Append a finalized result to the user's remote history.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the remote call fails.
    async fn append_history(
        &self,
        user_id: UserId,
        key: SessionId,
        record: &ResultRecord,
    ) -> Result<(), RemoteError>;

    /// Fold a result's delta into the user's aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the remote call fails.
    async fn update_stats(
        &self,
        user_id: UserId,
        key: SessionId,
        delta: StatsDelta,
    ) -> Result<(), RemoteError>;
}
