use async_trait::async_trait;
use model::{Mark, NewMark};

use crate::SyncError;

/// The four mark calls the sync protocol is built from.
#[async_trait]
pub trait MarkApi: Send + Sync {
    /// Idempotent create. Returns the server's message, which tells a fresh
    /// insert apart from an existing mark.
    async fn create_mark(&self, mark: &NewMark) -> Result<String, SyncError>;

    /// Marks for `symbol`, oldest first.
    async fn list_marks(&self, symbol: &str) -> Result<Vec<Mark>, SyncError>;

    async fn delete_mark(&self, symbol: &str, timestamp: i64) -> Result<(), SyncError>;

    /// Number of marks removed. An empty symbol is `NotFound`.
    async fn clear_marks(&self, symbol: &str) -> Result<u64, SyncError>;
}
