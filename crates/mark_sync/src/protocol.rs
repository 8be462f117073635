use std::sync::Arc;
use std::time::Duration;

use model::{Mark, NewMark};
use retry::RetryPolicy;
use tracing::info;

use crate::{MarkApi, SyncError};

pub const SAVE_ATTEMPTS: u32 = 6;
pub const CLEAR_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Result of a delete-all that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared(u64),
    /// The server had nothing stored for the symbol.
    AlreadyEmpty,
}

/// Retry rules layered over a [`MarkApi`].
#[derive(Clone)]
pub struct MarkSync {
    api: Arc<dyn MarkApi>,
    save_policy: RetryPolicy,
    clear_policy: RetryPolicy,
}

impl MarkSync {
    pub fn new(api: Arc<dyn MarkApi>) -> Self {
        Self::with_policies(
            api,
            RetryPolicy::exponential(SAVE_ATTEMPTS, RETRY_BASE_DELAY, RETRY_MAX_DELAY).with_jitter(true),
            RetryPolicy::exponential(CLEAR_ATTEMPTS, RETRY_BASE_DELAY, RETRY_MAX_DELAY).with_jitter(true),
        )
    }

    pub fn with_policies(api: Arc<dyn MarkApi>, save_policy: RetryPolicy, clear_policy: RetryPolicy) -> Self {
        Self {
            api,
            save_policy,
            clear_policy,
        }
    }

    pub fn api(&self) -> &Arc<dyn MarkApi> {
        &self.api
    }

    /// Creates `mark`, retrying server and transport failures. The server
    /// create is idempotent, so a retry after a lost reply stores nothing twice.
    pub async fn save_with_retry(&self, mark: &NewMark) -> Result<String, SyncError> {
        let message = self
            .save_policy
            .run(
                "mark_save",
                |_| self.api.create_mark(mark),
                SyncError::is_retryable,
            )
            .await?;
        info!(symbol = %mark.symbol, timestamp = mark.timestamp, %message, "mark saved");
        Ok(message)
    }

    pub async fn delete_all_with_retry(&self, symbol: &str) -> Result<ClearOutcome, SyncError> {
        let result = self
            .clear_policy
            .run(
                "mark_clear",
                |_| self.api.clear_marks(symbol),
                SyncError::is_retryable,
            )
            .await;
        match result {
            Ok(deleted) => {
                info!(%symbol, deleted, "marks cleared");
                Ok(ClearOutcome::Cleared(deleted))
            }
            Err(SyncError::NotFound(_)) => Ok(ClearOutcome::AlreadyEmpty),
            Err(err) => Err(err),
        }
    }

    /// Single attempt.
    pub async fn delete(&self, symbol: &str, timestamp: i64) -> Result<(), SyncError> {
        self.api.delete_mark(symbol, timestamp).await
    }

    pub async fn list(&self, symbol: &str) -> Result<Vec<Mark>, SyncError> {
        self.api.list_marks(symbol).await
    }
}
