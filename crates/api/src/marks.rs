use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use metrics::MetricsHandle;
use model::{parse_timestamp_str, Mark, MarkDraft, ModelError, NewMark};
use prometheus::IntCounter;
use retry::RetryPolicy;
use serde::Deserialize;
use serde_json::{json, Value};
use storage::{MarkStore, StoreError};
use tracing::info;

use crate::{ApiError, AppState, ErrorReply};

pub const MARK_CREATED: &str = "Mark created successfully";
pub const MARK_EXISTS: &str = "Mark already exists";
pub const MARK_DELETED: &str = "Mark deleted successfully";
pub const MARKS_CLEARED: &str = "All marks deleted successfully";
pub const MARK_NOT_FOUND: &str = "Mark not found";
pub const NO_MARKS_TO_DELETE: &str = "No marks found to delete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

impl CreateOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            CreateOutcome::Created => MARK_CREATED,
            CreateOutcome::AlreadyExists => MARK_EXISTS,
        }
    }
}

/// Mark operations on top of a [`MarkStore`], with idempotent create.
#[derive(Clone)]
pub struct MarkService {
    store: Arc<dyn MarkStore>,
    retry: RetryPolicy,
    retries: IntCounter,
    created: IntCounter,
}

impl MarkService {
    pub fn new(store: Arc<dyn MarkStore>, retry: RetryPolicy, metrics: &MetricsHandle) -> Self {
        Self {
            store,
            retry,
            retries: metrics.store_retry_counter(),
            created: metrics.marks_created_counter(),
        }
    }

    /// Stores `mark` unless (symbol, timestamp) is already present. Only
    /// transient store failures are retried.
    pub async fn create(&self, mark: &NewMark) -> Result<CreateOutcome, ApiError> {
        self.retry
            .run(
                "mark_create",
                |attempt| {
                    if attempt > 1 {
                        self.retries.inc();
                    }
                    self.create_once(mark)
                },
                StoreError::is_transient,
            )
            .await
            .map_err(ApiError::from)
    }

    async fn create_once(&self, mark: &NewMark) -> Result<CreateOutcome, StoreError> {
        if self
            .store
            .find_mark(&mark.symbol, mark.timestamp)
            .await?
            .is_some()
        {
            return Ok(CreateOutcome::AlreadyExists);
        }
        match self.store.insert_mark(mark).await {
            Ok(_) => {
                self.created.inc();
                Ok(CreateOutcome::Created)
            }
            // Another request inserted the same pair between lookup and insert.
            Err(StoreError::Duplicate) => Ok(CreateOutcome::AlreadyExists),
            Err(err) => Err(err),
        }
    }

    pub async fn list(&self, symbol: &str) -> Result<Vec<Mark>, ApiError> {
        Ok(self.store.list_marks(symbol).await?)
    }

    pub async fn delete(&self, symbol: &str, timestamp: i64) -> Result<(), ApiError> {
        match self.store.delete_mark(symbol, timestamp).await? {
            0 => Err(ApiError::NotFound(MARK_NOT_FOUND.into())),
            _ => Ok(()),
        }
    }

    /// Reports [`ApiError::NotFound`] when the symbol had no marks.
    pub async fn delete_all(&self, symbol: &str) -> Result<u64, ApiError> {
        match self.store.delete_marks(symbol).await? {
            0 => Err(ApiError::NotFound(NO_MARKS_TO_DELETE.into())),
            deleted => Ok(deleted),
        }
    }
}

pub(crate) async fn create_mark(
    State(state): State<AppState>,
    body: Result<Json<MarkDraft>, JsonRejection>,
) -> Result<Json<Value>, ErrorReply> {
    let Json(draft) = body.map_err(|rej| state.reject(ApiError::Validation(rej.body_text())))?;
    let mark = draft.validate().map_err(|err| state.reject(err))?;
    let outcome = state
        .marks
        .create(&mark)
        .await
        .map_err(|err| state.reject(err))?;
    info!(
        symbol = %mark.symbol,
        timestamp = mark.timestamp,
        outcome = ?outcome,
        "mark create handled"
    );
    Ok(Json(json!({ "success": true, "message": outcome.message() })))
}

pub(crate) async fn list_marks(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ErrorReply> {
    list_for(&state, &symbol).await
}

/// `GET /api/marks/clear-all` shares its path with the clear endpoint, so the
/// static route answers the listing for the symbol literally named `clear-all`.
pub(crate) async fn list_clear_all_symbol(
    State(state): State<AppState>,
) -> Result<Json<Value>, ErrorReply> {
    list_for(&state, "clear-all").await
}

async fn list_for(state: &AppState, symbol: &str) -> Result<Json<Value>, ErrorReply> {
    let marks = state
        .marks
        .list(symbol)
        .await
        .map_err(|err| state.reject(err))?;
    Ok(Json(json!({ "success": true, "marks": marks })))
}

pub(crate) async fn delete_mark(
    State(state): State<AppState>,
    Path((symbol, timestamp)): Path<(String, String)>,
) -> Result<Json<Value>, ErrorReply> {
    let timestamp = parse_timestamp_str(&timestamp).map_err(|err| state.reject(err))?;
    state
        .marks
        .delete(&symbol, timestamp)
        .await
        .map_err(|err| state.reject(err))?;
    info!(%symbol, timestamp, "mark deleted");
    Ok(Json(json!({ "success": true, "message": MARK_DELETED })))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ClearMarksBody {
    #[serde(default)]
    symbol: Option<String>,
}

pub(crate) async fn clear_marks(
    State(state): State<AppState>,
    body: Result<Json<ClearMarksBody>, JsonRejection>,
) -> Result<Json<Value>, ErrorReply> {
    let Json(body) = body.map_err(|rej| state.reject(ApiError::Validation(rej.body_text())))?;
    let symbol = body
        .symbol
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| state.reject(ModelError::MissingSymbol))?;
    let deleted = state
        .marks
        .delete_all(&symbol)
        .await
        .map_err(|err| state.reject(err))?;
    info!(%symbol, deleted, "marks cleared");
    Ok(Json(json!({
        "success": true,
        "deletedCount": deleted,
        "message": MARKS_CLEARED,
    })))
}
