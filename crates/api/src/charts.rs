use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use model::SnapshotDraft;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::{ApiError, AppState, ErrorReply};

pub const CHART_SAVED: &str = "Version saved successfully";
pub const CHART_NOT_FOUND: &str = "Chart not found";

pub(crate) async fn list_charts(State(state): State<AppState>) -> Result<Json<Value>, ErrorReply> {
    let charts = state
        .charts
        .list_charts()
        .await
        .map_err(|err| state.reject(err))?;

    // Keyed by id, newest first.
    let mut by_id = Map::with_capacity(charts.len());
    for (id, summary) in charts {
        let summary = serde_json::to_value(summary)
            .map_err(|err| state.reject(ApiError::Internal(err.to_string())))?;
        by_id.insert(id, summary);
    }
    Ok(Json(json!({ "success": true, "charts": by_id })))
}

pub(crate) async fn get_chart(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ErrorReply> {
    let chart = state
        .charts
        .get_chart(&id)
        .await
        .map_err(|err| state.reject(err))?
        .ok_or_else(|| state.reject(ApiError::NotFound(CHART_NOT_FOUND.into())))?;
    Ok(Json(json!({ "success": true, "chart": chart.state })))
}

pub(crate) async fn save_chart(
    State(state): State<AppState>,
    body: Result<Json<SnapshotDraft>, JsonRejection>,
) -> Result<Json<Value>, ErrorReply> {
    let Json(draft) = body.map_err(|rej| state.reject(ApiError::Validation(rej.body_text())))?;
    let snapshot = draft.validate().map_err(|err| state.reject(err))?;
    let saved = state
        .charts
        .insert_chart(&snapshot)
        .await
        .map_err(|err| state.reject(err))?;
    info!(id = %saved.id, title = %saved.title, "chart saved");
    Ok(Json(json!({
        "success": true,
        "message": CHART_SAVED,
        "id": saved.id,
    })))
}
