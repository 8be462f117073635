use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use model::Resolution;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use venue_binance::{HistoryRequest, UdfHistory, DEFAULT_KLINE_LIMIT};

use crate::{ApiError, AppState, ErrorReply};

const HISTORY_FAILED: &str = "Failed to load data";

pub(crate) async fn symbols(State(state): State<AppState>) -> Result<Json<Value>, ErrorReply> {
    let symbols = state
        .market
        .symbols()
        .await
        .map_err(|err| state.reject(err))?;
    Ok(Json(json!({ "success": true, "symbols": symbols })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryParams {
    symbol: String,
    resolution: String,
    from: i64,
    to: i64,
    limit: Option<u32>,
}

/// UDF history. Upstream failures come back as `s: "error"` with a 200 so the
/// widget shows its own empty state.
pub(crate) async fn history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<UdfHistory>, ErrorReply> {
    let Query(params) =
        params.map_err(|rej| state.reject(ApiError::Validation(rej.body_text())))?;
    let resolution: Resolution = params
        .resolution
        .parse()
        .map_err(|err| state.reject(err))?;
    if params.from > params.to {
        return Err(state.reject(ApiError::Validation(
            "`from` must not be after `to`".into(),
        )));
    }

    let request = HistoryRequest {
        symbol: params.symbol,
        resolution,
        from: params.from,
        to: params.to,
        limit: params.limit.unwrap_or(DEFAULT_KLINE_LIMIT),
    };
    request.window_ms().map_err(|err| state.reject(err))?;

    let reply = match state.market.klines(&request).await {
        Ok(bars) => UdfHistory::from_bars(&bars),
        Err(err) => {
            warn!(symbol = %request.symbol, error = %err, "history request failed");
            UdfHistory::Error {
                errmsg: HISTORY_FAILED.to_string(),
            }
        }
    };
    Ok(Json(reply))
}

pub(crate) async fn price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ErrorReply> {
    let price = state
        .market
        .last_price(&symbol)
        .await
        .map_err(|err| state.reject(err))?;
    Ok(Json(json!({ "success": true, "symbol": symbol, "price": price })))
}
