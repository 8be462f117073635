//! REST surface for chart marks, saved layouts and the market-data proxy.

mod charts;
mod error;
mod market;
mod marks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, MatchedPath, State};
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics::MetricsHandle;
use retry::RetryPolicy;
use storage::{ChartStore, MarkStore};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use venue_binance::MarketData;

pub use error::{ApiError, ErrorReply, REDACTED_MESSAGE};
pub use marks::{CreateOutcome, MarkService};

/// Chart states from the widget run to several megabytes.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Hide server-side error detail from clients.
    pub hardened: bool,
    pub store_retry: RetryPolicy,
    pub body_limit_bytes: usize,
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            hardened: false,
            store_retry: RetryPolicy::linear(3, Duration::from_secs(1)),
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            static_dir: None,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub marks: MarkService,
    pub charts: Arc<dyn ChartStore>,
    pub market: Arc<dyn MarketData>,
    pub metrics: MetricsHandle,
    pub hardened: bool,
}

impl AppState {
    pub fn new<S>(
        store: S,
        market: Arc<dyn MarketData>,
        metrics: MetricsHandle,
        config: &ApiConfig,
    ) -> Self
    where
        S: MarkStore + ChartStore + Clone + 'static,
    {
        let marks = MarkService::new(Arc::new(store.clone()), config.store_retry, &metrics);
        Self {
            marks,
            charts: Arc::new(store),
            market,
            metrics,
            hardened: config.hardened,
        }
    }

    pub fn reject(&self, err: impl Into<ApiError>) -> ErrorReply {
        ErrorReply::new(err.into(), self.hardened)
    }
}

pub fn router(state: AppState, config: &ApiConfig) -> Router {
    let api = Router::new()
        .route(
            "/api/charts",
            get(charts::list_charts).post(charts::save_chart),
        )
        .route("/api/save-chart", post(charts::save_chart))
        .route("/api/charts/:id", get(charts::get_chart))
        .route("/api/mark-date", post(marks::create_mark))
        .route(
            "/api/marks/clear-all",
            get(marks::list_clear_all_symbol).delete(marks::clear_marks),
        )
        .route(
            "/api/marks/delete/:symbol/:timestamp",
            delete(marks::delete_mark),
        )
        .route("/api/marks/:symbol", get(marks::list_marks))
        .route("/api/market/symbols", get(market::symbols))
        .route("/api/market/history", get(market::history))
        .route("/api/market/price/:symbol", get(market::price))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match &config.static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    }
}

async fn track_requests<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let response = next.run(req).await;
    state
        .metrics
        .record_request(&route, response.status().as_u16());
    response
}
