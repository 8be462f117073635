#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api::{router, ApiConfig, AppState};
use async_trait::async_trait;
use axum::Router;
use hyper::{Body, Request, StatusCode};
use metrics::MetricsHandle;
use model::{ChartSnapshot, ChartSummary, Mark, NewMark, NewSnapshot};
use retry::RetryPolicy;
use serde_json::Value;
use storage::{ChartStore, MarkStore, Store, StoreError};
use tower::ServiceExt;
use venue_binance::{Bar, HistoryRequest, MarketData, SymbolInfo, VenueError};

pub struct FakeMarket {
    pub fail: bool,
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn symbols(&self) -> Result<Vec<SymbolInfo>, VenueError> {
        if self.fail {
            return Err(VenueError::Payload("exchange down".into()));
        }
        Ok(vec![SymbolInfo {
            symbol: "BTCUSDT".into(),
            full_name: "BTCUSDT".into(),
            description: "BTC/USDT".into(),
            exchange: "BINANCE".into(),
            kind: "crypto".into(),
        }])
    }

    async fn klines(&self, request: &HistoryRequest) -> Result<Vec<Bar>, VenueError> {
        if self.fail {
            return Err(VenueError::Payload("exchange down".into()));
        }
        if request.symbol == "EMPTY" {
            return Ok(Vec::new());
        }
        let (start_ms, _) = request.window_ms()?;
        Ok(vec![
            Bar {
                open_time_ms: start_ms,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 100.0,
            },
            Bar {
                open_time_ms: start_ms + 60_000,
                open: 1.5,
                high: 2.5,
                low: 1.0,
                close: 2.0,
                volume: 50.0,
            },
        ])
    }

    async fn last_price(&self, _symbol: &str) -> Result<f64, VenueError> {
        if self.fail {
            return Err(VenueError::Payload("exchange down".into()));
        }
        Ok(35_123.5)
    }
}

/// Store whose inserts fail as unavailable a set number of times.
#[derive(Clone)]
pub struct FlakyStore {
    inner: Store,
    insert_failures: Arc<AtomicU32>,
    insert_calls: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new(inner: Store, insert_failures: u32) -> Self {
        Self {
            inner,
            insert_failures: Arc::new(AtomicU32::new(insert_failures)),
            insert_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarkStore for FlakyStore {
    async fn find_mark(&self, symbol: &str, timestamp: i64) -> Result<Option<Mark>, StoreError> {
        self.inner.find_mark(symbol, timestamp).await
    }

    async fn insert_mark(&self, mark: &NewMark) -> Result<Mark, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .insert_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::Unavailable("pool timed out while waiting".into()));
        }
        self.inner.insert_mark(mark).await
    }

    async fn list_marks(&self, symbol: &str) -> Result<Vec<Mark>, StoreError> {
        self.inner.list_marks(symbol).await
    }

    async fn delete_mark(&self, symbol: &str, timestamp: i64) -> Result<u64, StoreError> {
        self.inner.delete_mark(symbol, timestamp).await
    }

    async fn delete_marks(&self, symbol: &str) -> Result<u64, StoreError> {
        self.inner.delete_marks(symbol).await
    }
}

#[async_trait]
impl ChartStore for FlakyStore {
    async fn insert_chart(&self, snapshot: &NewSnapshot) -> Result<ChartSnapshot, StoreError> {
        self.inner.insert_chart(snapshot).await
    }

    async fn list_charts(&self) -> Result<Vec<(String, ChartSummary)>, StoreError> {
        self.inner.list_charts().await
    }

    async fn get_chart(&self, id: &str) -> Result<Option<ChartSnapshot>, StoreError> {
        self.inner.get_chart(id).await
    }
}

pub async fn memory_store() -> Store {
    Store::connect("sqlite::memory:")
        .await
        .expect("in-memory store should open")
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        store_retry: RetryPolicy::linear(3, Duration::ZERO),
        ..ApiConfig::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub metrics: MetricsHandle,
}

pub fn build_app<S>(store: S, market: FakeMarket, config: ApiConfig) -> TestApp
where
    S: MarkStore + ChartStore + Clone + 'static,
{
    let metrics = MetricsHandle::new().expect("metrics registry");
    let state = AppState::new(store, Arc::new(market), metrics.clone(), &config);
    TestApp {
        router: router(state, &config),
        metrics,
    }
}

pub async fn default_app() -> TestApp {
    build_app(memory_store().await, FakeMarket { fail: false }, test_config())
}

pub async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("body should read");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

pub async fn send_raw(app: &TestApp, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("body should read");
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}
