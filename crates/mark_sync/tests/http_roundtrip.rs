use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use api::{router, ApiConfig, AppState};
use async_trait::async_trait;
use mark_sync::{
    ChartSession, ChartSurface, ClearOutcome, EntityId, HttpClient, MarkApi, MarkSync, SurfaceError,
    SyncError,
};
use metrics::MetricsHandle;
use model::{NewMark, Resolution};
use retry::RetryPolicy;
use serde_json::json;
use storage::Store;
use venue_binance::{Bar, HistoryRequest, MarketData, SymbolInfo, VenueError};

struct NoMarket;

#[async_trait]
impl MarketData for NoMarket {
    async fn symbols(&self) -> Result<Vec<SymbolInfo>, VenueError> {
        Ok(Vec::new())
    }

    async fn klines(&self, _request: &HistoryRequest) -> Result<Vec<Bar>, VenueError> {
        Ok(Vec::new())
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, VenueError> {
        Err(VenueError::Payload(format!("no price for {symbol}")))
    }
}

#[derive(Default)]
struct TextSurface {
    next: u32,
    drawn: Vec<(EntityId, i64)>,
}

impl ChartSurface for TextSurface {
    fn create_mark_shape(&mut self, timestamp: i64) -> Result<EntityId, SurfaceError> {
        self.next += 1;
        let id = format!("mark-{}", self.next);
        self.drawn.push((id.clone(), timestamp));
        Ok(id)
    }

    fn remove_entity(&mut self, id: &EntityId) -> Result<(), SurfaceError> {
        self.drawn.retain(|(drawn, _)| drawn != id);
        Ok(())
    }
}

async fn spawn_server() -> SocketAddr {
    let store = Store::connect("sqlite::memory:").await.expect("store");
    let config = ApiConfig {
        store_retry: RetryPolicy::linear(3, Duration::ZERO),
        ..ApiConfig::default()
    };
    let metrics = MetricsHandle::new().expect("metrics");
    let state = AppState::new(store, Arc::new(NoMarket), metrics, &config);
    let app = router(state, &config);

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = axum::Server::from_tcp(listener)
        .expect("server from listener")
        .serve(app.into_make_service());
    tokio::spawn(async move {
        let _ = server.await;
    });
    addr
}

fn client(addr: SocketAddr) -> Arc<HttpClient> {
    Arc::new(HttpClient::new(&format!("http://{addr}")).expect("client"))
}

fn instant_sync(api: Arc<HttpClient>) -> MarkSync {
    MarkSync::with_policies(
        api,
        RetryPolicy::exponential(6, Duration::ZERO, Duration::ZERO),
        RetryPolicy::exponential(3, Duration::ZERO, Duration::ZERO),
    )
}

#[tokio::test]
async fn create_twice_stores_one_mark_over_http() {
    let addr = spawn_server().await;
    let api = client(addr);
    let mark = NewMark {
        symbol: "BTCUSDT".into(),
        timestamp: 1_700_000_000_000,
        date: "2023-11-14".into(),
    };

    assert_eq!(api.create_mark(&mark).await.expect("first"), "Mark created successfully");
    assert_eq!(api.create_mark(&mark).await.expect("second"), "Mark already exists");

    let marks = api.list_marks("BTCUSDT").await.expect("list");
    assert_eq!(marks.len(), 1);
    assert_eq!(marks[0].timestamp, 1_700_000_000_000);
    assert_eq!(marks[0].date, "2023-11-14");
}

#[tokio::test]
async fn server_errors_map_onto_sync_errors() {
    let addr = spawn_server().await;
    let api = client(addr);

    assert_eq!(
        api.delete_mark("BTCUSDT", 1_700_000_000_000).await,
        Err(SyncError::NotFound("Mark not found".into()))
    );
    assert_eq!(
        api.create_mark(&NewMark {
            symbol: "BTCUSDT".into(),
            timestamp: 1,
            date: " ".into(),
        })
        .await,
        Err(SyncError::Validation("Missing required fields".into()))
    );
}

#[tokio::test]
async fn unreachable_server_is_a_retryable_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let err = client(addr).list_marks("BTCUSDT").await.expect_err("must fail");
    assert!(matches!(err, SyncError::Network(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn session_round_trip_against_live_server() {
    let addr = spawn_server().await;
    let api = client(addr);
    let sync = instant_sync(api.clone());
    let mut session = ChartSession::new(sync.clone(), TextSurface::default(), "BTCUSDT", Resolution::Days(1));

    session.mark_date("2023-11-14").await.expect("mark 14th");
    session.mark_date("2023-11-15").await.expect("mark 15th");
    session.mark_date("2023-11-14").await.expect("mark 14th again");
    let timestamps: Vec<i64> = session.marks().iter().map(|m| m.timestamp).collect();
    assert_eq!(timestamps, vec![1_699_920_000_000, 1_700_006_400_000]);

    session.remove_mark(1_699_920_000_000).await.expect("remove");
    assert_eq!(session.marks().len(), 1);

    assert_eq!(session.switch_symbol("ETHUSDT").await.expect("switch"), 0);
    assert!(session.surface().drawn.is_empty());
    assert_eq!(
        session.clear_all_marks().await.expect("clear"),
        ClearOutcome::AlreadyEmpty
    );

    assert_eq!(
        sync.delete_all_with_retry("BTCUSDT").await.expect("clear"),
        ClearOutcome::Cleared(1)
    );
}

#[tokio::test]
async fn chart_snapshots_over_http() {
    let addr = spawn_server().await;
    let api = client(addr);
    let state = json!({ "charts": [{ "panes": [] }], "symbol": "BTCUSDT" });

    let id = api.save_chart("morning", &state).await.expect("save");
    assert_eq!(api.get_chart(&id).await.expect("get"), state);

    let listed = api.list_charts().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, id);
    assert_eq!(listed[0].1.title, "morning");

    assert!(matches!(
        api.get_chart("missing").await,
        Err(SyncError::NotFound(_))
    ));
}
