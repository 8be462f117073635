mod sqlite_url;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use api::{router, ApiConfig, AppState};
use clap::Parser;
use metrics::MetricsHandle;
use retry::RetryPolicy;
use storage::{init_sqlite, StoreOptions};
use tokio::task;
use tracing::{info, warn, Level};
use uuid::Uuid;
use venue_binance::{BinanceClient, DEFAULT_BASE_URL};

use sqlite_url::{ensure_sqlite_parent_dir, validate_sqlite_url};

#[derive(Parser, Debug)]
#[command(name = "chartd", about = "Chart marks, saved layouts and market data")]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://data/charts.db")]
    database_url: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    listen_addr: SocketAddr,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    metrics_addr: SocketAddr,

    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 30)]
    db_connect_timeout_secs: u64,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    db_max_connections: u32,

    /// Replace server-side error detail with a generic message.
    #[arg(long, env = "HARDENED")]
    hardened: bool,

    /// Directory served for paths outside `/api`, e.g. the widget page.
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,

    #[arg(long, env = "EXCHANGE_API_URL", default_value = DEFAULT_BASE_URL)]
    exchange_api_url: String,

    #[arg(long, env = "EXCHANGE_TIMEOUT_SECS", default_value_t = 10)]
    exchange_timeout_secs: u64,

    #[arg(long, env = "BODY_LIMIT_MB", default_value_t = 50)]
    body_limit_mb: usize,

    #[arg(long, env = "STORE_RETRY_ATTEMPTS", default_value_t = 3)]
    store_retry_attempts: u32,

    #[arg(long, env = "STORE_RETRY_BASE_MS", default_value_t = 1000)]
    store_retry_base_ms: u64,
}

impl Args {
    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.db_max_connections,
            connect_timeout: Duration::from_secs(self.db_connect_timeout_secs),
        }
    }

    fn api_config(&self) -> ApiConfig {
        ApiConfig {
            hardened: self.hardened,
            store_retry: RetryPolicy::linear(
                self.store_retry_attempts,
                Duration::from_millis(self.store_retry_base_ms),
            ),
            body_limit_bytes: self.body_limit_mb.saturating_mul(1024 * 1024),
            static_dir: self.static_dir.clone(),
        }
    }
}

fn log_startup(args: &Args, run_id: &str) {
    info!(url = %args.database_url, "database configured");
    info!(addr = %args.listen_addr, "http bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    info!(url = %args.exchange_api_url, "exchange api configured");
    match &args.static_dir {
        Some(dir) => info!(dir = %dir.display(), "serving static files"),
        None => info!("static file serving disabled"),
    }
    if args.hardened {
        info!("hardened mode: server errors are redacted");
    }
    info!(%run_id, "run initialized");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    validate_sqlite_url(&args.database_url)?;
    info!(
        database = %args.database_url,
        listen = %args.listen_addr,
        "booting chartd"
    );

    ensure_sqlite_parent_dir(&args.database_url)?;

    let run_id = Uuid::new_v4().to_string();
    let store = init_sqlite(&args.database_url, &args.store_options()).await?;
    log_startup(&args, &run_id);

    let missing_tables = store.validate_required_tables().await?;
    if !missing_tables.is_empty() {
        warn!(tables = ?missing_tables, "sqlite missing required tables");
    }

    let metrics = MetricsHandle::new()?;
    let metrics_addr = args.metrics_addr;
    let metrics_task = metrics.clone();
    task::spawn(async move {
        if let Err(err) = metrics_task.serve(metrics_addr).await {
            tracing::error!(error = ?err, "metrics server error");
        }
    });

    let market = BinanceClient::new(
        args.exchange_api_url.as_str(),
        Duration::from_secs(args.exchange_timeout_secs),
    )?;
    let config = args.api_config();
    let state = AppState::new(store, Arc::new(market), metrics, &config);
    let app = router(state, &config);

    info!(
        run_id = %run_id,
        listen = %args.listen_addr,
        metrics_addr = %args.metrics_addr,
        "ready"
    );
    axum::Server::try_bind(&args.listen_addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(run_id = %run_id, "stopped");
    Ok(())
}
