//! Read-only access to Binance spot market data, shaped for the chart widget's
//! UDF datafeed.

use std::time::Duration;

use async_trait::async_trait;
use model::Resolution;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com/api/v3";
pub const DEFAULT_KLINE_LIMIT: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("exchange request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed exchange payload: {0}")]
    Payload(String),

    #[error("{0}")]
    OutOfRange(String),
}

/// Symbol entry in the widget's search format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub full_name: String,
    pub description: String,
    pub exchange: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub symbol: String,
    pub resolution: Resolution,
    /// Seconds since epoch, as the widget sends them.
    pub from: i64,
    pub to: i64,
    pub limit: u32,
}

impl HistoryRequest {
    /// The `from`/`to` window in milliseconds, as the exchange takes it.
    pub fn window_ms(&self) -> Result<(i64, i64), VenueError> {
        let to_ms = |field: &str, secs: i64| {
            secs.checked_mul(1000)
                .ok_or_else(|| VenueError::OutOfRange(format!("`{field}` is out of range")))
        };
        Ok((to_ms("from", self.from)?, to_ms("to", self.to)?))
    }
}

/// UDF `history` response: parallel arrays with times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "s")]
pub enum UdfHistory {
    #[serde(rename = "ok")]
    Ok {
        t: Vec<i64>,
        o: Vec<f64>,
        h: Vec<f64>,
        l: Vec<f64>,
        c: Vec<f64>,
        v: Vec<f64>,
    },
    #[serde(rename = "no_data")]
    NoData,
    #[serde(rename = "error")]
    Error { errmsg: String },
}

impl UdfHistory {
    pub fn from_bars(bars: &[Bar]) -> Self {
        if bars.is_empty() {
            return UdfHistory::NoData;
        }
        UdfHistory::Ok {
            t: bars.iter().map(|b| b.open_time_ms / 1000).collect(),
            o: bars.iter().map(|b| b.open).collect(),
            h: bars.iter().map(|b| b.high).collect(),
            l: bars.iter().map(|b| b.low).collect(),
            c: bars.iter().map(|b| b.close).collect(),
            v: bars.iter().map(|b| b.volume).collect(),
        }
    }
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Currently tradable symbols.
    async fn symbols(&self) -> Result<Vec<SymbolInfo>, VenueError>;

    async fn klines(&self, request: &HistoryRequest) -> Result<Vec<Bar>, VenueError>;

    async fn last_price(&self, symbol: &str) -> Result<f64, VenueError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfo {
    pub symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbol {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

pub fn tradable_symbols(info: ExchangeInfo) -> Vec<SymbolInfo> {
    info.symbols
        .into_iter()
        .filter(|s| s.status == "TRADING")
        .map(|s| SymbolInfo {
            full_name: s.symbol.clone(),
            description: format!("{}/{}", s.base_asset, s.quote_asset),
            symbol: s.symbol,
            exchange: "BINANCE".to_string(),
            kind: "crypto".to_string(),
        })
        .collect()
}

/// Parses one kline row: `[openTime, open, high, low, close, volume, ...]`
/// with prices as decimal strings.
pub fn parse_kline(row: &[Value]) -> Result<Bar, VenueError> {
    if row.len() < 6 {
        return Err(VenueError::Payload(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }
    let open_time_ms = row[0]
        .as_i64()
        .ok_or_else(|| VenueError::Payload(format!("kline open time {}", row[0])))?;
    let field = |idx: usize| -> Result<f64, VenueError> {
        let value = match &row[idx] {
            Value::String(s) => s.parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        value.ok_or_else(|| VenueError::Payload(format!("kline field {idx}: {}", row[idx])))
    };
    Ok(Bar {
        open_time_ms,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[derive(Debug, Clone)]
pub struct BinanceClient {
    base_url: String,
    http: reqwest::Client,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, VenueError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, VenueError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, "exchange request");
        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn symbols(&self) -> Result<Vec<SymbolInfo>, VenueError> {
        let info: ExchangeInfo = self.get_json("/exchangeInfo", &[]).await?;
        Ok(tradable_symbols(info))
    }

    async fn klines(&self, request: &HistoryRequest) -> Result<Vec<Bar>, VenueError> {
        let (start_ms, end_ms) = request.window_ms()?;
        let query = [
            ("symbol", request.symbol.clone()),
            ("interval", request.resolution.exchange_interval().to_string()),
            ("startTime", start_ms.to_string()),
            ("endTime", end_ms.to_string()),
            ("limit", request.limit.to_string()),
        ];
        let rows: Vec<Vec<Value>> = self.get_json("/klines", &query).await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, VenueError> {
        let ticker: TickerPrice = self
            .get_json("/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|_| VenueError::Payload(format!("ticker price {}", ticker.price)))
    }
}
