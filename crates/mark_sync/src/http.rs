use async_trait::async_trait;
use model::{ChartSummary, Mark, NewMark};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{MarkApi, SyncError};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct MessageReply {
    message: String,
}

#[derive(Deserialize)]
struct MarksReply {
    marks: Vec<Mark>,
}

#[derive(Deserialize)]
struct ClearReply {
    #[serde(rename = "deletedCount")]
    deleted_count: u64,
}

#[derive(Deserialize)]
struct ChartsReply {
    charts: Map<String, Value>,
}

#[derive(Deserialize)]
struct ChartReply {
    chart: Value,
}

#[derive(Deserialize)]
struct SavedReply {
    id: String,
}

/// `chartd` REST client. Uses the transport's default timeouts.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| SyncError::Validation(format!("invalid server url {base_url}: {err}")))?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Saved layouts, newest first.
    pub async fn list_charts(&self) -> Result<Vec<(String, ChartSummary)>, SyncError> {
        let reply: ChartsReply = self.read(self.http.get(self.url(&["api", "charts"])?)).await?;
        reply
            .charts
            .into_iter()
            .map(|(id, summary)| {
                let summary = serde_json::from_value(summary)
                    .map_err(|err| SyncError::Decode(format!("chart {id}: {err}")))?;
                Ok((id, summary))
            })
            .collect()
    }

    pub async fn get_chart(&self, id: &str) -> Result<Value, SyncError> {
        let reply: ChartReply = self
            .read(self.http.get(self.url(&["api", "charts", id])?))
            .await?;
        Ok(reply.chart)
    }

    /// Returns the id of the new snapshot.
    pub async fn save_chart(&self, title: &str, state: &Value) -> Result<String, SyncError> {
        let request = self
            .http
            .post(self.url(&["api", "save-chart"])?)
            .json(&json!({ "title": title, "chartState": state }));
        let reply: SavedReply = self.read(request).await?;
        Ok(reply.id)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Validation(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(status = status.as_u16(), len = bytes.len(), "chartd response");
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|body| body.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(SyncError::from_status(status.as_u16(), message));
        }
        serde_json::from_slice(&bytes).map_err(|err| SyncError::Decode(err.to_string()))
    }
}

#[async_trait]
impl MarkApi for HttpClient {
    async fn create_mark(&self, mark: &NewMark) -> Result<String, SyncError> {
        let request = self
            .http
            .post(self.url(&["api", "mark-date"])?)
            .json(&json!({
                "symbol": mark.symbol,
                "timestamp": mark.timestamp,
                "date": mark.date,
            }));
        let reply: MessageReply = self.read(request).await?;
        Ok(reply.message)
    }

    async fn list_marks(&self, symbol: &str) -> Result<Vec<Mark>, SyncError> {
        let reply: MarksReply = self
            .read(self.http.get(self.url(&["api", "marks", symbol])?))
            .await?;
        Ok(reply.marks)
    }

    async fn delete_mark(&self, symbol: &str, timestamp: i64) -> Result<(), SyncError> {
        let timestamp = timestamp.to_string();
        let url = self.url(&["api", "marks", "delete", symbol, &timestamp])?;
        let _: MessageReply = self.read(self.http.delete(url)).await?;
        Ok(())
    }

    async fn clear_marks(&self, symbol: &str) -> Result<u64, SyncError> {
        let request = self
            .http
            .delete(self.url(&["api", "marks", "clear-all"])?)
            .json(&json!({ "symbol": symbol }));
        let reply: ClearReply = self.read(request).await?;
        Ok(reply.deleted_count)
    }
}
