use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ModelError;

/// A saved chart layout. `state` is the widget's own blob and is never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSnapshot {
    pub id: String,
    pub title: String,
    pub state: Value,
    pub saved_at: DateTime<Utc>,
}

impl ChartSnapshot {
    pub fn summary(&self) -> ChartSummary {
        ChartSummary {
            title: self.title.clone(),
            saved_at: self.saved_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSummary {
    pub title: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub title: String,
    pub state: Value,
}

/// Save-chart body; the widget page sends `chartState`, older callers `state`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "state")]
    pub chart_state: Option<Value>,
}

impl SnapshotDraft {
    pub fn validate(self) -> Result<NewSnapshot, ModelError> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ModelError::MissingTitle)?;
        let state = self
            .chart_state
            .filter(|s| !s.is_null())
            .ok_or(ModelError::MissingState)?;
        Ok(NewSnapshot { title, state })
    }
}
