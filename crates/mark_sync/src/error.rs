use model::ModelError;
use thiserror::Error;

/// Failure of a call against the mark service, classified for retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The request was malformed. Retrying cannot help.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// The server answered with a 5xx.
    #[error("server error: {0}")]
    StoreUnavailable(String),
    /// No usable answer reached us.
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::StoreUnavailable(_) | SyncError::Network(_))
    }

    /// Maps a non-2xx response onto the taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 413 | 415 | 422 => SyncError::Validation(message),
            404 => SyncError::NotFound(message),
            500..=599 => SyncError::StoreUnavailable(message),
            _ => SyncError::Decode(format!("HTTP {status}: {message}")),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<ModelError> for SyncError {
    fn from(err: ModelError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_server_and_transport_failures_retry() {
        assert!(SyncError::StoreUnavailable("pool".into()).is_retryable());
        assert!(SyncError::Network("refused".into()).is_retryable());
        assert!(!SyncError::Validation("Missing required fields".into()).is_retryable());
        assert!(!SyncError::NotFound("Mark not found".into()).is_retryable());
        assert!(!SyncError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn statuses_map_onto_kinds() {
        assert_eq!(
            SyncError::from_status(400, "Invalid timestamp".into()),
            SyncError::Validation("Invalid timestamp".into())
        );
        assert_eq!(
            SyncError::from_status(404, "Mark not found".into()),
            SyncError::NotFound("Mark not found".into())
        );
        assert!(matches!(
            SyncError::from_status(503, "busy".into()),
            SyncError::StoreUnavailable(_)
        ));
        assert!(matches!(
            SyncError::from_status(302, "moved".into()),
            SyncError::Decode(_)
        ));
    }
}
