/// Rejections raised while turning raw request input into records.
///
/// The display strings double as the client-facing `error` message, so they
/// are kept short and stable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unsupported resolution: {0}")]
    UnsupportedResolution(String),

    #[error("Symbol is required")]
    MissingSymbol,

    #[error("Title is required")]
    MissingTitle,

    #[error("Chart state is required")]
    MissingState,
}
