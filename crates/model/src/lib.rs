//! Shared records for chart marks and saved chart layouts.

mod error;
mod mark;
mod resolution;
mod snapshot;

pub use error::ModelError;
pub use mark::{
    align_mark_timestamp, parse_mark_date, parse_timestamp_str, parse_timestamp_value, Mark,
    MarkDraft, NewMark,
};
pub use resolution::{Resolution, SUPPORTED_RESOLUTIONS};
pub use snapshot::{ChartSnapshot, ChartSummary, NewSnapshot, SnapshotDraft};
