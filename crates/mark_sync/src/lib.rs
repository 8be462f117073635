//! Client side of chart mark synchronisation: the REST client, the retrying
//! save/clear protocol and the per-chart session that mirrors server marks
//! onto a drawing surface.

mod api;
mod error;
mod http;
mod protocol;
mod session;

#[cfg(test)]
mod fake;

pub use api::MarkApi;
pub use error::SyncError;
pub use http::HttpClient;
pub use protocol::{
    ClearOutcome, MarkSync, CLEAR_ATTEMPTS, RETRY_BASE_DELAY, RETRY_MAX_DELAY, SAVE_ATTEMPTS,
};
pub use session::{ChartSession, ChartSurface, EntityId, MarkVisibility, MirrorEntry, SurfaceError};
