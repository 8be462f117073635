use std::collections::HashSet;

use chrono::{DateTime, Utc};
use model::{align_mark_timestamp, parse_mark_date, NewMark, Resolution};
use thiserror::Error;
use tracing::{info, warn};

use crate::{ClearOutcome, MarkSync, SyncError};

/// Handle the chart widget hands back for a drawn shape.
pub type EntityId = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chart surface: {0}")]
pub struct SurfaceError(pub String);

/// Where a mark stands between the user's action and the server's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkVisibility {
    Absent,
    PendingCreate,
    Visible,
    PendingDelete,
}

impl MarkVisibility {
    pub fn begin_create(self) -> Self {
        match self {
            MarkVisibility::Absent => MarkVisibility::PendingCreate,
            other => other,
        }
    }

    pub fn begin_delete(self) -> Self {
        match self {
            MarkVisibility::Visible => MarkVisibility::PendingDelete,
            other => other,
        }
    }

    /// Resolves a pending state once the server call has finished.
    pub fn settle(self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (MarkVisibility::PendingCreate, true) => MarkVisibility::Visible,
            (MarkVisibility::PendingCreate, false) => MarkVisibility::Absent,
            (MarkVisibility::PendingDelete, true) => MarkVisibility::Absent,
            (MarkVisibility::PendingDelete, false) => MarkVisibility::Visible,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MarkVisibility::Absent | MarkVisibility::Visible)
    }
}

/// The drawing side of the chart.
pub trait ChartSurface: Send {
    fn create_mark_shape(&mut self, timestamp: i64) -> Result<EntityId, SurfaceError>;

    fn remove_entity(&mut self, id: &EntityId) -> Result<(), SurfaceError>;

    /// Called on every visibility transition of a mark being mutated.
    fn mark_state_changed(&mut self, _timestamp: i64, _state: MarkVisibility) {}
}

/// A mark currently drawn on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub id: EntityId,
    pub timestamp: i64,
    pub symbol: String,
}

/// Client view of the marks for one displayed symbol.
///
/// The mirror is only ever a cache of the server's list: every mutation,
/// successful or not, ends with a full reload. Mutations take `&mut self`,
/// so one session never has two in flight.
pub struct ChartSession<S: ChartSurface> {
    sync: MarkSync,
    surface: S,
    symbol: String,
    resolution: Resolution,
    marks: Vec<MirrorEntry>,
    deleted: HashSet<i64>,
    selected: Option<EntityId>,
}

impl<S: ChartSurface> ChartSession<S> {
    pub fn new(sync: MarkSync, surface: S, symbol: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            sync,
            surface,
            symbol: symbol.into(),
            resolution,
            marks: Vec::new(),
            deleted: HashSet::new(),
            selected: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
    }

    pub fn marks(&self) -> &[MirrorEntry] {
        &self.marks
    }

    /// Timestamps this session deleted for the active symbol.
    pub fn recently_deleted(&self) -> &HashSet<i64> {
        &self.deleted
    }

    pub fn selected(&self) -> Option<&MirrorEntry> {
        let id = self.selected.as_ref()?;
        self.marks.iter().find(|m| &m.id == id)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn visibility(&self, timestamp: i64) -> MarkVisibility {
        if self.marks.iter().any(|m| m.timestamp == timestamp) {
            MarkVisibility::Visible
        } else {
            MarkVisibility::Absent
        }
    }

    /// Replaces the mirror with the server's list for the active symbol.
    /// Entity ids change on every load, so the selection is dropped. On
    /// failure the current mirror is left untouched.
    pub async fn load_marks(&mut self) -> Result<usize, SyncError> {
        let mut fetched = self.sync.list(&self.symbol).await?;
        fetched.sort_by_key(|m| m.timestamp);

        self.erase_all();
        self.selected = None;
        for mark in fetched {
            match self.surface.create_mark_shape(mark.timestamp) {
                Ok(id) => self.marks.push(MirrorEntry {
                    id,
                    timestamp: mark.timestamp,
                    symbol: self.symbol.clone(),
                }),
                Err(err) => warn!(symbol = %self.symbol, timestamp = mark.timestamp, error = %err, "failed to draw mark"),
            }
        }
        info!(symbol = %self.symbol, count = self.marks.len(), "marks loaded");
        Ok(self.marks.len())
    }

    /// Marks `date` (as typed by the user) at the current time of day.
    pub async fn mark_date(&mut self, date: &str) -> Result<MarkVisibility, SyncError> {
        self.mark_date_at(date, Utc::now()).await
    }

    pub async fn mark_date_at(&mut self, date: &str, now: DateTime<Utc>) -> Result<MarkVisibility, SyncError> {
        let day = parse_mark_date(date)?;
        let mark = NewMark {
            symbol: self.symbol.clone(),
            timestamp: align_mark_timestamp(day, self.resolution, now),
            date: date.trim().to_string(),
        };

        let pending = self.transition(mark.timestamp, self.visibility(mark.timestamp).begin_create());
        let result = self.sync.save_with_retry(&mark).await;
        if result.is_ok() {
            self.deleted.remove(&mark.timestamp);
        }
        self.reload_after("mark_date").await;
        let settled = self.settle(mark.timestamp, pending, result.is_ok());
        result.map(|_| settled)
    }

    /// Deletes the mark at `timestamp` for the active symbol. Single attempt.
    pub async fn remove_mark(&mut self, timestamp: i64) -> Result<(), SyncError> {
        let pending = self.transition(timestamp, self.visibility(timestamp).begin_delete());
        let result = self.sync.delete(&self.symbol, timestamp).await;
        if result.is_ok() {
            self.selected = None;
            self.deleted.insert(timestamp);
            if let Some(pos) = self.marks.iter().position(|m| m.timestamp == timestamp) {
                let entry = self.marks.remove(pos);
                self.erase(&entry.id);
            }
        }
        self.reload_after("remove_mark").await;
        self.settle(timestamp, pending, result.is_ok());
        result
    }

    /// Selecting a drawn entity that is not a mark clears the selection.
    pub fn select(&mut self, id: &EntityId) -> Option<&MirrorEntry> {
        self.selected = self
            .marks
            .iter()
            .any(|m| &m.id == id)
            .then(|| id.clone());
        self.selected()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub async fn remove_selected(&mut self) -> Result<(), SyncError> {
        let timestamp = self
            .selected()
            .map(|m| m.timestamp)
            .ok_or_else(|| SyncError::Validation("No mark selected".into()))?;
        self.remove_mark(timestamp).await
    }

    pub async fn clear_all_marks(&mut self) -> Result<ClearOutcome, SyncError> {
        let result = self.sync.delete_all_with_retry(&self.symbol).await;
        if result.is_ok() {
            self.erase_all();
            self.deleted.clear();
            self.selected = None;
        }
        self.reload_after("clear_all_marks").await;
        result
    }

    /// Drops every drawn mark, then loads the marks of `symbol`.
    pub async fn switch_symbol(&mut self, symbol: impl Into<String>) -> Result<usize, SyncError> {
        self.erase_all();
        self.deleted.clear();
        self.selected = None;
        self.symbol = symbol.into();
        self.load_marks().await
    }

    async fn reload_after(&mut self, op: &str) {
        if let Err(err) = self.load_marks().await {
            warn!(op, symbol = %self.symbol, error = %err, "reload after mutation failed");
        }
    }

    /// Final state of a mutated mark, read back from the reloaded mirror.
    fn settle(&mut self, timestamp: i64, pending: MarkVisibility, succeeded: bool) -> MarkVisibility {
        let expected = pending.settle(succeeded);
        let observed = self.visibility(timestamp);
        if observed != expected {
            warn!(timestamp, ?expected, ?observed, "mirror disagrees with server outcome");
        }
        self.transition(timestamp, observed)
    }

    fn transition(&mut self, timestamp: i64, state: MarkVisibility) -> MarkVisibility {
        self.surface.mark_state_changed(timestamp, state);
        state
    }

    fn erase_all(&mut self) {
        for entry in std::mem::take(&mut self.marks) {
            self.erase(&entry.id);
        }
    }

    fn erase(&mut self, id: &EntityId) {
        if let Err(err) = self.surface.remove_entity(id) {
            warn!(%id, error = %err, "failed to remove mark from chart");
        }
    }
}
