//! In-memory [`MarkApi`] with scripted failures.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use model::{Mark, NewMark};

use crate::{MarkApi, SyncError};

#[derive(Default)]
struct FakeState {
    marks: BTreeMap<(String, i64), Mark>,
    next_id: i64,
    create_failures: VecDeque<SyncError>,
    lost_create_replies: u32,
    clear_failures: VecDeque<SyncError>,
    delete_failures: VecDeque<SyncError>,
    list_failures: VecDeque<SyncError>,
    create_calls: u32,
    clear_calls: u32,
    delete_calls: u32,
    list_calls: u32,
}

impl FakeState {
    fn insert(&mut self, symbol: &str, timestamp: i64, date: &str) {
        self.next_id += 1;
        self.marks.insert(
            (symbol.to_string(), timestamp),
            Mark {
                id: self.next_id,
                symbol: symbol.to_string(),
                timestamp,
                date: date.to_string(),
                created_at: Utc::now(),
            },
        );
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().expect("fake api lock");
        f(&mut state)
    }

    pub(crate) fn seed(&self, symbol: &str, timestamps: &[i64]) {
        self.with(|s| {
            for ts in timestamps {
                s.insert(symbol, *ts, "seeded");
            }
        });
    }

    pub(crate) fn stored(&self, symbol: &str) -> Vec<i64> {
        self.with(|s| {
            s.marks
                .keys()
                .filter(|(sym, _)| sym == symbol)
                .map(|(_, ts)| *ts)
                .collect()
        })
    }

    pub(crate) fn fail_creates(&self, times: usize, err: SyncError) {
        self.with(|s| s.create_failures.extend(std::iter::repeat(err).take(times)));
    }

    /// Stores the mark but reports a transport failure, as when the reply is lost.
    pub(crate) fn lose_create_replies(&self, times: u32) {
        self.with(|s| s.lost_create_replies = times);
    }

    pub(crate) fn fail_clears(&self, times: usize, err: SyncError) {
        self.with(|s| s.clear_failures.extend(std::iter::repeat(err).take(times)));
    }

    pub(crate) fn fail_deletes(&self, times: usize, err: SyncError) {
        self.with(|s| s.delete_failures.extend(std::iter::repeat(err).take(times)));
    }

    pub(crate) fn fail_lists(&self, times: usize, err: SyncError) {
        self.with(|s| s.list_failures.extend(std::iter::repeat(err).take(times)));
    }

    pub(crate) fn create_calls(&self) -> u32 {
        self.with(|s| s.create_calls)
    }

    pub(crate) fn clear_calls(&self) -> u32 {
        self.with(|s| s.clear_calls)
    }

    pub(crate) fn delete_calls(&self) -> u32 {
        self.with(|s| s.delete_calls)
    }

    pub(crate) fn list_calls(&self) -> u32 {
        self.with(|s| s.list_calls)
    }
}

#[async_trait]
impl MarkApi for FakeApi {
    async fn create_mark(&self, mark: &NewMark) -> Result<String, SyncError> {
        self.with(|s| {
            s.create_calls += 1;
            if let Some(err) = s.create_failures.pop_front() {
                return Err(err);
            }
            if s.marks.contains_key(&(mark.symbol.clone(), mark.timestamp)) {
                return Ok("Mark already exists".to_string());
            }
            s.insert(&mark.symbol, mark.timestamp, &mark.date);
            if s.lost_create_replies > 0 {
                s.lost_create_replies -= 1;
                return Err(SyncError::Network("reply lost".into()));
            }
            Ok("Mark created successfully".to_string())
        })
    }

    async fn list_marks(&self, symbol: &str) -> Result<Vec<Mark>, SyncError> {
        self.with(|s| {
            s.list_calls += 1;
            if let Some(err) = s.list_failures.pop_front() {
                return Err(err);
            }
            Ok(s
                .marks
                .values()
                .filter(|m| m.symbol == symbol)
                .cloned()
                .collect())
        })
    }

    async fn delete_mark(&self, symbol: &str, timestamp: i64) -> Result<(), SyncError> {
        self.with(|s| {
            s.delete_calls += 1;
            if let Some(err) = s.delete_failures.pop_front() {
                return Err(err);
            }
            s.marks
                .remove(&(symbol.to_string(), timestamp))
                .map(|_| ())
                .ok_or_else(|| SyncError::NotFound("Mark not found".into()))
        })
    }

    async fn clear_marks(&self, symbol: &str) -> Result<u64, SyncError> {
        self.with(|s| {
            s.clear_calls += 1;
            if let Some(err) = s.clear_failures.pop_front() {
                return Err(err);
            }
            let before = s.marks.len();
            s.marks.retain(|(sym, _), _| sym != symbol);
            match (before - s.marks.len()) as u64 {
                0 => Err(SyncError::NotFound("No marks found to delete".into())),
                deleted => Ok(deleted),
            }
        })
    }
}
