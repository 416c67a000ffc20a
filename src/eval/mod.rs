pub(crate) mod interpreter;
pub(crate) mod state;
pub(crate) mod until;

use chrono::NaiveDate;
use serde::Serialize;

use crate::foundation::time::SECS_PER_HOUR;

/// One resolved media item and where it sits in the day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlaylistItem {
    pub path: String,
    /// Seconds since the day's start hour.
    pub start_secs: u64,
    pub duration_secs: u64,
}

impl PlaylistItem {
    pub fn end_secs(&self) -> u64 {
        self.start_secs + self.duration_secs
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpgSubject {
    /// A whole `play --as-block` run, listed under the pool's name.
    Pool { label: String },
    /// A single item and the pool (or `file`) it came from.
    Item { group: String, path: String },
}

/// Guide entry as emitted by the interpreter, before display formatting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawEpgEntry {
    /// Wall-clock seconds since midnight (may exceed one day for late-night schedules).
    pub offset_secs: u64,
    pub subject: EpgSubject,
}

/// Output of evaluating one block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DayRun {
    pub entry: String,
    pub date: Option<NaiveDate>,
    pub start_hour: u32,
    pub playlist: Vec<PlaylistItem>,
    pub epg: Vec<RawEpgEntry>,
    /// Lines emitted by `print`.
    pub log: Vec<String>,
}

impl DayRun {
    pub fn total_secs(&self) -> u64 {
        self.playlist.last().map(PlaylistItem::end_secs).unwrap_or(0)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.playlist.iter().map(|i| i.path.as_str())
    }

    /// Wall-clock seconds since midnight at which the day starts.
    pub fn start_offset_secs(&self) -> u64 {
        u64::from(self.start_hour) * SECS_PER_HOUR
    }
}
