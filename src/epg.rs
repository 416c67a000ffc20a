//! Program guide assembly.
//!
//! Turns the interpreter's [`RawEpgEntry`] list into display rows: clock strings, cleaned-up
//! titles and group labels. Nothing here feeds back into the playlist.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::eval::{EpgSubject, RawEpgEntry};
use crate::foundation::time::{SECS_PER_DAY, SECS_PER_HOUR, SECS_PER_MINUTE};
use crate::pool::season::SEASONAL_MARKERS;

/// Release/quality tags trimmed from the end of titles (lowercase).
pub const QUALITY_TAGS: &[&str] = &[
    "2160p", "1080p", "720p", "480p", "4k", "hdtv", "webrip", "web-dl", "bluray", "dvdrip",
    "x264", "x265", "hevc", "h264",
];

/// Guide slots are quarter hours.
pub const SLOT_SECS: u64 = 15 * SECS_PER_MINUTE;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuideEntry {
    pub offset_secs: u64,
    /// `HH:MM`, 24-hour.
    pub time: String,
    /// `h:MMam`, 12-hour.
    pub time_12h: String,
    /// 12-hour time snapped to the nearest slot.
    pub slot: String,
    pub group: String,
    pub title: String,
}

/// Guide rows per broadcast day.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Guide {
    pub days: BTreeMap<NaiveDate, Vec<GuideEntry>>,
}

impl Guide {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_day(&mut self, date: NaiveDate, raw: &[RawEpgEntry]) {
        self.days.insert(date, build_entries(raw));
    }

    pub fn day(&self, date: NaiveDate) -> Option<&[GuideEntry]> {
        self.days.get(&date).map(Vec::as_slice)
    }
}

pub fn build_entries(raw: &[RawEpgEntry]) -> Vec<GuideEntry> {
    raw.iter().map(build_entry).collect()
}

fn build_entry(raw: &RawEpgEntry) -> GuideEntry {
    let (group, title) = match &raw.subject {
        EpgSubject::Pool { label } => {
            let label = group_label(label);
            (label.clone(), label)
        }
        EpgSubject::Item { group, path } => (group_label(group), display_title(path)),
    };
    let (h, m) = clock(raw.offset_secs);
    let (sh, sm) = clock(snap_to_slot(raw.offset_secs));
    GuideEntry {
        offset_secs: raw.offset_secs,
        time: format!("{h:02}:{m:02}"),
        time_12h: twelve_hour(h, m),
        slot: twelve_hour(sh, sm),
        group,
        title,
    }
}

/// Hour and minute of day for a wall-clock offset (wraps past midnight).
pub fn clock(offset_secs: u64) -> (u32, u32) {
    let secs = offset_secs % SECS_PER_DAY;
    (
        (secs / SECS_PER_HOUR) as u32,
        ((secs % SECS_PER_HOUR) / SECS_PER_MINUTE) as u32,
    )
}

pub fn hhmm(offset_secs: u64) -> String {
    let (h, m) = clock(offset_secs);
    format!("{h:02}:{m:02}")
}

pub fn twelve_hour(hour: u32, minute: u32) -> String {
    let suffix = if hour < 12 { "am" } else { "pm" };
    let h = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{h}:{minute:02}{suffix}")
}

/// Round to the nearest quarter hour (ties round up).
pub fn snap_to_slot(offset_secs: u64) -> u64 {
    (offset_secs + SLOT_SECS / 2) / SLOT_SECS * SLOT_SECS
}

/// Human title for a media path: `The_Office_S01E01_720p.mkv` → `The Office S01E01`.
pub fn display_title(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    };
    let spaced = stem.replace(['_', '.'], " ");
    let mut words: Vec<&str> = spaced.split_whitespace().collect();
    while let Some(last) = words.last() {
        if is_tag(last) && words.len() > 1 {
            words.pop();
        } else {
            break;
        }
    }
    split_camel(&words.join(" "))
}

/// Label for a pool name: `Videos/SaturdayCartoons#am` → `Saturday Cartoons`.
pub fn group_label(pool: &str) -> String {
    let source = pool.split('#').next().unwrap_or(pool);
    let last = source
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source);
    split_camel(&last.replace('_', " "))
}

fn is_tag(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    if SEASONAL_MARKERS.iter().any(|(m, _)| *m == lower) {
        return true;
    }
    let bare = lower.trim_matches(|c| matches!(c, '[' | ']' | '(' | ')'));
    QUALITY_TAGS.contains(&bare)
}

fn split_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if let Some(p) = prev
            && p.is_lowercase()
            && c.is_uppercase()
        {
            out.push(' ');
        }
        out.push(c);
        prev = Some(c);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
