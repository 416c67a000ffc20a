use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::eval::PlaylistItem;

/// Where playback should pick up inside a day's playlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResumePoint {
    /// The broadcast day has not begun yet.
    NotStarted,
    /// Seek `offset_secs` into item `index`.
    At { index: usize, offset_secs: u64 },
    /// Every item has already aired.
    Finished,
}

/// Locate `elapsed_secs` (seconds since the day's start hour) in `playlist`.
///
/// Only item durations are used; start times are re-accumulated so hand-built playlists work too.
pub fn resume(playlist: &[PlaylistItem], elapsed_secs: i64) -> ResumePoint {
    let Ok(elapsed) = u64::try_from(elapsed_secs) else {
        return ResumePoint::NotStarted;
    };
    let mut start = 0u64;
    for (index, item) in playlist.iter().enumerate() {
        if start + item.duration_secs > elapsed {
            return ResumePoint::At {
                index,
                offset_secs: elapsed - start,
            };
        }
        start += item.duration_secs;
    }
    ResumePoint::Finished
}

/// Seconds between the start hour on `now`'s date and `now`. Negative before the start hour.
pub fn elapsed_since_start(now: NaiveDateTime, start_hour: u32) -> i64 {
    let start_time = NaiveTime::from_hms_opt(start_hour.min(23), 0, 0).unwrap_or_default();
    (now - now.date().and_time(start_time)).num_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn playlist(durations: &[u64]) -> Vec<PlaylistItem> {
        let mut start = 0;
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let item = PlaylistItem {
                    path: format!("{i}.mp4"),
                    start_secs: start,
                    duration_secs: d,
                };
                start += d;
                item
            })
            .collect()
    }

    #[test]
    fn resumes_inside_the_covering_item() {
        let p = playlist(&[100, 150, 150]);
        assert_eq!(
            resume(&p, 150),
            ResumePoint::At {
                index: 1,
                offset_secs: 50
            }
        );
        assert_eq!(
            resume(&p, 0),
            ResumePoint::At {
                index: 0,
                offset_secs: 0
            }
        );
        assert_eq!(
            resume(&p, 250),
            ResumePoint::At {
                index: 2,
                offset_secs: 0
            }
        );
    }

    #[test]
    fn before_and_after_the_day() {
        let p = playlist(&[100, 150, 150]);
        assert_eq!(resume(&p, -1), ResumePoint::NotStarted);
        assert_eq!(resume(&p, 400), ResumePoint::Finished);
        assert_eq!(resume(&[], 0), ResumePoint::Finished);
    }

    #[test]
    fn elapsed_is_measured_from_start_hour() {
        let d = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let at = |h, m| d.and_hms_opt(h, m, 0).unwrap();
        assert_eq!(elapsed_since_start(at(11, 0), 11), 0);
        assert_eq!(elapsed_since_start(at(12, 30), 11), 5_400);
        assert_eq!(elapsed_since_start(at(10, 0), 11), -3_600);
    }
}
