use crate::dsl::ast::Until;
use crate::foundation::time::{SECS_PER_HOUR, SECS_PER_MINUTE};

/// Cutoff for `play --until`, in seconds since the day's start hour.
///
/// `:m` targets the next multiple of `m` minutes strictly after `now`; when that boundary is at
/// most `ignore_min` minutes away the cutoff is `now` itself. An hour value is a wall-clock hour
/// on the current broadcast day, measured from `start_hour`.
pub(crate) fn cutoff_secs(until: &Until, now: u64, start_hour: u32, ignore_min: f64) -> f64 {
    match *until {
        Until::Boundary { minutes } => {
            let m = minutes as f64;
            let cur = now as f64 / SECS_PER_MINUTE as f64;
            let next = ((cur / m).floor() + 1.0) * m;
            if next - cur <= ignore_min {
                now as f64
            } else {
                next * SECS_PER_MINUTE as f64
            }
        }
        Until::Hour(hour) => {
            let cur_h = now as f64 / SECS_PER_HOUR as f64;
            (cur_h - cur_h.rem_euclid(24.0) + (hour - f64::from(start_hour)))
                * SECS_PER_HOUR as f64
        }
    }
}
