use chrono::{Datelike, NaiveDate, Weekday};

pub const SECS_PER_MINUTE: u64 = 60;
pub const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
pub const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Monday-first, matching `Weekday::num_days_from_monday`.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Block name a schedule uses for a given day of the week.
pub fn weekday_block_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// The `weekday` / `weekend` class block a day falls back to.
pub fn weekday_class_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sat | Weekday::Sun => "weekend",
        _ => "weekday",
    }
}

pub fn block_name_for_date(date: NaiveDate) -> &'static str {
    weekday_block_name(date.weekday())
}
