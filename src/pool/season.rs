use chrono::{Datelike, NaiveDate};

/// Seasonal markers embedded in media paths and the month they belong to.
pub const SEASONAL_MARKERS: &[(&str, u32)] = &[
    ("(halloween)", 10),
    ("(thanksgiving)", 11),
    ("(xmas)", 12),
    ("(christmas)", 12),
];

/// Month a media item is tied to, if its path carries a seasonal marker. A marker on a folder
/// applies to everything below it.
pub fn season_month(path: &str) -> Option<u32> {
    let path = path.to_ascii_lowercase();
    SEASONAL_MARKERS
        .iter()
        .find(|(marker, _)| path.contains(marker))
        .map(|&(_, month)| month)
}

/// Whether `path` may air on `date`. Without a date every item is eligible.
pub fn in_season(path: &str, date: Option<NaiveDate>) -> bool {
    match (season_month(path), date) {
        (Some(month), Some(date)) => date.month() == month,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(m: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2022, m, 10)
    }

    #[test]
    fn markers_map_to_months() {
        assert_eq!(season_month("Specials/Grinch (xmas).mp4"), Some(12));
        assert_eq!(season_month("Specials/Pumpkin (Halloween).mkv"), Some(10));
        assert_eq!(season_month("Specials/Turkey (thanksgiving).avi"), Some(11));
        assert_eq!(season_month("Shows/Plain.mp4"), None);
    }

    #[test]
    fn marker_on_a_folder_covers_its_items() {
        assert_eq!(season_month("Specials (xmas)/Plain.mp4"), Some(12));
        assert_eq!(season_month("Shows/Halloween (HALLOWEEN)/S01/e01.mkv"), Some(10));
        assert!(!in_season("Specials (xmas)/Plain.mp4", day(6)));
    }

    #[test]
    fn gating_follows_month() {
        assert!(!in_season("a (xmas).mp4", day(6)));
        assert!(in_season("a (xmas).mp4", day(12)));
        assert!(in_season("a (xmas).mp4", None));
        assert!(in_season("plain.mp4", day(6)));
    }
}
