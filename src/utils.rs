use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "things3-cli-dev",
            Profile::Prod => "things3-cli",
        }
    }
}

/// Things keeps its database inside this group container on macOS
const THINGS_GROUP_CONTAINER: &str =
    "Library/Group Containers/JLMPQHK86H.com.culturedcode.ThingsMac";
const THINGS_DATABASE_RELATIVE: &str = "Things Database.thingsdatabase/main.sqlite";

/// Get the configuration directory path
/// If profile is Dev, uses "things3-cli-dev" instead of "things3-cli"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "things3-cli", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path (holds the action log)
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "things3-cli", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Locate the Things database in the default group container.
///
/// Newer Things releases nest the database under a `ThingsData-XXXXX`
/// directory; older ones keep it directly in the container.
pub fn discover_things_database() -> Option<PathBuf> {
    let home = BaseDirs::new()?.home_dir().to_path_buf();
    find_things_database(&home.join(THINGS_GROUP_CONTAINER))
}

fn find_things_database(container: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(container)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("ThingsData-"))
        })
        .map(|dir| dir.join(THINGS_DATABASE_RELATIVE))
        .filter(|path| path.exists())
        .collect();
    candidates.sort();
    if let Some(found) = candidates.into_iter().next() {
        return Some(found);
    }
    let legacy = container.join(THINGS_DATABASE_RELATIVE);
    legacy.exists().then_some(legacy)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// Parse a calendar date or a full timestamp.
///
/// Returns the instant plus whether the input carried a time of day.
/// Calendar dates resolve to local midnight.
pub fn parse_date_or_time(value: &str) -> Option<(DateTime<Local>, bool)> {
    let value = value.trim();
    if let Ok(date) = parse_date(value) {
        return local_midnight(date).map(|dt| (dt, false));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some((dt.with_timezone(&Local), true));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Local.from_local_datetime(&naive).earliest().map(|dt| (dt, true));
        }
    }
    None
}

pub fn local_midnight(date: NaiveDate) -> Option<DateTime<Local>> {
    Local
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .earliest()
}

/// Current local calendar date
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Start and end of the current local day
pub fn day_bounds() -> (DateTime<Local>, DateTime<Local>) {
    let now = Local::now();
    let start = local_midnight(now.date_naive()).unwrap_or(now);
    (start, start + chrono::Duration::hours(24))
}

/// Convert a stored REAL epoch offset into a local timestamp
pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Local>> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9) as u32;
    Local.timestamp_opt(whole, nanos).single()
}

pub fn to_epoch_seconds(dt: &DateTime<Local>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parse_date_or_time_accepts_calendar_dates() {
        let (dt, has_time) = parse_date_or_time("2024-05-06").unwrap();
        assert!(!has_time);
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 5, 6));
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn parse_date_or_time_accepts_timestamps() {
        let (_, has_time) = parse_date_or_time("2024-05-06T10:30:00Z").unwrap();
        assert!(has_time);
        let (dt, has_time) = parse_date_or_time("2024-05-06 10:30").unwrap();
        assert!(has_time);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn parse_date_or_time_rejects_garbage() {
        assert!(parse_date_or_time("next tuesday").is_none());
        assert!(parse_date_or_time("2024-13-01").is_none());
    }

    #[test]
    fn epoch_round_trip_keeps_second_precision() {
        let dt = from_epoch_seconds(1_700_000_000.5).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert!((to_epoch_seconds(&dt) - 1_700_000_000.5).abs() < 1e-6);
        assert!(from_epoch_seconds(0.0).is_none());
    }

    #[test]
    fn find_things_database_prefers_things_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("ThingsData-ABCDE/Things Database.thingsdatabase");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("main.sqlite"), b"").unwrap();

        let found = find_things_database(dir.path()).unwrap();
        assert!(found.ends_with("ThingsData-ABCDE/Things Database.thingsdatabase/main.sqlite"));
    }

    #[test]
    fn expand_path_leaves_absolute_paths_alone() {
        assert_eq!(expand_path("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }
}
