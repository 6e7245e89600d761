use chrono::NaiveDateTime;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const HOUR_FORMAT: &str = "%Y-%m-%d %H";

/// Tracks where the event builder is within an ongoing charge: the hour
/// bucket of the last processed event and whether the charge is still open.
/// Threaded through explicitly so callers own the lifecycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub last_hour: Option<String>,
    pub still_going: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Truncates a timestamp string to its hour bucket, e.g.
/// `2025-03-01 10:42:17` becomes `2025-03-01 10`.
pub fn hour_bucket(timestamp: &str) -> Option<String> {
    parse_timestamp(timestamp).map(|at| at.format(HOUR_FORMAT).to_string())
}

/// Row key for a charge hour: the bucket pinned to the top of the hour.
pub fn hour_row_key(hour: &str) -> String {
    format!("{hour}:00:00")
}

/// Timestamp used to close out an hour that a charge ran past.
pub fn hour_close_key(hour: &str) -> String {
    format!("{hour}:59:59")
}

/// Classifies a position as home or away by prefix containment against the
/// configured home coordinates. Containment (not numeric distance) mirrors
/// the behavior the rest of the pipeline was built against.
pub fn classify_position(
    home_latitude: &str,
    home_longitude: &str,
    latitude: Option<&str>,
    longitude: Option<&str>,
) -> &'static str {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) if lat.contains(home_latitude) && lon.contains(home_longitude) => {
            "home"
        }
        _ => "away",
    }
}
