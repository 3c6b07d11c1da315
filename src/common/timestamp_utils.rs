use chrono::{DateTime, Local};

/// Fixed-width filename timestamp; lexicographic order equals chronological order.
pub const SEGMENT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn segment_timestamp_str(at: &DateTime<Local>) -> String {
    at.format(SEGMENT_TIMESTAMP_FORMAT).to_string()
}
