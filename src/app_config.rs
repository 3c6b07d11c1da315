use crate::errors::AppError;
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Slowest accepted pace: one frame an hour.
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(3600);
/// Longest accepted segment: a leap year.
pub const MAX_SEGMENT_SECONDS: u64 = 366 * 24 * 3600;

/// The OpenCV backend when it is compiled in, the native one otherwise.
pub fn default_media_backend() -> &'static str {
    if cfg!(feature = "opencv") {
        "opencv"
    } else {
        "native"
    }
}

/// Time between two frames at `fps`, or `None` when `fps` cannot be paced.
pub fn interval_for_fps(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|interval| !interval.is_zero() && *interval <= MAX_FRAME_INTERVAL)
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RecorderConfig {
    pub output_directory: PathBuf,
    pub target_fps: f64,
    pub segment_duration_seconds: u64, // 0 = a single unbounded segment
    pub retention_count: usize,        // max segment files kept per channel
    pub verbose: bool,
    pub video_format: String, // Container extension, e.g., "avi"
    pub video_codec: String,  // FourCC name for the OpenCV writer, e.g., "mjpg", "xvid"
    pub media_backend: String, // "native" or "opencv"
    pub jpeg_quality: u8,      // Native MJPEG writer quality (1-100)
    pub max_consecutive_write_failures: u32,
    pub startup_retry_limit: u32, // 0 = keep retrying the first frame until shutdown
    pub overlay_timestamp_format: String, // strftime format string
    pub log_level: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            output_directory: PathBuf::from("."),
            target_fps: 1.0,
            segment_duration_seconds: 24 * 3600,
            retention_count: 5,
            verbose: false,
            video_format: "avi".to_string(),
            video_codec: "mjpg".to_string(),
            media_backend: default_media_backend().to_string(),
            jpeg_quality: 85,
            max_consecutive_write_failures: 3,
            startup_retry_limit: 10,
            overlay_timestamp_format: "%Y%m%d %H:%M:%S".to_string(),
            log_level: Some("info".to_string()),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if interval_for_fps(self.target_fps).is_none() {
            return Err(AppError::Config(format!(
                "target fps must be a positive number of at least one frame per {:?}, got {}",
                MAX_FRAME_INTERVAL, self.target_fps
            )));
        }
        if self.segment_duration_seconds > MAX_SEGMENT_SECONDS {
            return Err(AppError::Config(format!(
                "segment duration of {} seconds is longer than the {} second maximum",
                self.segment_duration_seconds, MAX_SEGMENT_SECONDS
            )));
        }
        if self.retention_count < 1 {
            return Err(AppError::Config(
                "retention count (cache) must be at least 1".to_string(),
            ));
        }
        if self.video_format.is_empty()
            || !self.video_format.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AppError::Config(format!(
                "video format '{}' must be a non-empty alphanumeric file extension",
                self.video_format
            )));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(AppError::Config(format!(
                "jpeg quality must be within 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.max_consecutive_write_failures == 0 {
            return Err(AppError::Config(
                "max consecutive write failures must be at least 1".to_string(),
            ));
        }
        if self.overlay_timestamp_format.is_empty()
            || StrftimeItems::new(&self.overlay_timestamp_format).any(|item| matches!(item, Item::Error))
        {
            return Err(AppError::Config(format!(
                "overlay timestamp format '{}' is not a valid strftime format",
                self.overlay_timestamp_format
            )));
        }
        Ok(())
    }

    /// Interval between two paced frames; also the per-request fetch timeout.
    pub fn frame_interval(&self) -> Duration {
        interval_for_fps(self.target_fps).unwrap_or(MAX_FRAME_INTERVAL)
    }

    pub fn segment_duration(&self) -> Option<Duration> {
        match self.segment_duration_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Converts a `--duration` value in hours to whole seconds; anything not positive means unbounded.
pub fn hours_to_segment_seconds(hours: f64) -> u64 {
    if hours.is_finite() && hours > 0.0 {
        (3600.0 * hours) as u64
    } else {
        0
    }
}
