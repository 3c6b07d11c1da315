use crate::common::file_utils;
use crate::errors::AppError;
use crate::recording::clock::Clock;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RetentionReport {
    pub kept: Vec<String>,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Hands out segment paths and keeps each channel's segment count bounded.
///
/// Nothing is remembered between rotations: the set of existing segments is
/// re-read from the output directory every time, so a restarted recorder picks
/// up where the previous run left off.
pub struct SegmentNamer {
    output_dir: PathBuf,
    extension: String,
    retention_count: usize,
    clock: Arc<dyn Clock>,
}

impl SegmentNamer {
    pub fn new(output_dir: &Path, extension: &str, retention_count: usize, clock: Arc<dyn Clock>) -> Self {
        SegmentNamer {
            output_dir: output_dir.to_path_buf(),
            extension: extension.to_string(),
            retention_count: retention_count.max(1),
            clock,
        }
    }

    /// Segment file names for `channel`, oldest first.
    pub fn list_segments(&self, channel: &str) -> Result<Vec<String>, AppError> {
        let entries = std::fs::read_dir(&self.output_dir).map_err(|e| {
            AppError::Retention(format!("Failed to list '{}': {}", self.output_dir.display(), e))
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| file_utils::is_timestamped_filename(name, channel, &self.extension))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Deletes the oldest segments of `channel` until at most `keep` remain.
    /// Individual delete failures are logged and reported, never fatal.
    pub fn enforce_retention(&self, channel: &str, keep: usize) -> Result<RetentionReport, AppError> {
        let mut names = self.list_segments(channel)?;
        let mut report = RetentionReport::default();
        let surplus = names.len().saturating_sub(keep);

        for name in names.drain(..surplus) {
            let path = self.output_dir.join(&name);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("🗑️ Removed cached video {}", path.display());
                    report.removed.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("Cached video {} already gone", path.display());
                    report.removed.push(path);
                }
                Err(e) => {
                    warn!("Failed to remove {} - {}", path.display(), e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        report.kept = names;
        Ok(report)
    }

    /// Path for the next segment of `channel`.
    ///
    /// Existing segments are trimmed to `retention_count - 1` first, leaving room
    /// for the one about to be opened. Retention problems are logged and do not
    /// prevent the new path from being produced.
    pub fn next_path(&self, channel: &str) -> Result<PathBuf, AppError> {
        file_utils::ensure_output_directory(&self.output_dir)?;

        match self.enforce_retention(channel, self.retention_count - 1) {
            Ok(report) => debug!(
                "Retention for '{}': kept {}, removed {}, failed {}",
                channel,
                report.kept.len(),
                report.removed.len(),
                report.failed.len()
            ),
            Err(e) => warn!("Retention pass for '{}' skipped: {}", channel, e),
        }

        let filename =
            file_utils::generate_timestamped_filename(channel, &self.clock.wall_time(), &self.extension);
        Ok(self.output_dir.join(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::ManualClock;
    use std::time::Duration;

    fn touch(path: &Path) {
        std::fs::write(path, b"segment").unwrap();
    }

    #[test]
    fn test_five_rotations_keep_three_newest() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let namer = SegmentNamer::new(tmp.path(), "avi", 3, clock.clone());

        let mut created = Vec::new();
        for _ in 0..5 {
            let path = namer.next_path("front").unwrap();
            touch(&path);
            created.push(path.file_name().unwrap().to_string_lossy().to_string());
            clock.advance(Duration::from_secs(60));
        }

        let remaining = namer.list_segments("front").unwrap();
        assert_eq!(remaining, created[2..].to_vec());
        assert_eq!(remaining[0], "front_20240101_080200.avi");
    }

    #[test]
    fn test_retention_ignores_other_channels_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        for name in [
            "front_20240101_000000.avi",
            "front_20240102_000000.avi",
            "front_door_20230101_000000.avi",
            "back_20230101_000000.avi",
            "front_20230101_000000.mp4",
            "notes.txt",
        ] {
            touch(&tmp.path().join(name));
        }
        let namer = SegmentNamer::new(tmp.path(), "avi", 5, ManualClock::new());

        let report = namer.enforce_retention("front", 1).unwrap();
        assert_eq!(report.removed, vec![tmp.path().join("front_20240101_000000.avi")]);
        assert_eq!(report.kept, vec!["front_20240102_000000.avi".to_string()]);
        for survivor in ["front_door_20230101_000000.avi", "back_20230101_000000.avi", "front_20230101_000000.mp4", "notes.txt"] {
            assert!(tmp.path().join(survivor).exists(), "{} was removed", survivor);
        }
    }

    #[test]
    fn test_existing_files_from_previous_run_are_counted() {
        let tmp = tempfile::tempdir().unwrap();
        for day in 1..=4 {
            touch(&tmp.path().join(format!("front_2023010{}_120000.avi", day)));
        }
        let namer = SegmentNamer::new(tmp.path(), "avi", 2, ManualClock::new());

        let path = namer.next_path("front").unwrap();
        assert_eq!(path, tmp.path().join("front_20240101_080000.avi"));
        assert_eq!(namer.list_segments("front").unwrap(), vec!["front_20230104_120000.avi".to_string()]);
    }

    #[test]
    fn test_next_path_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("recordings");
        let namer = SegmentNamer::new(&dir, "avi", 1, ManualClock::new());
        let path = namer.next_path("front").unwrap();
        assert!(dir.is_dir());
        assert_eq!(path.parent().unwrap(), dir.as_path());
    }

    #[test]
    fn test_unlistable_directory_is_retention_error() {
        let tmp = tempfile::tempdir().unwrap();
        let namer = SegmentNamer::new(&tmp.path().join("missing"), "avi", 1, ManualClock::new());
        assert!(matches!(namer.list_segments("front"), Err(AppError::Retention(_))));
    }
}
