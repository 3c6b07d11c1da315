use crate::common::timestamp_utils;
use crate::errors::AppError;
use chrono::{DateTime, Local};
use log::debug;
use std::path::{Path, PathBuf};

pub fn generate_timestamped_filename(
    base_name: &str,      // e.g., channel name
    at: &DateTime<Local>, // wall-clock time the segment starts
    extension: &str,      // e.g., "avi"
) -> String {
    let timestamp = timestamp_utils::segment_timestamp_str(at);
    format!("{}_{}.{}", base_name, timestamp, extension)
}

/// True for `<base_name>_<8 digits>_<6 digits>.<extension>` and nothing else.
pub fn is_timestamped_filename(file_name: &str, base_name: &str, extension: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(base_name)
        .and_then(|r| r.strip_prefix('_'))
    else {
        return false;
    };
    let Some(stamp) = rest
        .strip_suffix(extension)
        .and_then(|r| r.strip_suffix('.'))
    else {
        return false;
    };
    let bytes = stamp.as_bytes();
    bytes.len() == 15
        && bytes[8] == b'_'
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[9..].iter().all(u8::is_ascii_digit)
}

pub fn ensure_output_directory(dir_path: &Path) -> Result<PathBuf, AppError> {
    if !dir_path.exists() {
        debug!("Output directory '{}' does not exist, attempting to create it.", dir_path.display());
        std::fs::create_dir_all(dir_path).map_err(|e| {
            AppError::Io(format!(
                "Failed to create output directory '{}': {}",
                dir_path.display(),
                e
            ))
        })?;
    } else if !dir_path.is_dir() {
        return Err(AppError::Io(format!(
            "Output path '{}' exists but is not a directory.",
            dir_path.display()
        )));
    }
    Ok(dir_path.to_path_buf())
}
