use env_logger::Builder;
use log::LevelFilter;

/// Resolves the log level: `--debug` first, then the configured level, then info.
pub fn resolve_log_level(debug_flag: bool, configured: Option<&str>) -> (LevelFilter, Option<String>) {
    let log_level_str = if debug_flag {
        "debug".to_string()
    } else {
        configured.unwrap_or("info").to_string()
    };

    match log_level_str.to_lowercase().as_str() {
        "off" => (LevelFilter::Off, None),
        "error" => (LevelFilter::Error, None),
        "warn" => (LevelFilter::Warn, None),
        "info" => (LevelFilter::Info, None),
        "debug" => (LevelFilter::Debug, None),
        "trace" => (LevelFilter::Trace, None),
        _ => (LevelFilter::Info, Some(log_level_str)),
    }
}

pub fn initialize_logging(debug_flag: bool, configured: Option<&str>) {
    let (level, unrecognized) = resolve_log_level(debug_flag, configured);
    let mut builder = Builder::new();
    builder.filter_level(level);
    // reqwest/hyper chatter drowns out per-channel lines at debug.
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("reqwest", LevelFilter::Info);

    builder.try_init().unwrap_or_else(|e| {
        eprintln!("Failed to initialize logger: {}. Logging might not work as expected.", e);
    });
    if let Some(s) = unrecognized {
        log::warn!("Unrecognized log level '{}', defaulting to info.", s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_wins() {
        assert_eq!(resolve_log_level(true, Some("error")).0, LevelFilter::Debug);
    }

    #[test]
    fn test_configured_level_and_fallback() {
        assert_eq!(resolve_log_level(false, Some("WARN")).0, LevelFilter::Warn);
        assert_eq!(resolve_log_level(false, None).0, LevelFilter::Info);
        let (level, unrecognized) = resolve_log_level(false, Some("chatty"));
        assert_eq!(level, LevelFilter::Info);
        assert_eq!(unrecognized.as_deref(), Some("chatty"));
    }
}
