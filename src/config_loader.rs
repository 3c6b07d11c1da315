use crate::app_config::{hours_to_segment_seconds, RecorderConfig};
use crate::channel_config::{parse_channel_token, ChannelSpec};
use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MasterConfig {
    pub recorder: RecorderConfig,
    pub channels: Vec<ChannelSpec>,
}

pub fn load_config(path: &str) -> Result<MasterConfig> {
    debug!("📄 Attempting to load config from: {}", path);
    let start_time = Instant::now();

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'. 📖", path))?;

    let config: MasterConfig = serde_yaml::from_str(&config_str)
        .with_context(|| format!("Failed to parse YAML configuration from '{}'. 💔", path))?;

    info!("✅ Loaded configuration from '{}' in {:?}", path, start_time.elapsed());
    Ok(config)
}

/// File settings (if `--config` was given) overlaid with whatever the command line sets.
pub fn resolve_config(matches: &ArgMatches) -> Result<MasterConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => load_config(path)?,
        None => MasterConfig::default(),
    };
    apply_cli_overrides(&mut config, matches)?;
    validate_master_config(&config).context("Configuration validation failed 👎")?;
    Ok(config)
}

pub fn apply_cli_overrides(config: &mut MasterConfig, matches: &ArgMatches) -> Result<()> {
    let recorder = &mut config.recorder;
    if let Some(output) = matches.get_one::<String>("output") {
        recorder.output_directory = PathBuf::from(output);
    }
    if let Some(hours) = matches.get_one::<f64>("duration") {
        recorder.segment_duration_seconds = hours_to_segment_seconds(*hours);
    }
    if let Some(cache) = matches.get_one::<usize>("cache") {
        recorder.retention_count = *cache;
    }
    if let Some(fps) = matches.get_one::<f64>("fps") {
        recorder.target_fps = *fps;
    }
    if let Some(format) = matches.get_one::<String>("format") {
        recorder.video_format = format.trim_start_matches('.').to_string();
    }
    if let Some(backend) = matches.get_one::<String>("backend") {
        recorder.media_backend = backend.clone();
    }
    if matches.get_flag("verbose") {
        recorder.verbose = true;
    }

    if let Some(tokens) = matches.get_many::<String>("channels") {
        for token in tokens {
            let spec = parse_channel_token(token)
                .with_context(|| format!("Invalid channel argument '{}' (expected name=uri)", token))?;
            debug!("  Channel '{}' -> {}", spec.name, spec.uri);
            config.channels.push(spec);
        }
    }
    Ok(())
}

fn validate_master_config(config: &MasterConfig) -> Result<()> {
    debug!("🕵️ Validating master configuration...");
    config.recorder.validate()?;

    let mut channel_names = HashSet::new();
    for channel in &config.channels {
        channel.validate()?;
        if !channel_names.insert(channel.name.as_str()) {
            bail!("❌ Duplicate channel name found: {}", channel.name);
        }
    }
    Ok(())
}
