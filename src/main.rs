mod app_config;
mod camera;
mod channel_config;
mod cli;
mod common;
mod config_loader;
mod errors;
mod media;
mod operations;
mod recording;

use anyhow::{Context, Result};
use common::logging_setup;
use log::{debug, error, info};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    let main_start_time = Instant::now();
    let matches = cli::build_cli().get_matches();
    let debug_flag = matches.get_flag("debug");

    let config_load_start_time = Instant::now();
    let master_config = match config_loader::resolve_config(&matches) {
        Ok(cfg) => {
            logging_setup::initialize_logging(debug_flag, cfg.recorder.log_level.as_deref());
            debug!("✅ Configuration resolved in {:?}", config_load_start_time.elapsed());
            cfg
        }
        Err(e) => {
            logging_setup::initialize_logging(debug_flag, None);
            error!("❌ Invalid configuration: {:#}. Exiting.", e);
            return Err(e);
        }
    };

    info!(
        "🚀 ipcamcorder starting with {} channel(s) configured.",
        master_config.channels.len()
    );

    if let Err(e) = operations::record_op::handle_record_cli(master_config)
        .await
        .context("Recording failed")
    {
        error!("❌ Recording failed after {:?}: {:#}", main_start_time.elapsed(), e);
        return Err(e);
    }

    info!("🏁 ipcamcorder finished in {:?}.", main_start_time.elapsed());
    Ok(())
}
