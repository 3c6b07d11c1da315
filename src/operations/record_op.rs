use crate::camera::ip_camera_device::HttpTransportFactory;
use crate::config_loader::MasterConfig;
use crate::media;
use crate::recording::channel_recorder::ChannelReport;
use crate::recording::supervisor::Supervisor;
use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

const LOW_FPS_WARNING_THRESHOLD: f64 = 3.0;

/// Records every configured channel until Ctrl-C.
pub async fn handle_record_cli(master_config: MasterConfig) -> Result<()> {
    let op_start_time = Instant::now();
    let recorder = &master_config.recorder;

    if recorder.target_fps < LOW_FPS_WARNING_THRESHOLD {
        warn!(
            "⚠️ Recording at {} fps. Many players and codecs render segments below 3 fps poorly.",
            recorder.target_fps
        );
    }
    match recorder.segment_duration() {
        Some(duration) => info!(
            "📹 Segments of {:?}, keeping {} per channel in {}",
            duration,
            recorder.retention_count,
            recorder.output_directory.display()
        ),
        None => info!("📹 Single endless segment per channel in {}", recorder.output_directory.display()),
    }

    let backend_start = Instant::now();
    let (decoder, encoder) = media::build_backend(
        &recorder.media_backend,
        &recorder.video_format,
        &recorder.video_codec,
        recorder.jpeg_quality,
    )
    .context("Failed to set up the media backend")?;
    debug!("Media backend '{}' ready in {:?}", recorder.media_backend, backend_start.elapsed());

    let supervisor = Supervisor::new(
        master_config.channels.clone(),
        master_config.recorder.clone(),
        Arc::new(HttpTransportFactory),
        decoder,
        encoder,
    )?;

    let reports = supervisor
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("🛑 Ctrl-C received, stopping..."),
                Err(e) => error!("Failed to listen for Ctrl-C: {}. Stopping now.", e),
            }
        })
        .await?;

    info!("🏁 Recording finished in {:?}", op_start_time.elapsed());
    summarize_reports(&reports)
}

/// Logs one line per channel. Fails when no channel finished cleanly.
pub fn summarize_reports(reports: &[ChannelReport]) -> Result<()> {
    let mut failed = 0;
    for report in reports {
        match &report.error {
            None => info!(
                "✅ Channel '{}': {} frames in {} segment(s)",
                report.channel,
                report.frames_written,
                report.segments.len()
            ),
            Some(e) => {
                failed += 1;
                error!(
                    "❌ Channel '{}' failed after {} frames: {}",
                    report.channel, report.frames_written, e
                );
            }
        }
    }

    if reports.is_empty() {
        bail!("No channel reported back");
    }
    if failed == reports.len() {
        bail!("All {} channel(s) failed", failed);
    }
    Ok(())
}
