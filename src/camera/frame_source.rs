use crate::app_config::RecorderConfig;
use crate::camera::Transport;
use crate::channel_config::ChannelSpec;
use crate::errors::AppError;
use crate::media::{Frame, FrameDecoder};
use crate::recording::clock::Clock;
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    pub fetched: u64,
    pub fallbacks: u64,
    pub failures: u64,
}

/// Downloads, decodes and annotates one snapshot per call.
///
/// Once a frame has been decoded it is kept as the last good frame: any later
/// failure re-yields it so the encoder keeps receiving frames on schedule.
pub struct FrameSource {
    channel: ChannelSpec,
    transport: Box<dyn Transport>,
    decoder: Arc<dyn FrameDecoder>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    timeout: Duration,
    overlay_format: String,
    startup_retry_limit: u32,
    last_good: Option<Frame>,
    stats: SourceStats,
}

impl FrameSource {
    pub fn new(
        channel: ChannelSpec,
        transport: Box<dyn Transport>,
        decoder: Arc<dyn FrameDecoder>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
        config: &RecorderConfig,
    ) -> Self {
        FrameSource {
            channel,
            transport,
            decoder,
            clock,
            shutdown,
            timeout: config.frame_interval(),
            overlay_format: config.overlay_timestamp_format.clone(),
            startup_retry_limit: config.startup_retry_limit,
            last_good: None,
            stats: SourceStats::default(),
        }
    }

    pub fn channel(&self) -> &ChannelSpec {
        &self.channel
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    /// Returns a fresh frame, or the last good one if this fetch failed.
    ///
    /// Without a cached frame the fetch is retried (one frame interval apart)
    /// until it succeeds, shutdown is requested (`AppError::Shutdown`) or the
    /// startup retry limit is used up (`AppError::Acquisition`).
    pub fn fetch_frame(&mut self) -> Result<Frame, AppError> {
        let mut attempts: u32 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return Err(AppError::Shutdown);
            }
            let err = match self.try_fetch() {
                Ok(frame) => {
                    self.stats.fetched += 1;
                    self.last_good = Some(frame.clone());
                    return Ok(frame);
                }
                Err(e) => e,
            };
            self.stats.failures += 1;

            if let Some(previous) = &self.last_good {
                self.stats.fallbacks += 1;
                warn!("Error downloading '{}' - {}. Re-using last good frame.", self.channel.uri, err);
                return Ok(previous.clone());
            }

            attempts += 1;
            error!(
                "Error downloading '{}' for channel '{}' (attempt {}) - {}",
                self.channel.uri, self.channel.name, attempts, err
            );
            if self.shutdown.is_cancelled() {
                return Err(AppError::Shutdown);
            }
            if self.startup_retry_limit != 0 && attempts >= self.startup_retry_limit {
                return Err(AppError::Acquisition {
                    channel: self.channel.name.clone(),
                    details: format!("no frame after {} attempts, last error: {}", attempts, err),
                });
            }
            debug!("Retrying '{}' in {:?}", self.channel.uri, self.timeout);
            self.clock.sleep(self.timeout);
        }
    }

    fn try_fetch(&self) -> Result<Frame, AppError> {
        let bytes = self.transport.fetch(&self.channel.uri, self.timeout)?;
        let captured_at = self.clock.wall_time();
        let overlay = format!("{} {}", self.channel.name, captured_at.format(&self.overlay_format));
        let image = self.decoder.decode_and_annotate(&bytes, &overlay)?;
        Ok(Frame::new(image, captured_at))
    }
}
