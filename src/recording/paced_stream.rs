use crate::app_config::{interval_for_fps, MAX_FRAME_INTERVAL};
use crate::camera::frame_source::FrameSource;
use crate::errors::AppError;
use crate::media::Frame;
use crate::recording::clock::Clock;
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a [`PacedStream`] stopped yielding frames.
#[derive(Debug)]
pub enum StreamEnd {
    /// The configured duration has passed; the caller rotates the segment.
    DurationElapsed,
    Shutdown,
    /// The source could not produce any frame.
    Failed(AppError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PaceStats {
    pub yielded: u64,
    pub rate_drops: u64,
}

/// Yields frames from a [`FrameSource`] at `target_fps`.
///
/// The time the consumer spends on a frame is measured between one yield and
/// the next call and subtracted from the following sleep, so the average
/// interval stays at `1 / target_fps` as long as fetch plus processing fit in
/// one interval.
pub struct PacedStream<'a> {
    source: &'a mut FrameSource,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    target_fps: f64,
    interval: Duration,
    end_at: Option<Instant>,
    last_yield: Option<Instant>,
    verbose: bool,
    stats: PaceStats,
}

impl<'a> PacedStream<'a> {
    /// `duration` of `None` (or zero) streams until shutdown.
    pub fn new(
        source: &'a mut FrameSource,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
        target_fps: f64,
        duration: Option<Duration>,
        verbose: bool,
    ) -> Self {
        // A deadline past what `Instant` can represent is the same as no deadline.
        let end_at = duration
            .filter(|d| !d.is_zero())
            .and_then(|d| clock.now().checked_add(d));
        PacedStream {
            source,
            clock,
            shutdown,
            target_fps,
            interval: interval_for_fps(target_fps).unwrap_or(MAX_FRAME_INTERVAL),
            end_at,
            last_yield: None,
            verbose,
            stats: PaceStats::default(),
        }
    }

    pub fn stats(&self) -> PaceStats {
        self.stats
    }

    pub fn next_frame(&mut self) -> Result<Frame, StreamEnd> {
        let tick_start = self.clock.now();

        if self.last_yield.is_some() {
            if let Some(end_at) = self.end_at {
                if tick_start > end_at {
                    debug!("Completed recording period for {}", self.source.channel().uri);
                    return Err(StreamEnd::DurationElapsed);
                }
            }
        }
        if self.shutdown.is_cancelled() {
            return Err(StreamEnd::Shutdown);
        }

        let correction = self
            .last_yield
            .map(|t| tick_start.saturating_duration_since(t))
            .unwrap_or_default();

        let frame = match self.source.fetch_frame() {
            Ok(frame) => frame,
            Err(AppError::Shutdown) => return Err(StreamEnd::Shutdown),
            Err(e) => return Err(StreamEnd::Failed(e)),
        };

        let elapsed = self.clock.now().saturating_duration_since(tick_start) + correction;
        if elapsed > self.interval {
            self.stats.rate_drops += 1;
            let fps = 1.0 / elapsed.as_secs_f64();
            if self.verbose {
                warn!(
                    "fps drop to {:.2} (target {:.2}) - {}",
                    fps,
                    self.target_fps,
                    self.source.channel().uri
                );
            } else {
                debug!("fps drop to {:.2} - {}", fps, self.source.channel().uri);
            }
        } else {
            if self.shutdown.is_cancelled() {
                return Err(StreamEnd::Shutdown);
            }
            self.clock.sleep(self.interval - elapsed);
        }

        self.stats.yielded += 1;
        self.last_yield = Some(self.clock.now());
        Ok(frame)
    }
}
