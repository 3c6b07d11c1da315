use crate::app_config::RecorderConfig;
use crate::camera::frame_source::FrameSource;
use crate::errors::AppError;
use crate::media::{SegmentEncoder, SegmentWriter};
use crate::recording::clock::Clock;
use crate::recording::paced_stream::{PacedStream, StreamEnd};
use crate::recording::segment_namer::SegmentNamer;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Starting,
    Recording,
    RotatingSegment,
    Stopped,
}

/// What a channel worker leaves behind once it has stopped.
#[derive(Debug)]
pub struct ChannelReport {
    pub channel: String,
    pub final_state: RecorderState,
    pub segments: Vec<PathBuf>,
    pub frames_written: u64,
    pub fallback_frames: u64,
    pub error: Option<AppError>,
}

impl ChannelReport {
    /// Report for a channel whose worker failed before or outside the recording loop.
    pub fn failed(channel: &str, error: AppError) -> Self {
        ChannelReport {
            channel: channel.to_string(),
            final_state: RecorderState::Stopped,
            segments: Vec::new(),
            frames_written: 0,
            fallback_frames: 0,
            error: Some(error),
        }
    }
}

enum SegmentEnd {
    Rotate,
    Stop,
}

/// Records one channel into a rolling series of segments until shutdown or a
/// fatal error. Runs entirely on the calling (blocking) thread.
pub struct ChannelRecorder {
    channel: String,
    config: Arc<RecorderConfig>,
    source: FrameSource,
    encoder: Arc<dyn SegmentEncoder>,
    namer: SegmentNamer,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    state: RecorderState,
    segments: Vec<PathBuf>,
    frames_written: u64,
    consecutive_write_failures: u32,
}

impl ChannelRecorder {
    pub fn new(
        config: Arc<RecorderConfig>,
        source: FrameSource,
        encoder: Arc<dyn SegmentEncoder>,
        namer: SegmentNamer,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        ChannelRecorder {
            channel: source.channel().name.clone(),
            config,
            source,
            encoder,
            namer,
            clock,
            shutdown,
            state: RecorderState::Starting,
            segments: Vec::new(),
            frames_written: 0,
            consecutive_write_failures: 0,
        }
    }

    pub fn run(mut self) -> ChannelReport {
        let run_start = Instant::now();
        info!("🎬 Channel '{}' starting from {}", self.channel, self.source.channel().uri);

        let error = match self.record() {
            Ok(()) => None,
            Err(e) if e.is_shutdown() => None,
            Err(e) => {
                error!("❌ Channel '{}' stopped with error: {}", self.channel, e);
                Some(e)
            }
        };
        self.transition(RecorderState::Stopped);

        let stats = self.source.stats();
        info!(
            "🏁 Channel '{}' finished in {:?}: {} frames in {} segment(s), {} fetched, {} failed, {} re-used",
            self.channel,
            run_start.elapsed(),
            self.frames_written,
            self.segments.len(),
            stats.fetched,
            stats.failures,
            stats.fallbacks
        );
        ChannelReport {
            channel: self.channel,
            final_state: self.state,
            segments: self.segments,
            frames_written: self.frames_written,
            fallback_frames: stats.fallbacks,
            error,
        }
    }

    fn transition(&mut self, new_state: RecorderState) {
        if self.state != new_state {
            debug!("Channel '{}' state changed from {:?} to {:?}", self.channel, self.state, new_state);
            self.state = new_state;
        }
    }

    fn record(&mut self) -> Result<(), AppError> {
        // The first frame only sizes the segments.
        let first = self.source.fetch_frame()?;
        let (width, height) = (first.width(), first.height());
        info!("📐 Channel '{}' frame size {}x{}", self.channel, width, height);

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            let path = self.namer.next_path(&self.channel)?;
            let open_start = Instant::now();
            let mut writer = self
                .encoder
                .open_segment(&path, self.config.target_fps, width, height)?;
            info!("✍️ Channel '{}' recording to {} (opened in {:?})", self.channel, path.display(), open_start.elapsed());
            self.segments.push(path.clone());
            self.transition(RecorderState::Recording);

            let outcome = self.record_segment(writer.as_mut(), &path);

            match writer.close() {
                Ok(()) => info!("💾 Channel '{}' sealed {}", self.channel, path.display()),
                Err(e) => {
                    error!("❌ Channel '{}' failed to seal {}: {}", self.channel, path.display(), e);
                    outcome?;
                    return Err(e);
                }
            }

            match outcome? {
                SegmentEnd::Rotate => self.transition(RecorderState::RotatingSegment),
                SegmentEnd::Stop => return Ok(()),
            }
        }
    }

    fn record_segment(&mut self, writer: &mut dyn SegmentWriter, path: &Path) -> Result<SegmentEnd, AppError> {
        let threshold = self.config.max_consecutive_write_failures;
        let verbose = self.config.verbose;
        let mut stream = PacedStream::new(
            &mut self.source,
            self.clock.clone(),
            self.shutdown.clone(),
            self.config.target_fps,
            self.config.segment_duration(),
            verbose,
        );

        let outcome = loop {
            let frame = match stream.next_frame() {
                Ok(frame) => frame,
                Err(StreamEnd::DurationElapsed) => break Ok(SegmentEnd::Rotate),
                Err(StreamEnd::Shutdown) => break Ok(SegmentEnd::Stop),
                Err(StreamEnd::Failed(e)) => break Err(e),
            };

            let write_start = Instant::now();
            match writer.write_frame(&frame) {
                Ok(()) => {
                    self.frames_written += 1;
                    self.consecutive_write_failures = 0;
                    if verbose {
                        debug!(
                            "Channel '{}' wrote frame captured at {} in {:?}",
                            self.channel,
                            frame.captured_at().format("%H:%M:%S"),
                            write_start.elapsed()
                        );
                    }
                    if writer.is_full() {
                        info!("📦 Channel '{}' segment {} is full, rotating early", self.channel, path.display());
                        break Ok(SegmentEnd::Rotate);
                    }
                }
                Err(e) => {
                    self.consecutive_write_failures += 1;
                    warn!(
                        "Channel '{}' dropped a frame for {} ({}/{}): {}",
                        self.channel,
                        path.display(),
                        self.consecutive_write_failures,
                        threshold,
                        e
                    );
                    if self.consecutive_write_failures >= threshold {
                        break Err(AppError::Encoding(format!(
                            "{} consecutive write failures on {}, last: {}",
                            self.consecutive_write_failures,
                            path.display(),
                            e
                        )));
                    }
                }
            }
        };

        let pace = stream.stats();
        debug!(
            "Channel '{}' segment {} ended: {} frames paced, {} below target rate",
            self.channel,
            path.display(),
            pace.yielded,
            pace.rate_drops
        );
        outcome
    }
}
