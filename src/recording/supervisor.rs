use crate::app_config::RecorderConfig;
use crate::camera::frame_source::FrameSource;
use crate::camera::TransportFactory;
use crate::channel_config::ChannelSpec;
use crate::common::file_utils;
use crate::errors::AppError;
use crate::media::{FrameDecoder, SegmentEncoder};
use crate::recording::channel_recorder::{ChannelRecorder, ChannelReport};
use crate::recording::clock::{Clock, SystemClock};
use crate::recording::segment_namer::SegmentNamer;
use log::{debug, error, info};
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Owns the channel workers: one blocking task per channel, all sharing one
/// shutdown token.
pub struct Supervisor {
    channels: Vec<ChannelSpec>,
    config: Arc<RecorderConfig>,
    transports: Arc<dyn TransportFactory>,
    decoder: Arc<dyn FrameDecoder>,
    encoder: Arc<dyn SegmentEncoder>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(
        channels: Vec<ChannelSpec>,
        config: RecorderConfig,
        transports: Arc<dyn TransportFactory>,
        decoder: Arc<dyn FrameDecoder>,
        encoder: Arc<dyn SegmentEncoder>,
    ) -> Result<Self, AppError> {
        debug!("🛠️ Initializing Supervisor...");
        if channels.is_empty() {
            return Err(AppError::Config("You must define at least one channel to record.".to_string()));
        }
        config.validate()?;

        let mut names = HashSet::new();
        for channel in &channels {
            channel.validate()?;
            if !names.insert(channel.name.as_str()) {
                return Err(AppError::Config(format!("Duplicate channel name: {}", channel.name)));
            }
        }

        Ok(Supervisor {
            channels,
            config: Arc::new(config),
            transports,
            decoder,
            encoder,
            clock: Arc::new(SystemClock),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cancelling this token has the same effect as the stop future resolving.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Records every channel until `stop` resolves (or every worker has stopped
    /// on its own), then waits for all workers to seal their segments.
    pub async fn run_until<F>(self, stop: F) -> Result<Vec<ChannelReport>, AppError>
    where
        F: Future<Output = ()>,
    {
        let run_start = Instant::now();
        file_utils::ensure_output_directory(&self.config.output_directory)?;

        let mut workers = JoinSet::new();
        for channel in &self.channels {
            let channel = channel.clone();
            let config = self.config.clone();
            let transports = self.transports.clone();
            let decoder = self.decoder.clone();
            let encoder = self.encoder.clone();
            let clock = self.clock.clone();
            let shutdown = self.shutdown.clone();
            debug!("  Spawning worker for channel '{}'", channel.name);
            workers.spawn_blocking(move || {
                let name = channel.name.clone();
                panic::catch_unwind(AssertUnwindSafe(move || {
                    run_channel(channel, config, transports.as_ref(), decoder, encoder, clock, shutdown)
                }))
                .unwrap_or_else(|payload| {
                    let reason = panic_message(payload.as_ref());
                    error!("💀 Channel '{}' worker panicked: {}", name, reason);
                    ChannelReport::failed(&name, AppError::Worker(format!("panicked: {}", reason)))
                })
            });
        }
        info!(
            "🚀 Recording {} channel(s) to {} at {} fps",
            self.channels.len(),
            self.config.output_directory.display(),
            self.config.target_fps
        );

        tokio::pin!(stop);
        let mut reports = Vec::with_capacity(self.channels.len());
        let mut unreported: HashSet<&str> = self.channels.iter().map(|c| c.name.as_str()).collect();
        loop {
            tokio::select! {
                _ = &mut stop, if !self.shutdown.is_cancelled() => {
                    info!("🛑 Stop requested, waiting for {} channel(s) to seal their segments", workers.len());
                    self.shutdown.cancel();
                }
                joined = workers.join_next() => match joined {
                    Some(Ok(report)) => {
                        debug!("Worker for channel '{}' joined", report.channel);
                        unreported.remove(report.channel.as_str());
                        reports.push(report);
                    }
                    Some(Err(join_err)) => {
                        error!("💀 Channel worker failed (panic or cancellation): {}", join_err);
                    }
                    None => break,
                }
            }
        }

        // Workers lost to a JoinError still count as failed channels.
        let mut lost: Vec<&str> = unreported.into_iter().collect();
        lost.sort_unstable();
        for name in lost {
            reports.push(ChannelReport::failed(
                name,
                AppError::Worker("worker ended without a report".to_string()),
            ));
        }

        info!("🏁 All {} channel worker(s) stopped after {:?}", reports.len(), run_start.elapsed());
        Ok(reports)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Body of one channel worker. Runs on the blocking pool.
fn run_channel(
    channel: ChannelSpec,
    config: Arc<RecorderConfig>,
    transports: &dyn TransportFactory,
    decoder: Arc<dyn FrameDecoder>,
    encoder: Arc<dyn SegmentEncoder>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> ChannelReport {
    let transport = match transports.create(&channel) {
        Ok(transport) => transport,
        Err(e) => {
            error!("❌ Channel '{}' could not create its transport: {}", channel.name, e);
            return ChannelReport::failed(&channel.name, e);
        }
    };
    let namer = SegmentNamer::new(
        &config.output_directory,
        &config.video_format,
        config.retention_count,
        clock.clone(),
    );
    let source = FrameSource::new(channel, transport, decoder, clock.clone(), shutdown.clone(), &config);
    ChannelRecorder::new(config, source, encoder, namer, clock, shutdown).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Transport;
    use crate::common::test_utils::{
        fake_jpeg, FakeDecoder, ManualClock, RecordingEncoder, ScriptedTransport, SharedTransportFactory,
    };
    use crate::recording::channel_recorder::RecorderState;
    use std::time::Duration;

    fn config(dir: &std::path::Path) -> RecorderConfig {
        RecorderConfig {
            output_directory: dir.to_path_buf(),
            target_fps: 50.0,
            retention_count: 3,
            ..RecorderConfig::default()
        }
    }

    fn supervisor(
        channels: Vec<ChannelSpec>,
        config: RecorderConfig,
        factory: Arc<dyn TransportFactory>,
        encoder: &RecordingEncoder,
    ) -> Result<Supervisor, AppError> {
        Supervisor::new(
            channels,
            config,
            factory,
            Arc::new(FakeDecoder::default()),
            Arc::new(encoder.clone()),
        )
    }

    fn live_factory() -> Arc<dyn TransportFactory> {
        Arc::new(SharedTransportFactory(ScriptedTransport::new(ManualClock::new(), Some(fake_jpeg(8, 8)))))
    }

    #[test]
    fn test_zero_channels_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = supervisor(Vec::new(), config(tmp.path()), live_factory(), &RecordingEncoder::default());
        match result {
            Err(AppError::Config(msg)) => assert_eq!(msg, "You must define at least one channel to record."),
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_duplicate_channel_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let channels = vec![ChannelSpec::new("front", "http://a/img.jpg"), ChannelSpec::new("front", "http://b/img.jpg")];
        let result = supervisor(channels, config(tmp.path()), live_factory(), &RecordingEncoder::default());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_stop_future_seals_every_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = RecordingEncoder::default();
        let channels = vec![ChannelSpec::new("front", "http://a/img.jpg"), ChannelSpec::new("back", "http://b/img.jpg")];
        let supervisor = supervisor(channels, config(tmp.path()), live_factory(), &encoder).unwrap();

        let reports = supervisor
            .run_until(tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(report.error.is_none(), "{:?}", report.error);
            assert_eq!(report.final_state, RecorderState::Stopped);
            assert_eq!(report.segments.len(), 1);
            assert!(report.frames_written > 0);
        }
        let logged = encoder.segments();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|s| s.closed));
    }

    #[tokio::test]
    async fn test_returns_early_when_every_channel_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let factory = Arc::new(SharedTransportFactory(ScriptedTransport::new(clock.clone(), None)));
        let cfg = RecorderConfig { startup_retry_limit: 2, ..config(tmp.path()) };
        let channels = vec![ChannelSpec::new("front", "http://a/img.jpg"), ChannelSpec::new("back", "http://b/img.jpg")];

        let reports = supervisor(channels, cfg, factory, &RecordingEncoder::default())
            .unwrap()
            .with_clock(clock)
            .run_until(std::future::pending())
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| matches!(r.error, Some(AppError::Acquisition { .. }))));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_recording() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = RecordingEncoder::default();
        let supervisor = supervisor(
            vec![ChannelSpec::new("front", "http://a/img.jpg")],
            config(tmp.path()),
            live_factory(),
            &encoder,
        )
        .unwrap();
        supervisor.shutdown_token().cancel();

        let reports = supervisor.run_until(std::future::pending()).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].error.is_none());
        assert!(encoder.segments().is_empty());
    }

    struct PanicsFor {
        name: &'static str,
        inner: ScriptedTransport,
    }

    impl TransportFactory for PanicsFor {
        fn create(&self, channel: &ChannelSpec) -> Result<Box<dyn Transport>, AppError> {
            if channel.name == self.name {
                panic!("transport for '{}' blew up", channel.name);
            }
            Ok(Box::new(self.inner.clone()))
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_affect_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = RecordingEncoder::default();
        let factory = Arc::new(PanicsFor {
            name: "bad",
            inner: ScriptedTransport::new(ManualClock::new(), Some(fake_jpeg(8, 8))),
        });
        let channels = vec![ChannelSpec::new("bad", "http://a/img.jpg"), ChannelSpec::new("good", "http://b/img.jpg")];

        let reports = supervisor(channels, config(tmp.path()), factory, &encoder)
            .unwrap()
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        let bad = reports.iter().find(|r| r.channel == "bad").unwrap();
        assert!(
            matches!(&bad.error, Some(AppError::Worker(msg)) if msg.contains("transport for 'bad' blew up")),
            "{:?}",
            bad.error
        );
        assert_eq!(bad.final_state, RecorderState::Stopped);

        let good = reports.iter().find(|r| r.channel == "good").unwrap();
        assert!(good.error.is_none());
        assert!(good.frames_written > 0);
    }

    #[tokio::test]
    async fn test_every_worker_panicking_reports_every_channel_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(PanicsFor {
            name: "only",
            inner: ScriptedTransport::new(ManualClock::new(), Some(fake_jpeg(8, 8))),
        });

        let reports = supervisor(
            vec![ChannelSpec::new("only", "http://a/img.jpg")],
            config(tmp.path()),
            factory,
            &RecordingEncoder::default(),
        )
        .unwrap()
        .run_until(std::future::pending())
        .await
        .unwrap();

        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].error, Some(AppError::Worker(_))));
        assert!(crate::operations::record_op::summarize_reports(&reports).is_err());
    }
}
