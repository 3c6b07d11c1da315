// Shared fakes for unit tests: a manual clock and scriptable transport,
// decoder and encoder collaborators that need no network or media libraries.

use crate::camera::{Transport, TransportFactory};
use crate::channel_config::ChannelSpec;
use crate::errors::AppError;
use crate::media::{Frame, FrameDecoder, SegmentEncoder, SegmentWriter};
use crate::recording::clock::Clock;
use bytes::Bytes;
use chrono::{DateTime, Local, TimeZone};
use image::RgbImage;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Time only moves when something sleeps or calls `advance`.
pub struct ManualClock {
    base: Instant,
    base_wall: DateTime<Local>,
    offset: Mutex<Duration>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(ManualClock {
            base: Instant::now(),
            base_wall: Local.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            offset: Mutex::new(Duration::ZERO),
            slept: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn wall_time(&self) -> DateTime<Local> {
        self.base_wall + chrono::Duration::from_std(self.elapsed()).unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// Payload understood by [`FakeDecoder`]: `"<width>x<height>"`.
pub fn fake_jpeg(width: u32, height: u32) -> Bytes {
    Bytes::from(format!("{}x{}", width, height))
}

#[derive(Default)]
struct TransportState {
    script: VecDeque<Result<Bytes, AppError>>,
    calls: usize,
    cancel_at: Option<(usize, CancellationToken)>,
}

/// Plays back scripted responses, then keeps answering with `fallback`
/// (`None` = keep failing). Every fetch advances the clock by `cost`.
#[derive(Clone)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
    fallback: Option<Bytes>,
    clock: Arc<ManualClock>,
    cost: Duration,
}

impl ScriptedTransport {
    pub fn new(clock: Arc<ManualClock>, fallback: Option<Bytes>) -> Self {
        ScriptedTransport {
            state: Arc::new(Mutex::new(TransportState::default())),
            fallback,
            clock,
            cost: Duration::ZERO,
        }
    }

    pub fn with_cost(mut self, cost: Duration) -> Self {
        self.cost = cost;
        self
    }

    pub fn push_ok(&self, bytes: Bytes) -> &Self {
        self.state.lock().unwrap().script.push_back(Ok(bytes));
        self
    }

    pub fn push_err(&self, details: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .script
            .push_back(Err(AppError::Network(details.to_string())));
        self
    }

    /// Cancels `token` as part of the `calls`-th fetch (the fetch itself still answers).
    pub fn cancel_after(&self, calls: usize, token: &CancellationToken) -> &Self {
        self.state.lock().unwrap().cancel_at = Some((calls, token.clone()));
        self
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

impl Transport for ScriptedTransport {
    fn fetch(&self, uri: &str, _timeout: Duration) -> Result<Bytes, AppError> {
        self.clock.advance(self.cost);
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if let Some((at, token)) = &state.cancel_at {
            if state.calls >= *at {
                token.cancel();
            }
        }
        match state.script.pop_front() {
            Some(result) => result,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AppError::Network(format!("connection refused: {}", uri))),
        }
    }
}

/// Hands every channel a clone of the same scripted transport.
pub struct SharedTransportFactory(pub ScriptedTransport);

impl TransportFactory for SharedTransportFactory {
    fn create(&self, _channel: &ChannelSpec) -> Result<Box<dyn Transport>, AppError> {
        Ok(Box::new(self.0.clone()))
    }
}

/// Decodes [`fake_jpeg`] payloads into black images and remembers the overlays it drew.
#[derive(Default)]
pub struct FakeDecoder {
    pub overlays: Mutex<Vec<String>>,
}

impl FrameDecoder for FakeDecoder {
    fn decode_and_annotate(&self, bytes: &[u8], overlay: &str) -> Result<RgbImage, AppError> {
        let text = std::str::from_utf8(bytes).map_err(|e| AppError::Media(e.to_string()))?;
        let (w, h) = text
            .split_once('x')
            .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
            .ok_or_else(|| AppError::Media(format!("not an image: {:?}", text)))?;
        self.overlays.lock().unwrap().push(overlay.to_string());
        Ok(RgbImage::new(w, h))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentLog {
    pub path: PathBuf,
    pub frames: usize,
    pub closed: bool,
}

#[derive(Default)]
struct EncoderState {
    segments: Vec<SegmentLog>,
    writes: usize,
}

/// Writes one byte per frame to a real file so retention sees it on disk.
#[derive(Clone, Default)]
pub struct RecordingEncoder {
    state: Arc<Mutex<EncoderState>>,
    fail_open: bool,
    fail_writes_from: Option<usize>,
    full_after: Option<usize>,
}

impl RecordingEncoder {
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Every write with a global index at or past `from` fails.
    pub fn failing_writes_from(mut self, from: usize) -> Self {
        self.fail_writes_from = Some(from);
        self
    }

    /// Segments report themselves full once they hold `frames` frames.
    pub fn full_after(mut self, frames: usize) -> Self {
        self.full_after = Some(frames);
        self
    }

    pub fn segments(&self) -> Vec<SegmentLog> {
        self.state.lock().unwrap().segments.clone()
    }
}

impl SegmentEncoder for RecordingEncoder {
    fn open_segment(
        &self,
        path: &Path,
        _fps: f64,
        _width: u32,
        _height: u32,
    ) -> Result<Box<dyn SegmentWriter>, AppError> {
        if self.fail_open {
            return Err(AppError::Encoding(format!("cannot open {}", path.display())));
        }
        let file = std::fs::File::create(path)?;
        let mut state = self.state.lock().unwrap();
        state.segments.push(SegmentLog { path: path.to_path_buf(), frames: 0, closed: false });
        Ok(Box::new(RecordingWriter {
            encoder: self.clone(),
            slot: state.segments.len() - 1,
            file,
        }))
    }
}

struct RecordingWriter {
    encoder: RecordingEncoder,
    slot: usize,
    file: std::fs::File,
}

impl SegmentWriter for RecordingWriter {
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), AppError> {
        let mut state = self.encoder.state.lock().unwrap();
        let index = state.writes;
        state.writes += 1;
        if matches!(self.encoder.fail_writes_from, Some(from) if index >= from) {
            return Err(AppError::Encoding("disk full".to_string()));
        }
        self.file.write_all(&[0])?;
        state.segments[self.slot].frames += 1;
        Ok(())
    }

    fn is_full(&self) -> bool {
        let frames = self.encoder.state.lock().unwrap().segments[self.slot].frames;
        matches!(self.encoder.full_after, Some(limit) if frames >= limit)
    }

    fn close(self: Box<Self>) -> Result<(), AppError> {
        self.encoder.state.lock().unwrap().segments[self.slot].closed = true;
        Ok(())
    }
}
