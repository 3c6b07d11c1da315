//! Frames and the decode/encode capabilities the recorder is built on.
//!
//! The recorder only talks to [`FrameDecoder`] and [`SegmentEncoder`].
//! OpenCV (`imdecode`, `put_text`, `VideoWriter`) is the default backend.
//! Builds without the `opencv` feature fall back to the native backend: the
//! image crate for decoding and a small Motion-JPEG AVI writer capped at
//! 1 GiB per segment.

pub mod avi_writer;
pub mod native_backend;
pub mod overlay_font;
#[cfg(feature = "opencv")]
pub mod opencv_backend;

use crate::errors::AppError;
use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

/// A decoded, annotated RGB image. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: DateTime<Local>) -> Self {
        Frame { image: Arc::new(image), captured_at }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// When the pixels were fetched; only used for the overlay text.
    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// True when both frames share one pixel buffer, i.e. one is a re-yield of the other.
    pub fn shares_pixels_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

pub trait FrameDecoder: Send + Sync {
    /// Decodes a fetched snapshot and burns `overlay` into its pixels.
    fn decode_and_annotate(&self, bytes: &[u8], overlay: &str) -> Result<RgbImage, AppError>;
}

pub trait SegmentEncoder: Send + Sync {
    fn open_segment(
        &self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn SegmentWriter>, AppError>;
}

/// The active segment. Dropping without `close` leaves the file unfinalized.
pub trait SegmentWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), AppError>;

    /// True once the container cannot take another frame of the usual size.
    /// The recorder rotates to a fresh segment when this turns true.
    fn is_full(&self) -> bool {
        false
    }

    fn close(self: Box<Self>) -> Result<(), AppError>;
}

pub fn backend_names() -> &'static [&'static str] {
    if cfg!(feature = "opencv") {
        &["native", "opencv"]
    } else {
        &["native"]
    }
}

/// Picks the decoder/encoder pair named by `media_backend`.
pub fn build_backend(
    media_backend: &str,
    video_format: &str,
    video_codec: &str,
    jpeg_quality: u8,
) -> Result<(Arc<dyn FrameDecoder>, Arc<dyn SegmentEncoder>), AppError> {
    match media_backend.to_lowercase().as_str() {
        "native" => {
            if !video_format.eq_ignore_ascii_case(avi_writer::AVI_EXTENSION) {
                return Err(AppError::Config(format!(
                    "the native backend only writes '{}' segments, got '{}'",
                    avi_writer::AVI_EXTENSION,
                    video_format
                )));
            }
            if !video_codec.eq_ignore_ascii_case("mjpg") && !video_codec.eq_ignore_ascii_case("mjpeg") {
                log::warn!(
                    "⚠️ Codec '{}' is ignored by the native backend, segments are Motion-JPEG.",
                    video_codec
                );
            }
            let decoder: Arc<dyn FrameDecoder> = Arc::new(native_backend::NativeDecoder::default());
            let encoder: Arc<dyn SegmentEncoder> = Arc::new(avi_writer::MjpegAviEncoder::new(jpeg_quality));
            Ok((decoder, encoder))
        }
        #[cfg(feature = "opencv")]
        "opencv" => {
            let decoder: Arc<dyn FrameDecoder> = Arc::new(opencv_backend::OpenCvDecoder::default());
            let encoder: Arc<dyn SegmentEncoder> = Arc::new(opencv_backend::OpenCvEncoder::new(video_codec));
            Ok((decoder, encoder))
        }
        other => Err(AppError::Config(format!(
            "unknown media backend '{}', available: {}",
            other,
            backend_names().join(", ")
        ))),
    }
}
