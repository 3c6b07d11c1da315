//! Motion-JPEG in an AVI (RIFF) container.
//!
//! Layout written by [`MjpegAviWriter`]:
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     'avih'  MainAVIHeader (56 bytes)
//!     LIST 'strl'
//!       'strh'  AVIStreamHeader (56 bytes), fccType 'vids', handler 'MJPG'
//!       'strf'  BITMAPINFOHEADER (40 bytes)
//!   LIST 'movi'
//!     '00dc' <jpeg> ...
//!   'idx1'  one 16 byte entry per frame
//! ```
//!
//! Frame counts and sizes are unknown until the segment is sealed, so
//! `close` patches them in place.
//!
//! Every size and offset in the container is a `u32`. A segment is capped at
//! [`AVI_MAX_SEGMENT_BYTES`] (the AVI 1.0 RIFF limit): a frame that would push
//! the sealed file past the cap is refused, and [`SegmentWriter::is_full`]
//! reports when the next frame is unlikely to fit so the recorder can rotate.

use crate::errors::AppError;
use crate::media::{Frame, SegmentEncoder, SegmentWriter};
use image::codecs::jpeg::JpegEncoder;
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const AVI_EXTENSION: &str = "avi";
pub const AVI_MAX_SEGMENT_BYTES: u64 = 1 << 30;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

// Byte offsets of the fields patched on close.
const RIFF_SIZE_OFFSET: u64 = 4;
const AVIH_TOTAL_FRAMES_OFFSET: u64 = 48;
const AVIH_BUFFER_SIZE_OFFSET: u64 = 60;
const STRH_LENGTH_OFFSET: u64 = 140;
const STRH_BUFFER_SIZE_OFFSET: u64 = 144;
const MOVI_SIZE_OFFSET: u64 = 216;
const MOVI_FOURCC_OFFSET: u64 = 220;
const HEADER_LEN: u64 = 224;
const CHUNK_HEADER_LEN: u64 = 8;
const INDEX_ENTRY_LEN: u64 = 16;

#[derive(Debug, Clone)]
pub struct MjpegAviEncoder {
    jpeg_quality: u8,
}

impl MjpegAviEncoder {
    pub fn new(jpeg_quality: u8) -> Self {
        MjpegAviEncoder { jpeg_quality: jpeg_quality.clamp(1, 100) }
    }
}

impl SegmentEncoder for MjpegAviEncoder {
    fn open_segment(
        &self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn SegmentWriter>, AppError> {
        let writer = MjpegAviWriter::create(path, fps, width, height, self.jpeg_quality)?;
        Ok(Box::new(writer))
    }
}

struct IndexEntry {
    offset: u32, // relative to the 'movi' fourcc
    size: u32,
}

pub struct MjpegAviWriter {
    path: PathBuf,
    out: BufWriter<File>,
    width: u32,
    height: u32,
    jpeg_quality: u8,
    index: Vec<IndexEntry>,
    position: u64,
    max_chunk: u32,
    byte_limit: u64,
    jpeg_buf: Vec<u8>,
}

impl MjpegAviWriter {
    pub fn create(path: &Path, fps: f64, width: u32, height: u32, jpeg_quality: u8) -> Result<Self, AppError> {
        if width == 0 || height == 0 {
            return Err(AppError::Encoding(format!(
                "Invalid frame dimensions ({}x{}) for '{}'",
                width,
                height,
                path.display()
            )));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AppError::Encoding(format!("Invalid fps {} for '{}'", fps, path.display())));
        }
        let file = File::create(path).map_err(|e| {
            AppError::Encoding(format!("Failed to create segment '{}': {}", path.display(), e))
        })?;
        let mut writer = MjpegAviWriter {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            width,
            height,
            jpeg_quality,
            index: Vec::new(),
            position: 0,
            max_chunk: 0,
            byte_limit: AVI_MAX_SEGMENT_BYTES,
            jpeg_buf: Vec::new(),
        };
        writer
            .write_headers(fps)
            .map_err(|e| AppError::Encoding(format!("Failed to write AVI header to '{}': {}", path.display(), e)))?;
        debug!("AVI segment '{}' opened ({}x{} @ {} fps)", path.display(), width, height, fps);
        Ok(writer)
    }

    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Size of the sealed file if one more chunk of `chunk_len` bytes were appended.
    fn projected_size(&self, chunk_len: u64) -> u64 {
        let padded = chunk_len + chunk_len % 2;
        let entries = self.index.len() as u64 + 1;
        self.position
            .saturating_add(CHUNK_HEADER_LEN + padded)
            .saturating_add(CHUNK_HEADER_LEN)
            .saturating_add(entries.saturating_mul(INDEX_ENTRY_LEN))
    }

    fn put(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> std::io::Result<()> {
        self.put(&value.to_le_bytes())
    }

    fn put_u16(&mut self, value: u16) -> std::io::Result<()> {
        self.put(&value.to_le_bytes())
    }

    fn write_headers(&mut self, fps: f64) -> std::io::Result<()> {
        let (rate, scale) = fps_to_rate(fps);
        let micros_per_frame = (1_000_000.0 / fps).round() as u32;
        let frame_bytes = self.width.saturating_mul(self.height).saturating_mul(3);

        self.put(b"RIFF")?;
        self.put_u32(0)?; // patched
        self.put(b"AVI ")?;

        self.put(b"LIST")?;
        self.put_u32(192)?;
        self.put(b"hdrl")?;

        self.put(b"avih")?;
        self.put_u32(56)?;
        self.put_u32(micros_per_frame)?;
        self.put_u32(0)?; // max bytes per sec
        self.put_u32(0)?; // padding granularity
        self.put_u32(AVIF_HASINDEX)?;
        self.put_u32(0)?; // total frames, patched
        self.put_u32(0)?; // initial frames
        self.put_u32(1)?; // streams
        self.put_u32(0)?; // suggested buffer size, patched
        self.put_u32(self.width)?;
        self.put_u32(self.height)?;
        for _ in 0..4 {
            self.put_u32(0)?;
        }

        self.put(b"LIST")?;
        self.put_u32(116)?;
        self.put(b"strl")?;

        self.put(b"strh")?;
        self.put_u32(56)?;
        self.put(b"vids")?;
        self.put(b"MJPG")?;
        self.put_u32(0)?; // flags
        self.put_u16(0)?; // priority
        self.put_u16(0)?; // language
        self.put_u32(0)?; // initial frames
        self.put_u32(scale)?;
        self.put_u32(rate)?;
        self.put_u32(0)?; // start
        self.put_u32(0)?; // length, patched
        self.put_u32(0)?; // suggested buffer size, patched
        self.put_u32(u32::MAX)?; // quality: driver default
        self.put_u32(0)?; // sample size
        self.put_u16(0)?;
        self.put_u16(0)?;
        self.put_u16(self.width.min(u16::MAX as u32) as u16)?;
        self.put_u16(self.height.min(u16::MAX as u32) as u16)?;

        self.put(b"strf")?;
        self.put_u32(40)?;
        self.put_u32(40)?;
        self.put_u32(self.width)?;
        self.put_u32(self.height)?;
        self.put_u16(1)?; // planes
        self.put_u16(24)?; // bit count
        self.put(b"MJPG")?;
        self.put_u32(frame_bytes)?;
        for _ in 0..4 {
            self.put_u32(0)?;
        }

        self.put(b"LIST")?;
        self.put_u32(0)?; // patched
        self.put(b"movi")?;
        debug_assert_eq!(self.position, HEADER_LEN);
        Ok(())
    }

    fn append_chunk(&mut self, jpeg: &[u8]) -> std::io::Result<()> {
        let size = to_u32(jpeg.len() as u64, "chunk size")?;
        let offset = to_u32(self.position - MOVI_FOURCC_OFFSET, "chunk offset")?;
        self.put(b"00dc")?;
        self.put_u32(size)?;
        self.put(jpeg)?;
        if size % 2 == 1 {
            self.put(&[0])?;
        }
        self.index.push(IndexEntry { offset, size });
        self.max_chunk = self.max_chunk.max(size);
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        let movi_size = to_u32(self.position - MOVI_FOURCC_OFFSET, "movi size")?;
        let index_size = to_u32(self.index.len() as u64 * INDEX_ENTRY_LEN, "index size")?;
        let riff_size = to_u32(self.position + CHUNK_HEADER_LEN + u64::from(index_size) - 8, "RIFF size")?;

        self.put(b"idx1")?;
        self.put_u32(index_size)?;
        let entries = std::mem::take(&mut self.index);
        for entry in &entries {
            self.put(b"00dc")?;
            self.put_u32(AVIIF_KEYFRAME)?;
            self.put_u32(entry.offset)?;
            self.put_u32(entry.size)?;
        }
        let frames = entries.len() as u32;
        self.index = entries;
        debug_assert_eq!(u64::from(riff_size), self.position - 8);

        let patches = [
            (RIFF_SIZE_OFFSET, riff_size),
            (AVIH_TOTAL_FRAMES_OFFSET, frames),
            (AVIH_BUFFER_SIZE_OFFSET, self.max_chunk),
            (STRH_LENGTH_OFFSET, frames),
            (STRH_BUFFER_SIZE_OFFSET, self.max_chunk),
            (MOVI_SIZE_OFFSET, movi_size),
        ];
        for (offset, value) in patches {
            self.out.seek(SeekFrom::Start(offset))?;
            self.out.write_all(&value.to_le_bytes())?;
        }
        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        self.out.get_ref().sync_data()
    }
}

impl SegmentWriter for MjpegAviWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), AppError> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(AppError::Encoding(format!(
                "Frame is {}x{} but segment '{}' is {}x{}",
                frame.width(),
                frame.height(),
                self.path.display(),
                self.width,
                self.height
            )));
        }
        let mut jpeg = std::mem::take(&mut self.jpeg_buf);
        jpeg.clear();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode_image(frame.image())
            .map_err(|e| AppError::Encoding(format!("JPEG encode failed for '{}': {}", self.path.display(), e)))?;
        let projected = self.projected_size(jpeg.len() as u64);
        if projected > self.byte_limit {
            self.jpeg_buf = jpeg;
            return Err(AppError::Encoding(format!(
                "Segment '{}' is full: {} more bytes would exceed the {} byte limit",
                self.path.display(),
                projected - self.position,
                self.byte_limit
            )));
        }
        let result = self.append_chunk(&jpeg);
        self.jpeg_buf = jpeg;
        result.map_err(|e| AppError::Encoding(format!("Write failed for '{}': {}", self.path.display(), e)))
    }

    fn is_full(&self) -> bool {
        self.projected_size(u64::from(self.max_chunk)) > self.byte_limit
    }

    fn close(mut self: Box<Self>) -> Result<(), AppError> {
        self.finish()
            .map_err(|e| AppError::Encoding(format!("Failed to finalize '{}': {}", self.path.display(), e)))?;
        debug!("AVI segment '{}' sealed with {} frames", self.path.display(), self.frame_count());
        Ok(())
    }
}

fn to_u32(value: u64, what: &str) -> std::io::Result<u32> {
    u32::try_from(value).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("AVI {} {} does not fit in 32 bits", what, value),
        )
    })
}

/// Expresses `fps` as the `rate / scale` pair AVI stream headers use.
fn fps_to_rate(fps: f64) -> (u32, u32) {
    if (fps - fps.round()).abs() < 1e-9 {
        (fps.round() as u32, 1)
    } else {
        ((fps * 1000.0).round() as u32, 1000)
    }
}
