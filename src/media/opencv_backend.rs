use crate::errors::AppError;
use crate::media::{Frame, FrameDecoder, SegmentEncoder, SegmentWriter};
use anyhow::Context;
use image::RgbImage;
use log::{debug, error, warn};
use opencv::prelude::*;
use opencv::{core as opencv_core, imgcodecs, imgproc, videoio};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct OpenCvDecoder {
    pub origin: (i32, i32),
    pub font_scale: f64,
    pub colour_bgr: (f64, f64, f64),
}

impl Default for OpenCvDecoder {
    fn default() -> Self {
        OpenCvDecoder {
            origin: (30, 30),
            font_scale: 0.8,
            colour_bgr: (200.0, 200.0, 250.0),
        }
    }
}

impl FrameDecoder for OpenCvDecoder {
    fn decode_and_annotate(&self, bytes: &[u8], overlay: &str) -> Result<RgbImage, AppError> {
        let buf = opencv_core::Vector::<u8>::from_slice(bytes);
        let mut bgr = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)?;
        if bgr.empty() {
            return Err(AppError::Media("OpenCV: snapshot decoded to an empty image".to_string()));
        }

        let (b, g, r) = self.colour_bgr;
        imgproc::put_text(
            &mut bgr,
            overlay,
            opencv_core::Point::new(self.origin.0, self.origin.1),
            imgproc::FONT_HERSHEY_COMPLEX_SMALL,
            self.font_scale,
            opencv_core::Scalar::new(b, g, r, 0.0),
            1,
            imgproc::LINE_AA,
            false,
        )?;

        let mut rgb = opencv_core::Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let (cols, rows) = (rgb.cols() as u32, rgb.rows() as u32);
        let data = rgb.data_bytes()?.to_vec();
        RgbImage::from_raw(cols, rows, data)
            .ok_or_else(|| AppError::Media(format!("OpenCV: unexpected buffer size for {}x{} image", cols, rows)))
    }
}

fn fourcc_for(codec: &str) -> &'static str {
    match codec.to_lowercase().as_str() {
        "mjpg" | "mjpeg" => "MJPG",
        "xvid" => "XVID",
        "divx" => "DIVX",
        "mp4v" => "MP4V",
        "h264" | "avc1" => "avc1",
        codec_val => {
            warn!("⚠️ Unsupported video_codec '{}' for OpenCV VideoWriter. Defaulting to MJPG.", codec_val);
            "MJPG"
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenCvEncoder {
    fourcc: &'static str,
}

impl OpenCvEncoder {
    pub fn new(video_codec: &str) -> Self {
        OpenCvEncoder { fourcc: fourcc_for(video_codec) }
    }
}

impl SegmentEncoder for OpenCvEncoder {
    fn open_segment(
        &self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn SegmentWriter>, AppError> {
        let mut chars = self.fourcc.chars();
        let mut next = || chars.next().unwrap_or(' ');
        let fourcc = videoio::VideoWriter::fourcc(next(), next(), next(), next())?;

        let path_str = path
            .to_str()
            .context("Invalid output path for video (not UTF-8)")
            .map_err(|e| AppError::Encoding(format!("{:#}", e)))?;
        let writer = videoio::VideoWriter::new(
            path_str,
            fourcc,
            fps,
            opencv_core::Size::new(width as i32, height as i32),
            true,
        )?;
        if !videoio::VideoWriter::is_opened(&writer)? {
            let err_msg = format!("Failed to open VideoWriter at path '{}'", path.display());
            error!("❌ OpenCV: {}", err_msg);
            if path.exists() {
                if let Err(del_err) = std::fs::remove_file(path) {
                    warn!("Failed to delete empty file {} after VideoWriter open error: {}", path.display(), del_err);
                }
            }
            return Err(AppError::Encoding(err_msg));
        }
        debug!("✍️ OpenCV: VideoWriter ({}) opened for {}", self.fourcc, path.display());
        Ok(Box::new(OpenCvSegmentWriter {
            path: path.to_path_buf(),
            writer,
            width,
            height,
        }))
    }
}

struct OpenCvSegmentWriter {
    path: PathBuf,
    writer: videoio::VideoWriter,
    width: u32,
    height: u32,
}

impl SegmentWriter for OpenCvSegmentWriter {
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
        let mut bgr = opencv_core::Mat::new_rows_cols_with_default(
            self.height as i32,
            self.width as i32,
            opencv_core::CV_8UC3,
            opencv_core::Scalar::all(0.0),
        )?;
        let dst = bgr.data_bytes_mut()?;
        for (out, px) in dst.chunks_exact_mut(3).zip(frame.image().pixels()) {
            out[0] = px[2];
            out[1] = px[1];
            out[2] = px[0];
        }
        self.writer.write(&bgr)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), AppError> {
        self.writer.release()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_segment_writer_is_send_without_unsafe() {
        assert_send::<OpenCvSegmentWriter>();
    }

    #[test]
    fn test_fourcc_for_known_codecs() {
        assert_eq!(fourcc_for("MJPEG"), "MJPG");
        assert_eq!(fourcc_for("h264"), "avc1");
        assert_eq!(fourcc_for("theora"), "MJPG");
    }
}
