use crate::errors::AppError;
use crate::media::overlay_font;
use crate::media::FrameDecoder;
use image::{Rgb, RgbImage};

/// Decodes snapshots with the `image` crate and burns in the overlay with the built-in font.
#[derive(Debug, Clone)]
pub struct NativeDecoder {
    pub origin: (u32, u32),
    pub scale: u32,
    pub colour: Rgb<u8>,
    pub shadow: Option<Rgb<u8>>,
}

impl Default for NativeDecoder {
    fn default() -> Self {
        NativeDecoder {
            origin: (30, 30),
            scale: 2,
            colour: Rgb([250, 200, 200]),
            shadow: Some(Rgb([0, 0, 0])),
        }
    }
}

impl FrameDecoder for NativeDecoder {
    fn decode_and_annotate(&self, bytes: &[u8], overlay: &str) -> Result<RgbImage, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Media("empty snapshot payload".to_string()));
        }
        let mut image = image::load_from_memory(bytes)
            .map_err(|e| AppError::Media(format!("failed to decode snapshot: {}", e)))?
            .to_rgb8();

        let (x, y) = self.origin;
        if let Some(shadow) = self.shadow {
            overlay_font::draw_text(&mut image, overlay, x + 1, y + 1, self.scale, shadow);
        }
        overlay_font::draw_text(&mut image, overlay, x, y, self.scale, self.colour);
        Ok(image)
    }
}
