//! Frame preparation: decode and bound the longer edge

use crate::error::VisionError;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use tracing::debug;

/// JPEG quality for persisted frames and collaborator uploads.
pub const JPEG_QUALITY: u8 = 85;

/// A decoded frame ready for the pipeline.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    /// RGB, the layout models consume
    pub rgb: RgbImage,
    pub width: u32,
    pub height: u32,
}

impl PreparedFrame {
    pub fn from_rgb(rgb: RgbImage) -> Self {
        let (width, height) = rgb.dimensions();
        Self { rgb, width, height }
    }

    /// Interleaved BGR copy, built on request for consumers that want that order.
    pub fn to_bgr(&self) -> Vec<u8> {
        self.rgb.pixels().flat_map(|p| [p[2], p[1], p[0]]).collect()
    }
}

/// Scale factor that brings the longer edge within `max_edge`, never above 1.
pub fn scale_factor(width: u32, height: u32, max_edge: u32) -> f64 {
    let longest = width.max(height);
    if longest == 0 {
        return 1.0;
    }
    (max_edge as f64 / longest as f64).min(1.0)
}

/// Downscale with bilinear filtering so the longer edge is at most `max_edge`.
pub fn resize_to_budget(image: RgbImage, max_edge: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = scale_factor(w, h, max_edge);
    if scale >= 1.0 {
        return image;
    }
    let nw = ((w as f64 * scale) as u32).max(1);
    let nh = ((h as f64 * scale) as u32).max(1);
    debug!("Resizing frame {}x{} -> {}x{}", w, h, nw, nh);
    image::imageops::resize(&image, nw, nh, FilterType::Triangle)
}

/// Decode encoded image bytes and bound them to `max_edge`.
pub fn prepare_frame(data: &[u8], max_edge: u32) -> Result<PreparedFrame, VisionError> {
    if data.is_empty() {
        return Err(VisionError::Decode("empty image payload".to_string()));
    }
    let decoded = image::load_from_memory(data)
        .map_err(|e| VisionError::Decode(format!("could not decode image: {}", e)))?;
    let rgb = resize_to_budget(decoded.to_rgb8(), max_edge);
    Ok(PreparedFrame::from_rgb(rgb))
}

/// [`prepare_frame`] on the blocking pool, keeping decode work off the async workers.
pub async fn prepare_frame_blocking(data: Bytes, max_edge: u32) -> Result<PreparedFrame, VisionError> {
    tokio::task::spawn_blocking(move || prepare_frame(&data, max_edge))
        .await
        .map_err(|e| VisionError::Decode(format!("decode task failed: {}", e)))?
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, VisionError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image)?;
    Ok(buf)
}
