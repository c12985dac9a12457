//! Depth field utilities: normalization, colorized previews, PNG/base64 encoding

use crate::error::VisionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array2;
use std::io::Cursor;

/// Per-pixel depth scores, `(rows, cols)` = `(height, width)`. Larger means closer.
pub type DepthField = Array2<f32>;

/// Range below which a field is considered flat.
pub const FLAT_EPSILON: f32 = 1e-6;

/// Min-max scale into `[0, 1]`. Flat fields (and fields with no finite values) become zeros.
pub fn normalize_depth(raw: &DepthField) -> DepthField {
    let (min, max) = raw
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if !min.is_finite() || !max.is_finite() || max - min <= FLAT_EPSILON {
        return DepthField::zeros(raw.raw_dim());
    }

    let range = max - min;
    raw.mapv(|v| {
        if v.is_finite() {
            ((v - min) / range).clamp(0.0, 1.0)
        } else {
            0.0
        }
    })
}

/// Check that an estimator returned a grid matching the frame.
pub fn ensure_shape(depth: &DepthField, width: u32, height: u32) -> Result<(), VisionError> {
    let (rows, cols) = depth.dim();
    if rows != height as usize || cols != width as usize {
        return Err(VisionError::Depth(format!(
            "depth grid is {}x{}, frame is {}x{}",
            cols, rows, width, height
        )));
    }
    Ok(())
}

const INFERNO: [(f32, [u8; 3]); 9] = [
    (0.000, [0, 0, 4]),
    (0.125, [31, 12, 72]),
    (0.250, [85, 15, 109]),
    (0.375, [136, 34, 106]),
    (0.500, [186, 54, 85]),
    (0.625, [227, 89, 51]),
    (0.750, [249, 140, 10]),
    (0.875, [249, 201, 50]),
    (1.000, [252, 255, 164]),
];

/// Inferno-style colour for a value in `[0, 1]`.
pub fn inferno(t: f32) -> Rgb<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    for pair in INFERNO.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let f = (t - t0) / (t1 - t0);
            let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * f).round() as u8;
            return Rgb([lerp(c0[0], c1[0]), lerp(c0[1], c1[1]), lerp(c0[2], c1[2])]);
        }
    }
    Rgb(INFERNO[INFERNO.len() - 1].1)
}

/// Colorize a normalized field.
pub fn colorize_depth(depth: &DepthField) -> RgbImage {
    let (rows, cols) = depth.dim();
    RgbImage::from_fn(cols as u32, rows as u32, |x, y| inferno(depth[[y as usize, x as usize]]))
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, VisionError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// PNG-encode and base64 an image for JSON transport.
pub fn encode_png_base64(image: &RgbImage) -> Result<String, VisionError> {
    Ok(STANDARD.encode(encode_png(image)?))
}

/// Colorized preview of a normalized field as base64 PNG.
pub fn depth_to_base64(depth: &DepthField) -> Result<String, VisionError> {
    encode_png_base64(&colorize_depth(depth))
}
