//! Free-space segmentation of the lower half of a normalized depth field
//!
//! The lower half of the frame is where the ground and the immediate path are. Pixels whose
//! normalized depth is below the threshold are far away and therefore walkable/drivable. The
//! binary mask is opened with a disc to remove speckle, and the largest 8-connected region is
//! taken as the safe area that steering decisions are based on.

use crate::depth::DepthField;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::s;
use sightline_core::{FreeSpaceConfig, Navigation};
use tracing::debug;

/// Coverage of the largest safe region, per side of the lower half.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clearance {
    pub left_clear: f32,
    pub right_clear: f32,
    pub center_clear: bool,
    /// Fraction of the lower half covered by any safe pixel, not just the largest region
    pub safe_ratio: f32,
}

/// Outcome of one free-space analysis.
#[derive(Debug, Clone)]
pub struct FreeSpaceResult {
    pub navigation: Navigation,
    pub safe_ratio: f32,
    /// `None` when no depth field was available
    pub clearance: Option<Clearance>,
    pub overlay: Option<RgbImage>,
}

impl FreeSpaceResult {
    /// Result used when depth was skipped or failed.
    pub fn unknown() -> Self {
        Self {
            navigation: Navigation::Unknown,
            safe_ratio: 0.0,
            clearance: None,
            overlay: None,
        }
    }

    fn obstacle() -> Self {
        Self {
            navigation: Navigation::ObstacleAhead,
            safe_ratio: 0.0,
            clearance: Some(Clearance::default()),
            overlay: None,
        }
    }
}

/// Four-way steering decision from clearances.
pub fn decide_navigation(clearance: &Clearance, side_clear_min: f32) -> Navigation {
    let (l, r) = (clearance.left_clear, clearance.right_clear);
    if clearance.center_clear {
        Navigation::MoveForward
    } else if l > r && l > side_clear_min {
        Navigation::MoveSlightlyLeft
    } else if r > l && r > side_clear_min {
        Navigation::MoveSlightlyRight
    } else {
        Navigation::ObstacleAhead
    }
}

/// Binary safe mask of the lower half (255 = safe), before opening.
pub fn lower_half_mask(depth: &DepthField, threshold: f32) -> GrayImage {
    let (rows, cols) = depth.dim();
    let lower = depth.slice(s![rows / 2.., ..]);
    GrayImage::from_fn(cols as u32, (rows - rows / 2) as u32, |x, y| {
        if lower[[y as usize, x as usize]] < threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Largest 8-connected foreground region as a 0/1 mask.
///
/// Ties on area go to the region whose first pixel comes earliest in raster order (topmost,
/// then leftmost), so the choice never depends on the labelling implementation.
pub fn largest_component(mask: &GrayImage) -> Vec<u8> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut area: Vec<usize> = Vec::new();
    let mut first_seen: Vec<usize> = Vec::new();

    for (idx, px) in labels.pixels().enumerate() {
        let label = px[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= area.len() {
            area.resize(label + 1, 0);
            first_seen.resize(label + 1, usize::MAX);
        }
        area[label] += 1;
        first_seen[label] = first_seen[label].min(idx);
    }

    let best = (1..area.len())
        .filter(|&l| area[l] > 0)
        .max_by(|&a, &b| area[a].cmp(&area[b]).then(first_seen[b].cmp(&first_seen[a])));

    match best {
        Some(best) => labels.pixels().map(|px| u8::from(px[0] as usize == best)).collect(),
        None => vec![0; (mask.width() * mask.height()) as usize],
    }
}

fn mean_over(mask: &[u8], width: usize, xs: std::ops::Range<usize>, ys: std::ops::Range<usize>) -> f32 {
    let count = xs.len() * ys.len();
    if count == 0 {
        return 0.0;
    }
    let sum: usize = ys
        .flat_map(|y| xs.clone().map(move |x| mask[y * width + x] as usize))
        .sum();
    sum as f32 / count as f32
}

fn round3(v: f32) -> f32 {
    (v * 1000.0).round() / 1000.0
}

/// Segment free space in a normalized depth field and suggest a direction.
///
/// `render_overlay` controls the decorative overlay only; the decision is identical either way.
pub fn detect_free_space(
    depth: &DepthField,
    config: &FreeSpaceConfig,
    render_overlay: bool,
) -> FreeSpaceResult {
    let (rows, cols) = depth.dim();
    if rows == 0 || cols == 0 {
        return FreeSpaceResult::obstacle();
    }

    let raw = lower_half_mask(depth, config.threshold);
    let binary = imageproc::morphology::open(&raw, Norm::L2, config.opening_radius);
    let (lw, lh) = (binary.width() as usize, binary.height() as usize);

    let safe_pixels = binary.pixels().filter(|p| p[0] > 0).count();
    let safe_ratio = safe_pixels as f32 / (lw * lh) as f32;

    let largest = largest_component(&binary);

    let cx0 = (lw as f32 * config.center_x_range.0) as usize;
    let cx1 = (lw as f32 * config.center_x_range.1) as usize;
    let cy0 = (lh as f32 * config.center_y_start) as usize;
    let center_cov = mean_over(&largest, lw, cx0..cx1, cy0..lh);

    let clearance = Clearance {
        left_clear: mean_over(&largest, lw, 0..lw / 2, 0..lh),
        right_clear: mean_over(&largest, lw, lw / 2..lw, 0..lh),
        center_clear: center_cov > config.center_coverage_min,
        safe_ratio: round3(safe_ratio),
    };
    let navigation = decide_navigation(&clearance, config.side_clear_min);

    debug!(
        "Free space: {} (safe {:.3}, left {:.3}, right {:.3}, centre {})",
        navigation, clearance.safe_ratio, clearance.left_clear, clearance.right_clear, clearance.center_clear
    );

    let overlay = render_overlay.then(|| {
        render_free_space_overlay(depth, &largest, (cx0, cy0, cx1, lh), &clearance, navigation)
    });

    FreeSpaceResult {
        navigation,
        safe_ratio: clearance.safe_ratio,
        clearance: Some(clearance),
        overlay,
    }
}

const SAFE_COLOUR: Rgb<u8> = Rgb([80, 200, 0]);
const CLEAR_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const BLOCKED_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const CAUTION_COLOUR: Rgb<u8> = Rgb([255, 165, 0]);

/// Lower-half visualisation: largest region green, everything else dimmed, the centre patch
/// outlined green or red, and a status badge in the top-left corner.
fn render_free_space_overlay(
    depth: &DepthField,
    largest: &[u8],
    patch: (usize, usize, usize, usize),
    clearance: &Clearance,
    navigation: Navigation,
) -> RgbImage {
    let (rows, cols) = depth.dim();
    let top = rows / 2;
    let mut overlay = RgbImage::from_fn(cols as u32, (rows - top) as u32, |x, y| {
        if largest[y as usize * cols + x as usize] == 1 {
            SAFE_COLOUR
        } else {
            let g = (depth[[top + y as usize, x as usize]].clamp(0.0, 1.0) * 255.0) as u8;
            let dim = (g as f32 * 0.4) as u8;
            Rgb([dim, dim, dim])
        }
    });

    let (cx0, cy0, cx1, cy1) = patch;
    if cx1 > cx0 && cy1 > cy0 {
        let colour = if clearance.center_clear { CLEAR_COLOUR } else { BLOCKED_COLOUR };
        let (w, h) = ((cx1 - cx0) as u32, (cy1 - cy0) as u32);
        draw_hollow_rect_mut(&mut overlay, Rect::at(cx0 as i32, cy0 as i32).of_size(w, h), colour);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(
                &mut overlay,
                Rect::at(cx0 as i32 + 1, cy0 as i32 + 1).of_size(w - 2, h - 2),
                colour,
            );
        }
    }

    let badge = if navigation == Navigation::MoveForward { CLEAR_COLOUR } else { CAUTION_COLOUR };
    let side = (overlay.width().min(overlay.height()) / 8).max(1);
    draw_filled_rect_mut(&mut overlay, Rect::at(0, 0).of_size(side, side), badge);
    overlay
}
