//! Spatial classification: zones, categorical distance, alert sentences

use crate::priority::{apply_priority_filter, get_priority, is_urgent};
use ndarray::{s, Array2};
use sightline_core::{BBox, Detection, Direction, Distance, Mode, PriorityLevel, RawDetection, VerticalZone};

/// Horizontal third containing `cx`. Boundaries at `width/3` and `2*width/3` belong to the
/// zone on their right.
pub fn horizontal_zone(cx: f32, width: u32) -> Direction {
    let w = width as f32;
    if cx < w / 3.0 {
        Direction::Left
    } else if cx < 2.0 * w / 3.0 {
        Direction::Center
    } else {
        Direction::Right
    }
}

/// Vertical third containing `cy`, same boundary rule as [`horizontal_zone`].
pub fn vertical_zone(cy: f32, height: u32) -> VerticalZone {
    let h = height as f32;
    if cy < h / 3.0 {
        VerticalZone::Upper
    } else if cy < 2.0 * h / 3.0 {
        VerticalZone::Middle
    } else {
        VerticalZone::Lower
    }
}

pub fn compute_direction(bbox: &BBox, width: u32) -> Direction {
    horizontal_zone(bbox.center().0, width)
}

pub fn compute_vertical_zone(bbox: &BBox, height: u32) -> VerticalZone {
    vertical_zone(bbox.center().1, height)
}

/// Bucket a mean normalized depth score (larger = closer).
pub fn categorize_distance(avg: f32) -> Distance {
    if avg >= 0.75 {
        Distance::VeryClose
    } else if avg >= 0.50 {
        Distance::Near
    } else if avg >= 0.25 {
        Distance::Medium
    } else {
        Distance::Far
    }
}

/// Mean normalized depth under the box, clamped to the grid.
///
/// Returns [`Distance::Unknown`] without a depth field or when the clamped region is empty.
pub fn compute_distance(depth: Option<&Array2<f32>>, bbox: &BBox) -> Distance {
    let Some(depth) = depth else {
        return Distance::Unknown;
    };
    let (h, w) = depth.dim();
    let clamp = |v: i32, max: usize| v.clamp(0, max as i32) as usize;
    let (x1, x2) = (clamp(bbox.x1, w), clamp(bbox.x2, w));
    let (y1, y2) = (clamp(bbox.y1, h), clamp(bbox.y2, h));
    if x2 <= x1 || y2 <= y1 {
        return Distance::Unknown;
    }
    match depth.slice(s![y1..y2, x1..x2]).mean() {
        Some(avg) if avg.is_finite() => categorize_distance(avg),
        _ => Distance::Unknown,
    }
}

pub(crate) fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => {
            let rest = chars.as_str().to_lowercase();
            first.to_uppercase().chain(rest.chars()).collect()
        }
        None => String::new(),
    }
}

fn horizontal_phrase(direction: Direction) -> &'static str {
    match direction {
        Direction::Left => "on your left",
        Direction::Center => "directly ahead",
        Direction::Right => "on your right",
    }
}

fn vertical_phrase(zone: VerticalZone) -> &'static str {
    match zone {
        VerticalZone::Upper => "above",
        VerticalZone::Middle => "at mid-level",
        VerticalZone::Lower => "at ground level",
    }
}

fn distance_phrase(distance: Distance) -> &'static str {
    match distance {
        Distance::VeryClose => "at a very close distance",
        Distance::Near => "nearby",
        Distance::Medium => "at a moderate distance",
        Distance::Far => "far away",
        Distance::Unknown => "at an unknown distance",
    }
}

/// Alert sentence consumed by speech output. Urgency is only conveyed by the `URGENT!` suffix.
pub fn build_alert(
    label: &str,
    direction: Direction,
    vertical: VerticalZone,
    distance: Distance,
    urgency: bool,
) -> String {
    let mut alert = format!(
        "{} detected {} {} {}.",
        capitalize(label),
        horizontal_phrase(direction),
        vertical_phrase(vertical),
        distance_phrase(distance)
    );
    if urgency {
        alert.push_str(" URGENT!");
    }
    alert
}

/// Build a fully annotated detection for a box in a `width x height` frame.
pub fn annotate(
    label: &str,
    confidence: f32,
    bbox: BBox,
    width: u32,
    height: u32,
    distance: Distance,
) -> Detection {
    let direction = compute_direction(&bbox, width);
    let vertical = compute_vertical_zone(&bbox, height);
    let priority = get_priority(label);
    let urgency = is_urgent(priority, distance);
    Detection {
        label: label.to_string(),
        confidence,
        bbox,
        direction,
        vertical_zone: vertical,
        spatial_zone: format!("{} {}", vertical.as_str(), direction.as_str()),
        distance,
        priority,
        priority_level: PriorityLevel::from_level(priority),
        urgency,
        alert: build_alert(label, direction, vertical, distance, urgency),
    }
}

/// Merge raw detector output with zones, depth distance and priority.
///
/// Boxes are clamped to the frame and confidences rounded to three decimals. Surveillance never
/// uses depth, so its distances are always unknown and nothing is urgent.
pub fn fuse_detections(
    raw: Vec<RawDetection>,
    depth: Option<&Array2<f32>>,
    width: u32,
    height: u32,
    mode: Mode,
) -> Vec<Detection> {
    let depth = if mode == Mode::Surveillance { None } else { depth };
    let annotated = raw
        .into_iter()
        .map(|r| {
            let bbox = r.bbox.clamp_to(width, height);
            let distance = compute_distance(depth, &bbox);
            let confidence = (r.confidence.clamp(0.0, 1.0) * 1000.0).round() / 1000.0;
            annotate(&r.label, confidence, bbox, width, height, distance)
        })
        .collect();
    apply_priority_filter(annotated)
}
