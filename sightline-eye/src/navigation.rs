//! Self-driving steering decision: free-space clearance plus an urgency override

use crate::free_space::Clearance;
use crate::priority::{apply_priority_filter, get_priority};
use serde::{Deserialize, Serialize};
use sightline_core::{Detection, FreeSpaceConfig, SteeringInstruction};

/// Labels that matter on a road.
pub const ROAD_LABELS: &[&str] = &[
    "person",
    "pedestrian",
    "child",
    "cyclist",
    "motorcyclist",
    "car",
    "truck",
    "bus",
    "motorcycle",
    "bicycle",
    "emergency vehicle",
    "ambulance",
    "fire truck",
    "traffic light",
    "stop sign",
    "road sign",
    "barrier",
    "cone",
    "pothole",
    "speed bump",
];

/// Road detections below this level are ignored.
pub const ROAD_MIN_PRIORITY: u8 = 3;

/// Steering decision with the clearance telemetry behind it.
///
/// `urgent_block` always implies [`SteeringInstruction::Stop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationVector {
    pub instruction: SteeringInstruction,
    pub left_clear: f32,
    pub right_clear: f32,
    pub center_clear: bool,
    pub safe_ratio: f32,
    pub urgent_block: bool,
}

/// Road-relevant detections, priority-filtered and ordered urgent first.
pub fn road_detections(detections: &[Detection]) -> Vec<Detection> {
    let road: Vec<Detection> = detections
        .iter()
        .filter(|d| {
            let label = d.label.trim().to_lowercase();
            ROAD_LABELS.contains(&label.as_str()) && get_priority(&label) >= ROAD_MIN_PRIORITY
        })
        .cloned()
        .collect();
    apply_priority_filter(road)
}

/// Combine clearance with road urgency.
///
/// Any urgent road detection stops the vehicle regardless of free space. Without clearance (no
/// depth) the vehicle also stops, since there is no evidence the path is open.
pub fn compute_navigation_vector(
    clearance: Option<&Clearance>,
    road: &[Detection],
    config: &FreeSpaceConfig,
) -> NavigationVector {
    let urgent_block = road.iter().any(|d| d.urgency);
    let c = clearance.copied().unwrap_or_default();

    let instruction = if urgent_block || clearance.is_none() {
        SteeringInstruction::Stop
    } else if c.center_clear {
        SteeringInstruction::MoveForward
    } else if c.left_clear > c.right_clear && c.left_clear > config.side_clear_min {
        SteeringInstruction::TurnLeft
    } else if c.right_clear > c.left_clear && c.right_clear > config.side_clear_min {
        SteeringInstruction::TurnRight
    } else {
        SteeringInstruction::Stop
    };

    NavigationVector {
        instruction,
        left_clear: round3(c.left_clear),
        right_clear: round3(c.right_clear),
        center_clear: c.center_clear,
        safe_ratio: c.safe_ratio,
        urgent_block,
    }
}

fn round3(v: f32) -> f32 {
    (v * 1000.0).round() / 1000.0
}
