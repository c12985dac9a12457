//! Self-driving: discrete steering instruction plus clearance telemetry, never persisted

use crate::navigation::{compute_navigation_vector, road_detections};
use crate::pipeline::PipelineResult;
use serde::Serialize;
use sightline_core::{FreeSpaceConfig, Navigation, SteeringInstruction};

#[derive(Debug, Clone, Serialize)]
pub struct SelfDrivingResponse {
    pub instruction: SteeringInstruction,
    /// Free-space suggestion before the urgency override
    pub navigation_raw: Navigation,
    pub scene_description: String,
    pub left_clear: f32,
    pub right_clear: f32,
    pub center_clear: bool,
    pub safe_ratio: f32,
    pub urgent_block: bool,
    pub urgent_count: usize,
    pub object_count: usize,
    /// `instruction == MoveForward`
    pub road_clear: bool,
}

pub fn handle(result: &PipelineResult, config: &FreeSpaceConfig) -> SelfDrivingResponse {
    let road = road_detections(&result.detections);
    let nav = compute_navigation_vector(result.clearance.as_ref(), &road, config);

    SelfDrivingResponse {
        instruction: nav.instruction,
        navigation_raw: result.navigation,
        scene_description: result.scene_description.clone(),
        left_clear: nav.left_clear,
        right_clear: nav.right_clear,
        center_clear: nav.center_clear,
        safe_ratio: nav.safe_ratio,
        urgent_block: nav.urgent_block,
        urgent_count: road.iter().filter(|d| d.urgency).count(),
        object_count: road.len(),
        road_clear: nav.instruction == SteeringInstruction::MoveForward,
    }
}
