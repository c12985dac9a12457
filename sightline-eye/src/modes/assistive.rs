//! Assistive navigation: speech-oriented output, never persisted

use crate::narration::{generate_assistive_caption, generate_navigation_instruction};
use crate::pipeline::PipelineResult;
use crate::priority::apply_priority_filter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sightline_core::Navigation;

/// Only what a TTS/audio client needs. No storage identifiers or paths.
#[derive(Debug, Clone, Serialize)]
pub struct AssistiveResponse {
    pub timestamp: DateTime<Utc>,
    pub navigation: Navigation,
    pub navigation_spoken: String,
    pub scene_description: String,
    /// Urgent alert sentences, most important first
    pub urgent_alerts: Vec<String>,
    pub all_alerts: Vec<String>,
    pub urgent_count: usize,
    pub object_count: usize,
    pub safe_ratio: f32,
}

pub fn handle(result: &PipelineResult) -> AssistiveResponse {
    let detections = apply_priority_filter(result.detections.clone());

    let urgent_alerts: Vec<String> = detections
        .iter()
        .filter(|d| d.urgency)
        .map(|d| d.alert.clone())
        .collect();
    let all_alerts: Vec<String> = detections
        .iter()
        .filter(|d| !d.alert.is_empty())
        .map(|d| d.alert.clone())
        .collect();

    AssistiveResponse {
        timestamp: Utc::now(),
        navigation: result.navigation,
        navigation_spoken: generate_navigation_instruction(result.navigation).to_string(),
        scene_description: generate_assistive_caption(&detections, &result.caption),
        urgent_count: urgent_alerts.len(),
        object_count: detections.len(),
        urgent_alerts,
        all_alerts,
        safe_ratio: result.safe_ratio,
    }
}
