//! Surveillance: neutral counts, persisted records, no spatial or urgency language

use crate::narration::generate_surveillance_summary;
use crate::pipeline::PipelineResult;
use crate::storage::{ObservedObject, RecordStore, SurveillanceRecord};
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use sightline_core::{Detection, Mode};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SurveillanceResponse {
    pub mode: Mode,
    pub summary: String,
    pub detected_objects: Vec<ObservedObject>,
    pub timestamp: DateTime<Utc>,
    /// Whether the record reached storage
    pub stored: bool,
    pub record_id: Option<String>,
}

/// Keep only label, confidence and box.
pub fn strip_detections(detections: &[Detection]) -> Vec<ObservedObject> {
    detections
        .iter()
        .map(|d| ObservedObject {
            label: d.label.clone(),
            confidence: d.confidence,
            bbox: d.bbox,
        })
        .collect()
}

pub fn summarize(detections: &[Detection]) -> String {
    generate_surveillance_summary(detections.iter().map(|d| d.label.as_str()))
}

/// Build the record, persist it if a store is available, and report the outcome.
///
/// Storage failures are logged and reported as `stored: false`; they never fail the request.
pub async fn handle(
    result: &PipelineResult,
    raw_frame: Option<&RgbImage>,
    store: Option<&dyn RecordStore>,
) -> SurveillanceResponse {
    let timestamp = Utc::now();
    let detected_objects = strip_detections(&result.detections);
    let summary = summarize(&result.detections);

    let mut record_id = None;
    if let Some(store) = store {
        let frame_path = match raw_frame {
            Some(frame) => match store.save_frame(frame, timestamp).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to save surveillance frame: {}", e);
                    None
                }
            },
            None => None,
        };

        let record = SurveillanceRecord {
            timestamp,
            frame_path,
            detected_objects: detected_objects.clone(),
            summary: summary.clone(),
            object_count: detected_objects.len(),
            mode: Mode::Surveillance.to_string(),
        };
        match store.insert(record).await {
            Ok(id) => {
                info!("Stored surveillance record {} ({} objects)", id, detected_objects.len());
                record_id = Some(id);
            }
            Err(e) => warn!("Failed to store surveillance record: {}", e),
        }
    }

    SurveillanceResponse {
        mode: Mode::Surveillance,
        summary,
        detected_objects,
        timestamp,
        stored: record_id.is_some(),
        record_id,
    }
}
