//! Persistence contract for surveillance records

use crate::error::VisionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use sightline_core::BBox;

/// Stripped detection kept in surveillance records: no zones, distance or urgency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedObject {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

/// Document inserted for every surveillance frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveillanceRecord {
    pub timestamp: DateTime<Utc>,
    /// Where the frame was saved, if saving succeeded
    pub frame_path: Option<String>,
    pub detected_objects: Vec<ObservedObject>,
    pub summary: String,
    pub object_count: usize,
    pub mode: String,
}

/// A stored record with its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: SurveillanceRecord,
}

/// Durable storage for surveillance output.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Save the frame image and return its path.
    async fn save_frame(&self, image: &RgbImage, timestamp: DateTime<Utc>) -> Result<String, VisionError>;

    /// Insert a record and return its id.
    async fn insert(&self, record: SurveillanceRecord) -> Result<String, VisionError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<StoredRecord>, VisionError>;

    /// Delete a record; `false` if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool, VisionError>;
}
