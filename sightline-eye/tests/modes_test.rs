//! Mode dispatch over real pipeline runs with in-process collaborators

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use parking_lot::Mutex;
use sightline_core::{BBox, FreeSpaceConfig, Mode, Navigation, PipelineConfig, RawDetection, SteeringInstruction};
use sightline_eye::depth::DepthField;
use sightline_eye::{
    DepthEstimator, Detector, ModeDispatcher, ModeResponse, ModelRegistry, PipelineOrchestrator, RecordStore,
    StoredRecord, SurveillanceRecord, VisionError,
};
use std::sync::Arc;

struct FixedDetector(Vec<RawDetection>);

#[async_trait]
impl Detector for FixedDetector {
    async fn detect(&self, _image: &RgbImage) -> Result<Vec<RawDetection>, VisionError> {
        Ok(self.0.clone())
    }
}

/// Far everywhere except one box, which reads as very close.
struct BoxDepth(BBox);

#[async_trait]
impl DepthEstimator for BoxDepth {
    async fn estimate(&self, image: &RgbImage) -> Result<DepthField, VisionError> {
        let b = self.0;
        Ok(DepthField::from_shape_fn(
            (image.height() as usize, image.width() as usize),
            |(r, c)| {
                let inside = (b.y1 as usize..b.y2 as usize).contains(&r) && (b.x1 as usize..b.x2 as usize).contains(&c);
                if inside { 10.0 } else { 0.0 }
            },
        ))
    }
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<StoredRecord>>,
    frames: Mutex<usize>,
    fail_inserts: bool,
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save_frame(&self, _image: &RgbImage, timestamp: DateTime<Utc>) -> Result<String, VisionError> {
        *self.frames.lock() += 1;
        Ok(format!("frames/{}.jpg", timestamp.timestamp_millis()))
    }

    async fn insert(&self, record: SurveillanceRecord) -> Result<String, VisionError> {
        if self.fail_inserts {
            return Err(VisionError::Storage("database unreachable".to_string()));
        }
        let mut records = self.records.lock();
        let id = format!("rec-{}", records.len() + 1);
        records.push(StoredRecord { id: id.clone(), record });
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<StoredRecord>, VisionError> {
        Ok(self.records.lock().iter().rev().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, VisionError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}

const PERSON: BBox = BBox { x1: 35, y1: 30, x2: 55, y2: 59 };

fn registry() -> ModelRegistry {
    let detections = vec![
        RawDetection::new("person", 0.91, PERSON),
        RawDetection::new("car", 0.8, BBox::new(2, 5, 20, 15)),
        RawDetection::new("tree", 0.7, BBox::new(60, 5, 80, 15)),
    ];
    let detector: Arc<dyn Detector> = Arc::new(FixedDetector(detections));
    ModelRegistry::new()
        .with_detector(Mode::Surveillance, "coco", detector.clone())
        .with_detector(Mode::SelfDriving, "road", detector)
        .with_depth(Arc::new(BoxDepth(PERSON)))
}

fn orchestrator() -> PipelineOrchestrator {
    PipelineOrchestrator::new(Arc::new(registry()), PipelineConfig::default(), FreeSpaceConfig::default())
}

fn frame() -> RgbImage {
    RgbImage::new(90, 60)
}

#[tokio::test]
async fn test_surveillance_persists_neutral_summary() {
    let store = Arc::new(MemoryStore::default());
    let dispatcher = ModeDispatcher::new(Some(store.clone()), FreeSpaceConfig::default());
    let image = Arc::new(frame());

    let result = orchestrator().run_pipeline(image.clone(), Mode::Surveillance, false, false).await;
    let response = dispatcher.dispatch(Mode::Surveillance, &result, Some(&image)).await;

    let ModeResponse::Surveillance(resp) = response else {
        panic!("expected a surveillance response");
    };
    assert!(resp.stored);
    assert_eq!(resp.record_id.as_deref(), Some("rec-1"));
    assert_eq!(resp.summary, "1 person detected. 1 vehicle detected.");
    assert_eq!(resp.detected_objects.len(), 2);

    let json = serde_json::to_value(&resp).unwrap();
    assert!(json["detected_objects"][0].get("urgency").is_none());
    assert!(json["detected_objects"][0].get("distance").is_none());

    let stored = store.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.object_count, 2);
    assert_eq!(stored[0].record.mode, "surveillance");
    assert!(stored[0].record.frame_path.is_some());
    assert_eq!(*store.frames.lock(), 1);
}

#[tokio::test]
async fn test_surveillance_storage_failure_still_responds() {
    let store = Arc::new(MemoryStore {
        fail_inserts: true,
        ..MemoryStore::default()
    });
    let dispatcher = ModeDispatcher::new(Some(store), FreeSpaceConfig::default());
    let result = orchestrator().run_pipeline(Arc::new(frame()), Mode::Surveillance, false, false).await;

    let ModeResponse::Surveillance(resp) = dispatcher.dispatch(Mode::Surveillance, &result, None).await else {
        panic!("expected a surveillance response");
    };
    assert!(!resp.stored);
    assert!(resp.record_id.is_none());
    assert_eq!(resp.summary, "1 person detected. 1 vehicle detected.");
}

#[tokio::test]
async fn test_assistive_is_speech_only() {
    let store = Arc::new(MemoryStore::default());
    let dispatcher = ModeDispatcher::new(Some(store.clone()), FreeSpaceConfig::default());
    // Assistive has no dedicated detector and falls back to the surveillance one.
    let result = orchestrator().run_pipeline(Arc::new(frame()), Mode::Assistive, false, false).await;
    let response = dispatcher.dispatch(Mode::Assistive, &result, Some(&frame())).await;
    assert_eq!(response.mode(), Mode::Assistive);

    let ModeResponse::Assistive(resp) = response else {
        panic!("expected an assistive response");
    };
    assert_eq!(resp.urgent_count, 1);
    assert_eq!(resp.urgent_alerts.len(), 1);
    assert!(resp.urgent_alerts[0].starts_with("Person detected"));
    assert!(resp.urgent_alerts[0].ends_with("URGENT!"));
    assert!(!resp.navigation_spoken.is_empty());
    assert!(resp.scene_description.starts_with("Person directly ahead"));

    let json = serde_json::to_value(&resp).unwrap();
    assert!(json.get("record_id").is_none());
    assert!(json.get("frame_path").is_none());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_self_driving_urgent_person_stops() {
    let dispatcher = ModeDispatcher::new(None, FreeSpaceConfig::default());
    let result = orchestrator().run_pipeline(Arc::new(frame()), Mode::SelfDriving, false, true).await;
    assert_eq!(result.model, "road");
    assert!(result.free_mask.is_none());

    let ModeResponse::SelfDriving(resp) = dispatcher.dispatch(Mode::SelfDriving, &result, None).await else {
        panic!("expected a self-driving response");
    };
    assert_eq!(resp.instruction, SteeringInstruction::Stop);
    assert!(resp.urgent_block);
    assert!(!resp.road_clear);
    assert_eq!(resp.urgent_count, 1);
    // the tree never survives the priority filter
    assert_eq!(resp.object_count, 2);
    assert_ne!(resp.navigation_raw, Navigation::Unknown);
}

#[tokio::test]
async fn test_self_driving_without_depth_stops() {
    let registry = ModelRegistry::new().with_detector(Mode::SelfDriving, "road", Arc::new(FixedDetector(vec![])));
    let orchestrator =
        PipelineOrchestrator::new(Arc::new(registry), PipelineConfig::default(), FreeSpaceConfig::default());
    let result = orchestrator.run_pipeline(Arc::new(frame()), Mode::SelfDriving, false, true).await;

    let dispatcher = ModeDispatcher::new(None, FreeSpaceConfig::default());
    let ModeResponse::SelfDriving(resp) = dispatcher.dispatch(Mode::SelfDriving, &result, None).await else {
        panic!("expected a self-driving response");
    };
    assert_eq!(resp.instruction, SteeringInstruction::Stop);
    assert!(!resp.urgent_block);
    assert_eq!(resp.navigation_raw, Navigation::Unknown);
}
