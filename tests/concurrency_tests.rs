use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use image::{ImageFormat, RgbImage};
use sightline_core::{BBox, FreeSpaceConfig, Mode, PipelineConfig, RawDetection, SightlineConfig};
use sightline_eye::{
    AdmissionGate, Detector, ModelRegistry, PipelineOrchestrator, VisionError,
};
use sightline_server::{create_router, ApiState, LocalStore};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Holds each call long enough for a second request to arrive.
struct SlowDetector {
    calls: AtomicUsize,
}

#[async_trait]
impl Detector for SlowDetector {
    async fn detect(&self, _image: &RgbImage) -> Result<Vec<RawDetection>, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(vec![RawDetection::new("person", 0.9, BBox::new(1, 1, 10, 10))])
    }
}

/// Records how many `detect` calls are running at once. The guard also counts calls
/// that were dropped part-way.
#[derive(Default)]
struct InFlightDetector {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Detector for InFlightDetector {
    async fn detect(&self, _image: &RgbImage) -> Result<Vec<RawDetection>, VisionError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.current);
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(vec![RawDetection::new("person", 0.9, BBox::new(1, 1, 10, 10))])
    }
}

fn frame_request(uri: &str) -> Request<Body> {
    let mut png = Cursor::new(Vec::new());
    RgbImage::new(32, 24).write_to(&mut png, ImageFormat::Png).unwrap();

    let boundary = "concurrency-boundary";
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"mode\"\r\n\r\nsurveillance\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"f.png\"\r\n\
         Content-Type: image/png\r\n\r\n",
        b = boundary
    )
    .into_bytes();
    body.extend_from_slice(&png.into_inner());
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_two_live_requests_one_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let detector = Arc::new(SlowDetector { calls: AtomicUsize::new(0) });
    let registry = ModelRegistry::new().with_detector(Mode::Surveillance, "slow", detector.clone());
    let orchestrator =
        PipelineOrchestrator::new(Arc::new(registry), PipelineConfig::default(), FreeSpaceConfig::default());
    let store = LocalStore::open(dir.path()).await.unwrap();
    let state = ApiState::new(orchestrator, Arc::new(store), SightlineConfig::default());

    let first = tokio::spawn(create_router(state.clone()).oneshot(frame_request("/analyze-frame")));
    // let the first request take the gate
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = create_router(state.clone())
        .oneshot(frame_request("/process-frame"))
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    assert!(!state.gate.is_busy());
}

#[tokio::test]
async fn test_gate_under_contention() {
    let gate = AdmissionGate::new();
    let admitted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let mut handles = vec![];
    for _ in 0..16 {
        let gate = gate.clone();
        let admitted = admitted.clone();
        let rejected = rejected.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            match gate.try_acquire() {
                Ok(_permit) => {
                    admitted.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(VisionError::Busy) => {
                    rejected.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert_eq!(rejected.load(Ordering::SeqCst), 15);
    assert!(!gate.is_busy());
}

#[tokio::test]
async fn test_dropped_request_cancels_inference() {
    let dir = tempfile::tempdir().unwrap();
    let detector = Arc::new(InFlightDetector::default());
    let registry = ModelRegistry::new().with_detector(Mode::Surveillance, "in-flight", detector.clone());
    let orchestrator =
        PipelineOrchestrator::new(Arc::new(registry), PipelineConfig::default(), FreeSpaceConfig::default());
    let store = LocalStore::open(dir.path()).await.unwrap();
    let state = ApiState::new(orchestrator, Arc::new(store), SightlineConfig::default());

    // client gives up while the detector is still running
    let first = tokio::time::timeout(
        Duration::from_millis(50),
        create_router(state.clone()).oneshot(frame_request("/analyze-frame")),
    )
    .await;
    assert!(first.is_err());
    assert!(!state.gate.is_busy());
    assert_eq!(detector.current.load(Ordering::SeqCst), 0);

    let second = create_router(state.clone())
        .oneshot(frame_request("/analyze-frame"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(detector.peak.load(Ordering::SeqCst), 1);
}
