//! Per-frame pipeline orchestration
//!
//! One pass per request: optional depth estimation first, then detection-with-fusion,
//! free-space segmentation and captioning launched concurrently and joined once. A failing
//! branch degrades to its default value and never aborts the others.

use crate::depth::{depth_to_base64, encode_png_base64, ensure_shape, normalize_depth, DepthField};
use crate::error::VisionError;
use crate::free_space::{detect_free_space, Clearance, FreeSpaceResult};
use crate::models::ModelRegistry;
use crate::narration::generate_scene_description;
use crate::spatial::fuse_detections;
use image::RgbImage;
use metrics::counter;
use serde::Serialize;
use sightline_core::{Detection, FreeSpaceConfig, Mode, Navigation, PipelineConfig};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything one frame produced. Consumed by exactly one mode dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub mode: Mode,
    /// Label of the detector that served the request
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
    pub navigation: Navigation,
    pub safe_ratio: f32,
    pub scene_description: String,
    pub caption: String,
    /// Colorized depth preview, base64 PNG
    pub depth_map: Option<String>,
    /// Free-space overlay, base64 PNG
    pub free_mask: Option<String>,
    /// Stage name to wall-clock milliseconds
    pub timing: BTreeMap<String, f64>,
    #[serde(skip)]
    pub clearance: Option<Clearance>,
}

impl PipelineResult {
    pub fn urgent_count(&self) -> usize {
        self.detections.iter().filter(|d| d.urgency).count()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0 * 10.0).round() / 10.0
}

async fn bounded<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, VisionError>>,
) -> Result<T, VisionError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| VisionError::Timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}

async fn join_optional<T>(handle: Option<JoinHandle<T>>) -> Option<Result<T, tokio::task::JoinError>> {
    match handle {
        Some(handle) => Some(handle.await),
        None => None,
    }
}

fn branch_failed(branch: &'static str, err: &dyn std::fmt::Display) {
    warn!("{} branch failed: {}", branch, err);
    counter!("sightline_branch_failures_total", "branch" => branch).increment(1);
}

/// Runs the per-frame pipeline against an injected [`ModelRegistry`].
#[derive(Clone)]
pub struct PipelineOrchestrator {
    registry: Arc<ModelRegistry>,
    pipeline: PipelineConfig,
    free_space: FreeSpaceConfig,
}

impl PipelineOrchestrator {
    pub fn new(registry: Arc<ModelRegistry>, pipeline: PipelineConfig, free_space: FreeSpaceConfig) -> Self {
        Self {
            registry,
            pipeline,
            free_space,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.pipeline
    }

    fn timeout(&self) -> Option<Duration> {
        self.pipeline.collaborator_timeout_ms.map(Duration::from_millis)
    }

    /// Validate `mode` before touching any collaborator, then run the pipeline.
    pub async fn run(
        &self,
        image: Arc<RgbImage>,
        mode: &str,
        want_caption: bool,
        is_live: bool,
    ) -> Result<PipelineResult, VisionError> {
        let mode: Mode = mode.parse()?;
        Ok(self.run_pipeline(image, mode, want_caption, is_live).await)
    }

    /// Raw depth, shape-checked and normalized, plus the optional preview.
    async fn estimate_depth(&self, image: &Arc<RgbImage>) -> Result<(Arc<DepthField>, Option<String>), VisionError> {
        let estimator = self
            .registry
            .depth()
            .ok_or_else(|| VisionError::Depth("no depth estimator registered".to_string()))?;
        let raw = bounded(self.timeout(), estimator.estimate(image)).await?;
        ensure_shape(&raw, image.width(), image.height())?;

        let render = self.pipeline.render_depth_preview;
        tokio::task::spawn_blocking(move || {
            let norm = normalize_depth(&raw);
            let preview = if render {
                match depth_to_base64(&norm) {
                    Ok(b64) => Some(b64),
                    Err(e) => {
                        warn!("Depth preview encoding failed: {}", e);
                        None
                    }
                }
            } else {
                None
            };
            (Arc::new(norm), preview)
        })
        .await
        .map_err(|e| VisionError::Depth(format!("normalization task failed: {}", e)))
    }

    /// Depth preview only, for depth inspection requests.
    pub async fn depth_preview(&self, image: Arc<RgbImage>) -> Result<String, VisionError> {
        let estimator = self
            .registry
            .depth()
            .ok_or_else(|| VisionError::Depth("no depth estimator registered".to_string()))?;
        let raw = bounded(self.timeout(), estimator.estimate(&image)).await?;
        tokio::task::spawn_blocking(move || depth_to_base64(&normalize_depth(&raw)))
            .await
            .map_err(|e| VisionError::Depth(format!("preview task failed: {}", e)))?
    }

    /// Run every stage `mode` calls for on one frame.
    ///
    /// `is_live` suppresses the free-space overlay. Never fails: collaborator problems surface
    /// as empty detections, unknown navigation or an empty caption.
    pub async fn run_pipeline(
        &self,
        image: Arc<RgbImage>,
        mode: Mode,
        want_caption: bool,
        is_live: bool,
    ) -> PipelineResult {
        let started = Instant::now();
        let (width, height) = image.dimensions();
        let mut timing = BTreeMap::new();
        let model = self.registry.model_label(mode).to_string();

        let mut depth: Option<Arc<DepthField>> = None;
        let mut depth_map = None;
        if mode.runs_depth() {
            let t = Instant::now();
            match self.estimate_depth(&image).await {
                Ok((norm, preview)) => {
                    depth = Some(norm);
                    depth_map = preview;
                }
                Err(e) => branch_failed("depth", &e),
            }
            timing.insert("depth_ms".to_string(), elapsed_ms(t));
        }

        let detector = self.registry.detector_for(mode).map(|d| d.detector.clone());
        let limit = self.timeout();
        let detection = async {
            let t = Instant::now();
            let raw = match detector {
                Some(detector) => match bounded(limit, detector.detect(&image)).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        branch_failed("detection", &e);
                        Vec::new()
                    }
                },
                None => {
                    debug!("No detector registered for {}", mode);
                    Vec::new()
                }
            };
            let detections = fuse_detections(raw, depth.as_deref(), width, height, mode);
            (detections, elapsed_ms(t))
        };

        let free_space = depth.clone().map(|depth| {
            let config = self.free_space.clone();
            let render = !is_live;
            tokio::task::spawn_blocking(move || {
                let t = Instant::now();
                let mut result = detect_free_space(&depth, &config, render);
                let overlay = result.overlay.take().and_then(|img| match encode_png_base64(&img) {
                    Ok(b64) => Some(b64),
                    Err(e) => {
                        warn!("Free-space overlay encoding failed: {}", e);
                        None
                    }
                });
                (result, overlay, elapsed_ms(t))
            })
        });

        // Inference branches stay in this future: dropping the request cancels them.
        let captioner = self.registry.captioner().filter(|_| want_caption);
        let caption = async {
            let captioner = captioner?;
            let t = Instant::now();
            let text = match bounded(limit, captioner.caption(&image)).await {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    branch_failed("caption", &e);
                    String::new()
                }
            };
            Some((text, elapsed_ms(t)))
        };

        let ((detections, detection_ms), free_space, caption) =
            tokio::join!(detection, join_optional(free_space), caption);
        timing.insert("detection_ms".to_string(), detection_ms);

        let (free_space, free_mask) = match free_space {
            Some(Ok((result, overlay, ms))) => {
                timing.insert("free_space_ms".to_string(), ms);
                (result, overlay)
            }
            Some(Err(e)) => {
                branch_failed("free_space", &e);
                (FreeSpaceResult::unknown(), None)
            }
            None => (FreeSpaceResult::unknown(), None),
        };

        let caption = match caption {
            Some((text, ms)) => {
                timing.insert("caption_ms".to_string(), ms);
                text
            }
            None => String::new(),
        };

        let t = Instant::now();
        let scene_description = generate_scene_description(&detections, free_space.navigation, &caption);
        timing.insert("description_ms".to_string(), elapsed_ms(t));
        timing.insert("total_ms".to_string(), elapsed_ms(started));

        counter!("sightline_pipeline_runs_total", "mode" => mode.as_str()).increment(1);
        info!(
            "Pipeline [{}|{}] {}x{}: {} detections, {} ({:.1} ms)",
            mode,
            model,
            width,
            height,
            detections.len(),
            free_space.navigation,
            timing.get("total_ms").copied().unwrap_or_default()
        );

        PipelineResult {
            mode,
            model,
            width,
            height,
            detections,
            navigation: free_space.navigation,
            safe_ratio: free_space.safe_ratio,
            scene_description,
            caption,
            depth_map,
            free_mask,
            timing,
            clearance: free_space.clearance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MockCaptioner, MockDepthEstimator, MockDetector};
    use sightline_core::{BBox, Distance, RawDetection};

    fn image() -> Arc<RgbImage> {
        Arc::new(RgbImage::new(90, 60))
    }

    fn person_detector() -> MockDetector {
        let mut detector = MockDetector::new();
        detector
            .expect_detect()
            .returning(|_| Ok(vec![RawDetection::new("person", 0.9, BBox::new(35, 30, 55, 59))]));
        detector
    }

    fn orchestrator(registry: ModelRegistry) -> PipelineOrchestrator {
        PipelineOrchestrator::new(Arc::new(registry), PipelineConfig::default(), FreeSpaceConfig::default())
    }

    #[tokio::test]
    async fn test_surveillance_skips_depth() {
        let mut depth = MockDepthEstimator::new();
        depth.expect_estimate().times(0);
        let mut captioner = MockCaptioner::new();
        captioner.expect_caption().times(1).returning(|_| Ok("a quiet lobby".to_string()));

        let registry = ModelRegistry::new()
            .with_detector(Mode::Surveillance, "coco", Arc::new(person_detector()))
            .with_depth(Arc::new(depth))
            .with_captioner(Arc::new(captioner));

        let result = orchestrator(registry).run_pipeline(image(), Mode::Surveillance, true, false).await;
        assert_eq!(result.model, "coco");
        assert_eq!(result.navigation, Navigation::Unknown);
        assert_eq!(result.safe_ratio, 0.0);
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].distance, Distance::Unknown);
        assert_eq!(result.caption, "a quiet lobby");
        assert!(result.scene_description.starts_with("A quiet lobby."));
        assert!(!result.timing.contains_key("depth_ms"));
        assert!(result.timing.contains_key("caption_ms"));
        assert!(result.timing.contains_key("total_ms"));
    }

    #[tokio::test]
    async fn test_assistive_fuses_depth() {
        let mut depth = MockDepthEstimator::new();
        // Far everywhere except the person's box.
        depth.expect_estimate().returning(|img| {
            Ok(DepthField::from_shape_fn((img.height() as usize, img.width() as usize), |(r, c)| {
                if (30..59).contains(&r) && (35..55).contains(&c) { 10.0 } else { 0.0 }
            }))
        });

        let registry = ModelRegistry::new()
            .with_detector(Mode::Assistive, "coco", Arc::new(person_detector()))
            .with_depth(Arc::new(depth));

        let result = orchestrator(registry).run_pipeline(image(), Mode::Assistive, false, false).await;
        assert_eq!(result.detections[0].distance, Distance::VeryClose);
        assert!(result.detections[0].urgency);
        assert_eq!(result.urgent_count(), 1);
        assert!(result.depth_map.is_some());
        assert!(result.free_mask.is_some());
        assert!(result.clearance.is_some());
        assert_ne!(result.navigation, Navigation::Unknown);
        assert!(result.caption.is_empty());
        assert!(!result.timing.contains_key("caption_ms"));
    }

    #[tokio::test]
    async fn test_live_suppresses_overlay() {
        let mut depth = MockDepthEstimator::new();
        depth
            .expect_estimate()
            .returning(|img| Ok(DepthField::zeros((img.height() as usize, img.width() as usize))));
        let registry = ModelRegistry::new().with_depth(Arc::new(depth));

        let result = orchestrator(registry).run_pipeline(image(), Mode::SelfDriving, false, true).await;
        assert!(result.free_mask.is_none());
        assert_eq!(result.navigation, Navigation::MoveForward);
        assert!(result.detections.is_empty());
        assert_eq!(result.model, "none");
    }

    #[tokio::test]
    async fn test_branch_failures_degrade() {
        let mut detector = MockDetector::new();
        detector
            .expect_detect()
            .returning(|_| Err(VisionError::Model("weights missing".to_string())));
        let mut depth = MockDepthEstimator::new();
        depth
            .expect_estimate()
            .returning(|_| Err(VisionError::Depth("out of memory".to_string())));
        let mut captioner = MockCaptioner::new();
        captioner
            .expect_caption()
            .returning(|_| Err(VisionError::Caption("offline".to_string())));

        let registry = ModelRegistry::new()
            .with_detector(Mode::Assistive, "coco", Arc::new(detector))
            .with_depth(Arc::new(depth))
            .with_captioner(Arc::new(captioner));

        let result = orchestrator(registry).run_pipeline(image(), Mode::Assistive, true, false).await;
        assert!(result.detections.is_empty());
        assert_eq!(result.navigation, Navigation::Unknown);
        assert!(result.caption.is_empty());
        assert!(result.depth_map.is_none());
        assert_eq!(
            result.scene_description,
            "No significant objects detected. The scene appears clear."
        );
    }

    #[tokio::test]
    async fn test_mismatched_depth_shape_is_a_depth_failure() {
        let mut depth = MockDepthEstimator::new();
        depth.expect_estimate().returning(|_| Ok(DepthField::zeros((3, 3))));
        let registry = ModelRegistry::new().with_depth(Arc::new(depth));
        let result = orchestrator(registry).run_pipeline(image(), Mode::Assistive, false, false).await;
        assert_eq!(result.navigation, Navigation::Unknown);
        assert!(result.clearance.is_none());
    }

    #[tokio::test]
    async fn test_invalid_mode_rejected_before_work() {
        let mut detector = MockDetector::new();
        detector.expect_detect().times(0);
        let registry = ModelRegistry::new().with_detector(Mode::Surveillance, "coco", Arc::new(detector));
        let err = orchestrator(registry).run(image(), "parking", false, false).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_collaborator_timeout() {
        struct SlowCaptioner;
        #[async_trait::async_trait]
        impl crate::models::Captioner for SlowCaptioner {
            async fn caption(&self, _image: &RgbImage) -> Result<String, VisionError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("too late".to_string())
            }
        }

        let registry = ModelRegistry::new().with_captioner(Arc::new(SlowCaptioner));
        let config = PipelineConfig {
            collaborator_timeout_ms: Some(20),
            ..PipelineConfig::default()
        };
        let orchestrator = PipelineOrchestrator::new(Arc::new(registry), config, FreeSpaceConfig::default());
        let result = orchestrator.run_pipeline(image(), Mode::Surveillance, true, false).await;
        assert!(result.caption.is_empty());
    }
}
