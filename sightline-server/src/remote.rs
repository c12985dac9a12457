//! HTTP-backed inference collaborators
//!
//! Each collaborator POSTs the frame as a JPEG body and reads a small JSON reply:
//! - detector: `{"detections": [{"label", "confidence", "bbox": [x1, y1, x2, y2]}]}`
//! - depth: `{"width", "height", "data": [row-major f32]}`
//! - caption: `{"caption": "..."}`

use async_trait::async_trait;
use image::RgbImage;
use reqwest::Client;
use serde::Deserialize;
use sightline_core::{ModelEndpoints, Mode, RawDetection};
use sightline_eye::depth::DepthField;
use sightline_eye::{encode_jpeg, Captioner, DepthEstimator, Detector, ModelRegistry, VisionError, JPEG_QUALITY};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

async fn post_frame<T: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    image: &RgbImage,
) -> Result<T, String> {
    let body = encode_jpeg(image, JPEG_QUALITY).map_err(|e| e.to_string())?;
    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
        .body(body)
        .send()
        .await
        .map_err(|e| format!("request to {} failed: {}", url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("{} returned {}", url, status));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| format!("invalid reply from {}: {}", url, e))
}

#[derive(Deserialize)]
struct DetectReply {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Deserialize)]
struct DepthReply {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

#[derive(Deserialize)]
struct CaptionReply {
    #[serde(default)]
    caption: String,
}

pub struct RemoteDetector {
    client: Client,
    url: String,
}

impl RemoteDetector {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<RawDetection>, VisionError> {
        let reply: DetectReply = post_frame(&self.client, &self.url, image)
            .await
            .map_err(VisionError::Model)?;
        debug!("{} returned {} detections", self.url, reply.detections.len());
        Ok(reply.detections)
    }
}

pub struct RemoteDepthEstimator {
    client: Client,
    url: String,
}

impl RemoteDepthEstimator {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl DepthEstimator for RemoteDepthEstimator {
    async fn estimate(&self, image: &RgbImage) -> Result<DepthField, VisionError> {
        let reply: DepthReply = post_frame(&self.client, &self.url, image)
            .await
            .map_err(VisionError::Depth)?;
        DepthField::from_shape_vec((reply.height, reply.width), reply.data)
            .map_err(|e| VisionError::Depth(format!("malformed depth grid: {}", e)))
    }
}

pub struct RemoteCaptioner {
    client: Client,
    url: String,
}

impl RemoteCaptioner {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Captioner for RemoteCaptioner {
    async fn caption(&self, image: &RgbImage) -> Result<String, VisionError> {
        let reply: CaptionReply = post_frame(&self.client, &self.url, image)
            .await
            .map_err(VisionError::Caption)?;
        Ok(reply.caption)
    }
}

/// Build the registry from configured endpoints. Unconfigured collaborators stay absent.
pub fn build_registry(models: &ModelEndpoints) -> Result<ModelRegistry, reqwest::Error> {
    let client = Client::builder()
        .timeout(Duration::from_millis(models.request_timeout_ms))
        .build()?;

    let mut registry = ModelRegistry::new();
    let detectors = [
        (Mode::Surveillance, &models.surveillance_detector),
        (Mode::Assistive, &models.assistive_detector),
        (Mode::SelfDriving, &models.self_driving_detector),
    ];
    for (mode, endpoint) in detectors {
        if let Some(endpoint) = endpoint {
            info!("Detector for {}: {} ({})", mode, endpoint.label, endpoint.url);
            registry = registry.with_detector(
                mode,
                endpoint.label.clone(),
                Arc::new(RemoteDetector::new(client.clone(), endpoint.url.clone())),
            );
        }
    }
    if let Some(url) = &models.depth {
        info!("Depth estimator: {}", url);
        registry = registry.with_depth(Arc::new(RemoteDepthEstimator::new(client.clone(), url.clone())));
    }
    if let Some(url) = &models.caption {
        info!("Captioner: {}", url);
        registry = registry.with_captioner(Arc::new(RemoteCaptioner::new(client, url.clone())));
    }
    Ok(registry)
}
