//! Inference collaborators and the registry that selects them per mode
//!
//! Detection, depth estimation and captioning run outside this crate. Each is reached through
//! an async trait so the pipeline can launch them concurrently and tests can substitute fakes.

pub mod registry;

use crate::depth::DepthField;
use crate::error::VisionError;
use async_trait::async_trait;
use image::RgbImage;
use sightline_core::RawDetection;

pub use registry::{ModelRegistry, RegisteredDetector};

/// Object detector. An unavailable model should yield an empty list rather than an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<RawDetection>, VisionError>;
}

/// Monocular depth estimator returning raw scores at the input resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepthEstimator: Send + Sync {
    async fn estimate(&self, image: &RgbImage) -> Result<DepthField, VisionError>;
}

/// Short natural-language caption generator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, image: &RgbImage) -> Result<String, VisionError>;
}
