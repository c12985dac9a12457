//! Read-only mapping from mode to detector, plus the shared depth and caption models

use super::{Captioner, DepthEstimator, Detector};
use sightline_core::Mode;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A detector together with the label reported for it (e.g. which weights it runs).
#[derive(Clone)]
pub struct RegisteredDetector {
    pub label: String,
    pub detector: Arc<dyn Detector>,
}

impl std::fmt::Debug for RegisteredDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredDetector").field("label", &self.label).finish()
    }
}

/// Collaborators available to the pipeline. Built once at startup and never mutated.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    detectors: HashMap<Mode, RegisteredDetector>,
    depth: Option<Arc<dyn DepthEstimator>>,
    captioner: Option<Arc<dyn Captioner>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(mut self, mode: Mode, label: impl Into<String>, detector: Arc<dyn Detector>) -> Self {
        let label = label.into();
        info!("Registered detector '{}' for {}", label, mode);
        self.detectors.insert(mode, RegisteredDetector { label, detector });
        self
    }

    pub fn with_depth(mut self, estimator: Arc<dyn DepthEstimator>) -> Self {
        self.depth = Some(estimator);
        self
    }

    pub fn with_captioner(mut self, captioner: Arc<dyn Captioner>) -> Self {
        self.captioner = Some(captioner);
        self
    }

    /// Detector for `mode`, falling back to the surveillance detector and then to any
    /// registered detector (in mode order).
    pub fn detector_for(&self, mode: Mode) -> Option<&RegisteredDetector> {
        self.detectors
            .get(&mode)
            .or_else(|| self.detectors.get(&Mode::Surveillance))
            .or_else(|| Mode::ALL.iter().find_map(|m| self.detectors.get(m)))
    }

    /// Label of the detector that would serve `mode`, or `"none"`.
    pub fn model_label(&self, mode: Mode) -> &str {
        self.detector_for(mode).map(|d| d.label.as_str()).unwrap_or("none")
    }

    pub fn depth(&self) -> Option<&Arc<dyn DepthEstimator>> {
        self.depth.as_ref()
    }

    pub fn captioner(&self) -> Option<&Arc<dyn Captioner>> {
        self.captioner.as_ref()
    }

    /// `(mode, label)` for every directly registered detector, in mode order.
    pub fn loaded_detectors(&self) -> Vec<(Mode, String)> {
        Mode::ALL
            .iter()
            .filter_map(|m| self.detectors.get(m).map(|d| (*m, d.label.clone())))
            .collect()
    }
}
