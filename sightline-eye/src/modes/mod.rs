//! Mode-specific response builders over one [`PipelineResult`](crate::pipeline::PipelineResult)

pub mod assistive;
pub mod self_driving;
pub mod surveillance;

use crate::pipeline::PipelineResult;
use crate::storage::RecordStore;
use image::RgbImage;
use serde::Serialize;
use sightline_core::{FreeSpaceConfig, Mode};
use std::sync::Arc;

pub use assistive::AssistiveResponse;
pub use self_driving::SelfDrivingResponse;
pub use surveillance::SurveillanceResponse;

/// Output of exactly one mode handler.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ModeResponse {
    Surveillance(SurveillanceResponse),
    Assistive(AssistiveResponse),
    SelfDriving(SelfDrivingResponse),
}

impl ModeResponse {
    pub fn mode(&self) -> Mode {
        match self {
            ModeResponse::Surveillance(_) => Mode::Surveillance,
            ModeResponse::Assistive(_) => Mode::Assistive,
            ModeResponse::SelfDriving(_) => Mode::SelfDriving,
        }
    }
}

/// Routes a pipeline result to the handler for its mode.
#[derive(Clone)]
pub struct ModeDispatcher {
    store: Option<Arc<dyn RecordStore>>,
    free_space: FreeSpaceConfig,
}

impl ModeDispatcher {
    /// `store` is only used by surveillance. Without one, surveillance reports `stored: false`.
    pub fn new(store: Option<Arc<dyn RecordStore>>, free_space: FreeSpaceConfig) -> Self {
        Self { store, free_space }
    }

    pub async fn dispatch(&self, mode: Mode, result: &PipelineResult, raw_frame: Option<&RgbImage>) -> ModeResponse {
        match mode {
            Mode::Surveillance => ModeResponse::Surveillance(
                surveillance::handle(result, raw_frame, self.store.as_deref()).await,
            ),
            Mode::Assistive => ModeResponse::Assistive(assistive::handle(result)),
            Mode::SelfDriving => ModeResponse::SelfDriving(self_driving::handle(result, &self.free_space)),
        }
    }
}
