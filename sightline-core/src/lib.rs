pub mod types;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use types::{
    BBox, Detection, Direction, Distance, Mode, Navigation, ParseModeError, PriorityLevel,
    RawDetection, SteeringInstruction, VerticalZone,
};
pub use config::{
    ConfigError, DetectorEndpoint, FreeSpaceConfig, ModelEndpoints, PerfConfig, PipelineConfig, ServerConfig,
    SightlineConfig, VideoConfig,
};
