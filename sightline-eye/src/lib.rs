//! sightline-eye: perception fusion for surveillance, assistive and self-driving use
//!
//! Turns one image into mode-appropriate output. Detection, depth estimation and captioning
//! are injected collaborators; this crate fuses their output into spatially annotated
//! detections, a free-space navigation decision and short spoken-style descriptions.
//!
//! The HTTP surface lives in sightline-server.

pub mod admission;
pub mod depth;
pub mod error;
pub mod frame;
pub mod free_space;
pub mod models;
pub mod modes;
pub mod narration;
pub mod navigation;
pub mod perf;
pub mod pipeline;
pub mod priority;
pub mod spatial;
pub mod storage;
pub mod video;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use error::VisionError;
pub use frame::{encode_jpeg, prepare_frame, prepare_frame_blocking, PreparedFrame, JPEG_QUALITY};
pub use models::{Captioner, DepthEstimator, Detector, ModelRegistry};
pub use modes::{ModeDispatcher, ModeResponse};
pub use navigation::NavigationVector;
pub use perf::{PerfSnapshot, PerfTracker};
pub use pipeline::{PipelineOrchestrator, PipelineResult};
pub use storage::{ObservedObject, RecordStore, StoredRecord, SurveillanceRecord};
pub use video::{EncodedFrames, FrameSequence, VideoReport, VideoSampler, VideoSource};
