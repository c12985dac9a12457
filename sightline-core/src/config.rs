// Configuration for the sightline pipeline and server

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Frame-size budgets and per-request pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest edge for live frames
    pub live_max_edge: u32,
    /// Longest edge for uploaded images
    pub upload_max_edge: u32,
    /// Longest edge for depth-only requests
    pub depth_max_edge: u32,
    /// Render a colorized depth preview whenever depth succeeds
    pub render_depth_preview: bool,
    /// Optional per-call limit for detector/depth/caption collaborators
    pub collaborator_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            live_max_edge: 640,
            upload_max_edge: 800,
            depth_max_edge: 512,
            render_depth_preview: true,
            collaborator_timeout_ms: None,
        }
    }
}

/// Free-space segmentation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeSpaceConfig {
    /// Normalized depth below this is treated as walkable/drivable
    pub threshold: f32,
    /// Radius of the opening structuring element (3 gives a 7x7 disc)
    pub opening_radius: u8,
    /// Horizontal extent of the centre-bottom patch, as fractions of the lower-half width
    pub center_x_range: (f32, f32),
    /// Vertical start of the centre-bottom patch, as a fraction of the lower-half height
    pub center_y_start: f32,
    /// Patch coverage above which the centre counts as clear
    pub center_coverage_min: f32,
    /// Minimum side coverage required before steering toward that side
    pub side_clear_min: f32,
}

impl Default for FreeSpaceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.40,
            opening_radius: 3,
            center_x_range: (0.4, 0.6),
            center_y_start: 0.85,
            center_coverage_min: 0.5,
            side_clear_min: 0.15,
        }
    }
}

/// Video sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub sample_interval_secs: f64,
    pub max_samples: usize,
    pub max_edge: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 5.0,
            max_samples: 20,
            max_edge: 640,
        }
    }
}

/// Rolling performance tracker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfConfig {
    pub window: usize,
    pub log_every: usize,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            window: 30,
            log_every: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Saved surveillance frames and the record log live here
    pub upload_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            upload_dir: "uploads".to_string(),
        }
    }
}

/// A remote detector and the label reported for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorEndpoint {
    pub url: String,
    pub label: String,
}

/// HTTP endpoints of the inference collaborators. Anything left unset is treated as unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEndpoints {
    pub surveillance_detector: Option<DetectorEndpoint>,
    pub assistive_detector: Option<DetectorEndpoint>,
    pub self_driving_detector: Option<DetectorEndpoint>,
    pub depth: Option<String>,
    pub caption: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ModelEndpoints {
    fn default() -> Self {
        Self {
            surveillance_detector: None,
            assistive_detector: None,
            self_driving_detector: None,
            depth: None,
            caption: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SightlineConfig {
    pub log_level: String,
    pub pipeline: PipelineConfig,
    pub free_space: FreeSpaceConfig,
    pub video: VideoConfig,
    pub perf: PerfConfig,
    pub server: ServerConfig,
    pub models: ModelEndpoints,
}

impl Default for SightlineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pipeline: PipelineConfig::default(),
            free_space: FreeSpaceConfig::default(),
            video: VideoConfig::default(),
            perf: PerfConfig::default(),
            server: ServerConfig::default(),
            models: ModelEndpoints::default(),
        }
    }
}

impl SightlineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `SIGHTLINE_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("SIGHTLINE_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.server.port = p;
            }
        }

        if let Ok(host) = std::env::var("SIGHTLINE_HOST") {
            self.server.host = host;
        }

        if let Ok(dir) = std::env::var("SIGHTLINE_UPLOAD_DIR") {
            self.server.upload_dir = dir;
        }

        if let Ok(level) = std::env::var("SIGHTLINE_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        for (name, edge) in [
            ("pipeline.live_max_edge", p.live_max_edge),
            ("pipeline.upload_max_edge", p.upload_max_edge),
            ("pipeline.depth_max_edge", p.depth_max_edge),
            ("video.max_edge", self.video.max_edge),
        ] {
            if edge == 0 || edge > 8192 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be between 1 and 8192",
                    name
                )));
            }
        }

        let fs = &self.free_space;
        if !(0.0..=1.0).contains(&fs.threshold) {
            return Err(ConfigError::ValidationError(
                "free_space.threshold must be within [0, 1]".to_string(),
            ));
        }
        let (cx0, cx1) = fs.center_x_range;
        if !(0.0..=1.0).contains(&cx0) || !(0.0..=1.0).contains(&cx1) || cx0 >= cx1 {
            return Err(ConfigError::ValidationError(
                "free_space.center_x_range must be an increasing pair within [0, 1]".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&fs.center_y_start) {
            return Err(ConfigError::ValidationError(
                "free_space.center_y_start must be within [0, 1)".to_string(),
            ));
        }

        if self.video.sample_interval_secs.is_nan() || self.video.sample_interval_secs <= 0.0 {
            return Err(ConfigError::ValidationError(
                "video.sample_interval_secs must be > 0".to_string(),
            ));
        }
        if self.video.max_samples == 0 {
            return Err(ConfigError::ValidationError(
                "video.max_samples must be > 0".to_string(),
            ));
        }

        if self.perf.window < 2 {
            return Err(ConfigError::ValidationError(
                "perf.window must be at least 2".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = SightlineConfig::default();
        assert_eq!(config.pipeline.live_max_edge, 640);
        assert_eq!(config.pipeline.upload_max_edge, 800);
        assert_eq!(config.pipeline.depth_max_edge, 512);
        assert!((config.free_space.threshold - 0.40).abs() < f32::EPSILON);
        assert_eq!(config.video.max_samples, 20);
        assert_eq!(config.perf.window, 30);
        assert!(config.models.depth.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SightlineConfig::from_toml_str(
            r#"
            [server]
            port = 9100

            [models.self_driving_detector]
            url = "http://localhost:9000/detect"
            label = "kitti"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.models.self_driving_detector.unwrap().label, "kitti");
        assert_eq!(config.video.sample_interval_secs, 5.0);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"\n[video]\nmax_samples = 5").unwrap();
        let config = SightlineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.video.max_samples, 5);
    }

    #[test]
    fn test_from_file_missing() {
        let err = SightlineConfig::from_file("/nonexistent/sightline.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let err = SightlineConfig::from_toml_str("server = [").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = SightlineConfig::default();
        config.pipeline.live_max_edge = 0;
        assert!(config.validate().is_err());

        let mut config = SightlineConfig::default();
        config.free_space.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = SightlineConfig::default();
        config.free_space.center_x_range = (0.6, 0.4);
        assert!(config.validate().is_err());

        let mut config = SightlineConfig::default();
        config.video.sample_interval_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = SightlineConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
