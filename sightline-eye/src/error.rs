//! Error types for sightline-eye

use sightline_core::Error as CoreError;
use sightline_core::ParseModeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid mode: {0}")]
    InvalidMode(#[from] ParseModeError),

    #[error("Pipeline busy: a live frame is already being processed")]
    Busy,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Depth error: {0}")]
    Depth(String),

    #[error("Caption error: {0}")]
    Caption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Video error: {0}")]
    Video(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl VisionError {
    /// Malformed input: undecodable image or video, or an unknown mode.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VisionError::Decode(_)
                | VisionError::Video(_)
                | VisionError::InvalidMode(_)
        )
    }

    /// The admission gate rejected the request; the caller should retry later.
    pub fn is_overload(&self) -> bool {
        matches!(self, VisionError::Busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Decode("not an image".to_string());
        assert!(err.to_string().contains("Decode error"));
        assert!(err.to_string().contains("not an image"));
    }

    #[test]
    fn test_classification() {
        let invalid: VisionError = "flying".parse::<sightline_core::Mode>().unwrap_err().into();
        assert!(invalid.is_client_error());
        assert!(VisionError::Decode("x".into()).is_client_error());
        assert!(VisionError::Busy.is_overload());
        assert!(!VisionError::Busy.is_client_error());
        assert!(!VisionError::Model("down".into()).is_client_error());
        assert!(!VisionError::Storage("disk".into()).is_overload());
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let vision_err: VisionError = io_err.into();
        assert!(matches!(vision_err, VisionError::Io(_)));
    }
}
