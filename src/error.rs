use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxZoomError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Destination error: {0}")]
    Destination(#[from] DestinationError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },
}

impl ProxZoomError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxZoomError>;

/// Closed set of reasons a camera acquisition can fail with.
///
/// This is what travels over the channel in `CAMERA_ERROR` and what the
/// status surface keys its remediation on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFailure {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    UnsupportedConstraints,
    Unknown,
}

impl CameraFailure {
    /// Permission failures need the external consent flow before a retry can work
    pub fn requires_consent(&self) -> bool {
        matches!(self, CameraFailure::PermissionDenied)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraFailure::PermissionDenied => "permission_denied",
            CameraFailure::DeviceNotFound => "device_not_found",
            CameraFailure::DeviceBusy => "device_busy",
            CameraFailure::UnsupportedConstraints => "unsupported_constraints",
            CameraFailure::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CameraFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Permission denied opening camera device {device}")]
    PermissionDenied { device: u32 },

    #[error("Camera device {device} not found")]
    NotFound { device: u32 },

    #[error("Camera device {device} is busy: {details}")]
    Busy { device: u32, details: String },

    #[error("Camera cannot satisfy request {width}x{height}@{fps}fps")]
    UnsupportedConstraints { width: u32, height: u32, fps: u32 },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Camera capture stream error: {details}")]
    CaptureStream { details: String },
}

impl CameraError {
    /// Collapse the detailed error into the reason reported upstream
    pub fn reason(&self) -> CameraFailure {
        match self {
            CameraError::PermissionDenied { .. } => CameraFailure::PermissionDenied,
            CameraError::NotFound { .. } => CameraFailure::DeviceNotFound,
            CameraError::Busy { .. } => CameraFailure::DeviceBusy,
            CameraError::UnsupportedConstraints { .. } => CameraFailure::UnsupportedConstraints,
            CameraError::Configuration { .. } | CameraError::CaptureStream { .. } => {
                CameraFailure::Unknown
            }
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    #[error("Landmark model is not initialized")]
    NotInitialized,

    #[error("Landmark model failed to initialize: {details}")]
    Initialization { details: String },

    #[error("Landmark inference failed: {details}")]
    Detection { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Capture port did not connect within {timeout_ms}ms")]
    PortTimeout { timeout_ms: u64 },

    #[error("No capture port is connected")]
    NotConnected,

    #[error("Port '{name}' is disconnected")]
    Disconnected { name: String },

    #[error("No controller is listening for port '{name}'")]
    NoListener { name: String },

    #[error("Failed to encode channel message: {details}")]
    Encode { details: String },

    #[error("Failed to decode channel message: {details}")]
    Decode { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DestinationError {
    #[error("Destination {key} is unreachable: {reason}")]
    Unreachable { key: u64, reason: String },

    #[error("Destination {key} rejected zoom change: {details}")]
    Rejected { key: u64, details: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_reason_mapping() {
        assert_eq!(
            CameraError::PermissionDenied { device: 0 }.reason(),
            CameraFailure::PermissionDenied
        );
        assert_eq!(
            CameraError::NotFound { device: 2 }.reason(),
            CameraFailure::DeviceNotFound
        );
        assert_eq!(
            CameraError::CaptureStream {
                details: "eos".to_string()
            }
            .reason(),
            CameraFailure::Unknown
        );
    }

    #[test]
    fn test_only_permission_requires_consent() {
        assert!(CameraFailure::PermissionDenied.requires_consent());
        assert!(!CameraFailure::DeviceBusy.requires_consent());
        assert!(!CameraFailure::Unknown.requires_consent());
    }
}
