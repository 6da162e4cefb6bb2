use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fixed acquisition request sent to the camera on start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub max_fps: u32,
}

impl CaptureRequest {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            device_index: config.index,
            width: config.resolution.0,
            height: config.resolution.1,
            max_fps: config.fps,
        }
    }
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            max_fps: 30,
        }
    }
}

/// Camera resource owned exclusively by the capture session.
///
/// Implementations keep only the most recent frame; the sampling loop
/// pulls it at its own cadence.
#[async_trait]
pub trait CameraSource: Send + Sync {
    /// Open the device and start producing frames
    async fn acquire(&self, request: &CaptureRequest) -> Result<(), CameraError>;

    /// Stop producing frames and close the device. Safe to call when not acquired.
    async fn release(&self);

    fn is_acquired(&self) -> bool;

    /// Most recent frame, `None` until the first frame arrives
    fn latest_frame(&self) -> Option<FrameData>;
}
