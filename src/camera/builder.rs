use super::interface::CameraSource;
use super::mock::MockCamera;
use crate::error::{ProxZoomError, Result};
use std::sync::Arc;

/// Which camera implementation backs a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraBackend {
    /// Synthetic frames, no hardware
    Mock,
    /// V4L2 device through GStreamer
    #[cfg(all(feature = "camera", target_os = "linux"))]
    V4l2,
}

/// Builder for camera sources
pub struct CameraBuilder {
    backend: Option<CameraBackend>,
}

impl CameraBuilder {
    pub fn new() -> Self {
        Self { backend: None }
    }

    pub fn backend(mut self, backend: CameraBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<Arc<dyn CameraSource>> {
        let backend = self
            .backend
            .ok_or_else(|| ProxZoomError::system("Camera backend must be specified"))?;

        match backend {
            CameraBackend::Mock => Ok(Arc::new(MockCamera::new())),
            #[cfg(all(feature = "camera", target_os = "linux"))]
            CameraBackend::V4l2 => Ok(Arc::new(super::v4l2::GstCamera::new()?)),
        }
    }
}

impl Default for CameraBuilder {
    fn default() -> Self {
        Self::new()
    }
}
