mod builder;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod v4l2;
mod interface;
mod mock;
#[cfg(test)]
mod tests;

pub use builder::{CameraBackend, CameraBuilder};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use v4l2::GstCamera;
pub use interface::{CameraSource, CaptureRequest};
pub use mock::MockCamera;
