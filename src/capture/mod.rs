mod host;
mod registry;
mod session;

#[cfg(test)]
mod tests;

pub use host::{CaptureHost, CaptureHostHandle};
pub use registry::{HostAcquisition, HostFactory, HostRegistry};
pub use session::{CaptureSession, SessionObserver, SessionState};
