pub mod keyboard_input;

mod lifecycle;
mod orchestrator;
mod readings;
mod runtime;
mod status;
mod types;

#[cfg(test)]
mod tests;

pub use keyboard_input::KeyboardInputHandler;
pub use orchestrator::{ProximityZoomOrchestrator, ProximityZoomOrchestratorBuilder};
pub use status::{SessionStatus, StatusError, StatusStore};
pub use types::ShutdownReason;
