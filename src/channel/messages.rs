use crate::analyzer::DistanceReading;
use crate::error::CameraFailure;
use serde::{Deserialize, Serialize};

/// Name of the long-lived port the capture host opens toward the controller
pub const KEEPALIVE_PORT: &str = "capture-keepalive";

/// Controller to capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerCommand {
    /// Begin acquisition and sampling. A streaming session whose readings
    /// carry another generation recalibrates under this one.
    StartCamera {
        #[serde(default)]
        generation: u64,
    },
    /// Stop sampling and release the camera
    StopCamera,
    /// Discard calibration and recapture the baseline under `generation`
    ResetBaseline {
        #[serde(default)]
        generation: u64,
    },
}

/// Capture session to controller, as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMessage {
    CameraReady,
    CameraError { error: CameraFailure },
    DistanceReading(DistanceReading),
    /// Liveness only; never reaches application handlers
    Heartbeat,
}

/// Application-level view of a session message, heartbeats already removed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    CameraReady,
    CameraError(CameraFailure),
    Reading(DistanceReading),
}

impl SessionMessage {
    /// Strip the control plane: `None` for heartbeats
    pub fn into_event(self) -> Option<SessionEvent> {
        match self {
            SessionMessage::CameraReady => Some(SessionEvent::CameraReady),
            SessionMessage::CameraError { error } => Some(SessionEvent::CameraError(error)),
            SessionMessage::DistanceReading(reading) => Some(SessionEvent::Reading(reading)),
            SessionMessage::Heartbeat => None,
        }
    }
}

impl From<SessionEvent> for SessionMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::CameraReady => SessionMessage::CameraReady,
            SessionEvent::CameraError(error) => SessionMessage::CameraError { error },
            SessionEvent::Reading(reading) => SessionMessage::DistanceReading(reading),
        }
    }
}
