pub mod analyzer;
pub mod app;
pub mod camera;
pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod inference;
pub mod recovery;
pub mod settings;
pub mod zoom;

pub use analyzer::{CalibrationTracker, DistanceReading, EmaFilter, SignalExtractor};
pub use app::{
    KeyboardInputHandler, ProximityZoomOrchestrator, ProximityZoomOrchestratorBuilder,
    SessionStatus, ShutdownReason, StatusError,
};
pub use camera::{CameraBackend, CameraBuilder, CameraSource, CaptureRequest, MockCamera};
pub use capture::{CaptureHost, CaptureSession, HostRegistry, SessionState};
pub use channel::{ChannelSupervisor, ConnectionHub, ControllerCommand, SessionMessage};
pub use config::{FaceLossPolicy, ProxZoomConfig};
pub use error::{ProxZoomError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, ZoomEvent};
pub use frame::{FrameData, FrameFormat};
pub use inference::{LandmarkDetector, ScriptedDetector};
pub use recovery::{RecoveryConfig, RecoveryManager};
pub use settings::{Settings, SettingsHandle, SettingsStore};
pub use zoom::{
    map_zoom, ConsoleDriver, Destination, DestinationKey, ZoomActuator, ZoomCurve, ZoomDriver,
};
