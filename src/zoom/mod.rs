mod actuator;
mod console;
mod face_loss;
mod mapper;

pub use actuator::{
    ActuationOutcome, Destination, DestinationKey, ZoomActuator, ZoomDriver, ZoomTarget,
    NEUTRAL_ZOOM,
};
pub use console::ConsoleDriver;
pub use face_loss::{FaceLossAction, FaceLossMonitor};
pub use mapper::{map_zoom, ZoomCurve};

#[cfg(test)]
pub(crate) use actuator::testing::RecordingDriver;
