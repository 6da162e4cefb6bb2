//! Distance-signal pipeline: landmarks to spread, spread to ratio, ratio to smoothed ratio.

mod calibration;
mod signal;
mod smoothing;

pub use calibration::{CalibrationState, CalibrationStep, CalibrationTracker};
pub use signal::SignalExtractor;
pub use smoothing::EmaFilter;

use serde::{Deserialize, Serialize};

/// One post-calibration sample as reported by the capture session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceReading {
    pub spread: f64,
    pub baseline: f64,
    pub ratio: f64,
    /// Calibration generation the baseline belongs to, as set by the controller
    #[serde(default)]
    pub generation: u64,
}
