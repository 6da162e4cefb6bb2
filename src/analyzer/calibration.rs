use super::DistanceReading;
use tracing::{debug, info, warn};

/// Baselines at or below this are degenerate and never accepted
const MIN_BASELINE: f64 = 1e-6;

/// Snapshot of the tracker: pending window and resolved baseline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationState {
    pub pending: Vec<f64>,
    pub baseline: Option<f64>,
}

/// What a single observed spread did to the calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStep {
    /// Sample stored, window not yet full
    Accumulating { collected: usize, window: usize },
    /// Sample completed the window and fixed the baseline
    Established { baseline: f64 },
    /// Baseline already fixed; ratio computed against it
    Reading(DistanceReading),
    /// Sample was unusable (zero, negative or non-finite) and ignored
    Rejected,
}

/// Establishes the reference spread from the first N valid samples.
///
/// The baseline is the mean of the window and stays fixed until `reset`.
#[derive(Debug, Clone)]
pub struct CalibrationTracker {
    window: usize,
    generation: u64,
    state: CalibrationState,
}

impl CalibrationTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            generation: 0,
            state: CalibrationState {
                pending: Vec::with_capacity(window),
                baseline: None,
            },
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn baseline(&self) -> Option<f64> {
        self.state.baseline
    }

    /// Generation stamped on every reading
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.baseline.is_some()
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Feed one valid spread
    pub fn observe(&mut self, spread: f64) -> CalibrationStep {
        if !spread.is_finite() || spread <= 0.0 {
            debug!("Ignoring degenerate spread {}", spread);
            return CalibrationStep::Rejected;
        }

        if let Some(baseline) = self.state.baseline {
            return CalibrationStep::Reading(DistanceReading {
                spread,
                baseline,
                ratio: spread / baseline,
                generation: self.generation,
            });
        }

        self.state.pending.push(spread);
        let collected = self.state.pending.len();
        if collected < self.window {
            debug!("Calibration sample {}/{}: {:.4}", collected, self.window, spread);
            return CalibrationStep::Accumulating {
                collected,
                window: self.window,
            };
        }

        let baseline = self.state.pending.iter().sum::<f64>() / collected as f64;
        self.state.pending.clear();

        if baseline <= MIN_BASELINE || !baseline.is_finite() {
            warn!(
                "Discarding degenerate baseline {} and recalibrating",
                baseline
            );
            return CalibrationStep::Rejected;
        }

        info!(
            "Baseline established at {:.4} from {} samples",
            baseline, collected
        );
        self.state.baseline = Some(baseline);
        CalibrationStep::Established { baseline }
    }

    /// Discard baseline and partial window together
    pub fn reset(&mut self) {
        if self.state.baseline.is_some() || !self.state.pending.is_empty() {
            info!("Calibration reset");
        }
        self.state = CalibrationState {
            pending: Vec::with_capacity(self.window),
            baseline: None,
        };
    }

    /// Reset and stamp later readings with `generation`
    pub fn recalibrate(&mut self, generation: u64) {
        self.reset();
        self.generation = generation;
    }
}
