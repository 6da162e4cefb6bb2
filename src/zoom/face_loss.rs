use super::actuator::NEUTRAL_ZOOM;
use crate::config::{FaceLossConfig, FaceLossPolicy};
use tokio::time::Instant;
use tracing::{debug, info};

/// What to do with the zoom after the face has been missing for a while
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceLossAction {
    /// Nothing to do
    None,
    /// Face lost, zoom stays where it is
    Hold,
    /// Jump back to neutral and restart smoothing
    ApplyNeutral,
    /// Move to this zoom, one step closer to neutral
    Step { zoom: f64, settled: bool },
}

/// Watches the gap between readings and applies the configured policy
#[derive(Debug, Clone)]
pub struct FaceLossMonitor {
    config: FaceLossConfig,
    last_reading: Option<Instant>,
    lost: bool,
    settled: bool,
}

impl FaceLossMonitor {
    pub fn new(config: FaceLossConfig) -> Self {
        Self {
            config,
            last_reading: None,
            lost: false,
            settled: false,
        }
    }

    pub fn policy(&self) -> FaceLossPolicy {
        self.config.policy
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn record_reading(&mut self) {
        if self.lost {
            info!("Face reacquired");
        }
        self.last_reading = Some(Instant::now());
        self.lost = false;
        self.settled = false;
    }

    /// Forget history; nothing is considered lost until the next reading
    pub fn reset(&mut self) {
        self.last_reading = None;
        self.lost = false;
        self.settled = false;
    }

    /// Decide what to do given the currently applied zoom
    pub fn check(&mut self, applied: Option<f64>) -> FaceLossAction {
        let Some(last) = self.last_reading else {
            return FaceLossAction::None;
        };
        if last.elapsed() < self.config.timeout() || self.settled {
            return FaceLossAction::None;
        }

        if !self.lost {
            self.lost = true;
            info!(
                "No reading for {:?}, applying '{:?}' face-loss policy",
                last.elapsed(),
                self.config.policy
            );
        }

        match self.config.policy {
            FaceLossPolicy::Hold => {
                self.settled = true;
                FaceLossAction::Hold
            }
            FaceLossPolicy::Neutral => {
                self.settled = true;
                FaceLossAction::ApplyNeutral
            }
            FaceLossPolicy::Decay => {
                let current = applied.unwrap_or(NEUTRAL_ZOOM);
                let distance = current - NEUTRAL_ZOOM;
                let step = self.config.decay_step.abs();

                if distance.abs() <= step {
                    self.settled = true;
                    debug!("Decay reached neutral zoom");
                    FaceLossAction::Step {
                        zoom: NEUTRAL_ZOOM,
                        settled: true,
                    }
                } else {
                    FaceLossAction::Step {
                        zoom: current - step * distance.signum(),
                        settled: false,
                    }
                }
            }
        }
    }
}
