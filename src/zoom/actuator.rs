use crate::error::DestinationError;
use crate::settings::Settings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Natural zoom of a destination nobody has touched
pub const NEUTRAL_ZOOM: f64 = 1.0;

/// Identifies the view whose zoom is controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DestinationKey(pub u64);

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A view plus the site it shows; the site is what exclusions match on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub key: DestinationKey,
    pub site: String,
}

impl Destination {
    pub fn new<S: Into<String>>(key: u64, site: S) -> Self {
        Self {
            key: DestinationKey(key),
            site: site.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.site)
    }
}

/// Host environment hook that actually changes a view's zoom
#[async_trait]
pub trait ZoomDriver: Send + Sync {
    async fn current_zoom(&self, key: DestinationKey) -> Result<f64, DestinationError>;

    async fn set_zoom(&self, key: DestinationKey, factor: f64) -> Result<(), DestinationError>;

    /// Back to the natural, unset zoom
    async fn reset_zoom(&self, key: DestinationKey) -> Result<(), DestinationError>;
}

/// Per-destination record of what was applied
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomTarget {
    pub destination: Destination,
    pub applied: f64,
    pub last_known_good: f64,
}

/// What happened to one zoom request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuationOutcome {
    Applied { from: f64, to: f64 },
    /// Change smaller than the minimum delta
    BelowThreshold,
    /// Site is excluded by the settings
    Excluded,
    /// Destination went away; its target was dropped
    Unreachable,
    /// Driver refused the change
    Failed,
}

/// Applies zoom factors to destinations, suppressing imperceptible changes.
///
/// Owned by the orchestrator and only ever driven from its reading path.
pub struct ZoomActuator {
    driver: Arc<dyn ZoomDriver>,
    min_delta: f64,
    targets: HashMap<DestinationKey, ZoomTarget>,
}

impl ZoomActuator {
    pub fn new(driver: Arc<dyn ZoomDriver>, min_delta: f64) -> Self {
        Self {
            driver,
            min_delta: min_delta.max(0.0),
            targets: HashMap::new(),
        }
    }

    pub fn target(&self, key: DestinationKey) -> Option<&ZoomTarget> {
        self.targets.get(&key)
    }

    pub fn applied(&self, key: DestinationKey) -> Option<f64> {
        self.targets.get(&key).map(|target| target.applied)
    }

    pub async fn apply(
        &mut self,
        destination: &Destination,
        factor: f64,
        settings: &Settings,
    ) -> ActuationOutcome {
        if settings.is_excluded(&destination.site) {
            trace!("Site '{}' is excluded", destination.site);
            return ActuationOutcome::Excluded;
        }

        let from = match self.targets.get(&destination.key) {
            Some(target) => target.applied,
            None => match self.driver.current_zoom(destination.key).await {
                Ok(current) => current,
                Err(DestinationError::Unreachable { .. }) => {
                    debug!("Destination {} unreachable", destination);
                    return ActuationOutcome::Unreachable;
                }
                Err(e) => {
                    warn!("Could not read zoom of {}: {}", destination, e);
                    NEUTRAL_ZOOM
                }
            },
        };

        if (factor - from).abs() < self.min_delta {
            trace!("Zoom change {:.4} -> {:.4} below threshold", from, factor);
            self.remember(destination, from, None);
            return ActuationOutcome::BelowThreshold;
        }

        match self.driver.set_zoom(destination.key, factor).await {
            Ok(()) => {
                debug!("Zoom on {} {:.3} -> {:.3}", destination, from, factor);
                self.remember(destination, factor, Some(factor));
                ActuationOutcome::Applied { from, to: factor }
            }
            Err(DestinationError::Unreachable { .. }) => {
                debug!("Destination {} went away", destination);
                self.invalidate(destination.key);
                ActuationOutcome::Unreachable
            }
            Err(e) => {
                warn!("Zoom change on {} failed: {}", destination, e);
                self.remember(destination, from, None);
                ActuationOutcome::Failed
            }
        }
    }

    fn remember(&mut self, destination: &Destination, applied: f64, good: Option<f64>) {
        let target = self
            .targets
            .entry(destination.key)
            .or_insert_with(|| ZoomTarget {
                destination: destination.clone(),
                applied,
                last_known_good: applied,
            });
        target.applied = applied;
        if let Some(good) = good {
            target.last_known_good = good;
        }
    }

    /// Put one destination back to its natural zoom and forget it
    pub async fn reset(&mut self, key: DestinationKey) {
        self.targets.remove(&key);
        match self.driver.reset_zoom(key).await {
            Ok(()) => debug!("Zoom on {} reset", key),
            Err(DestinationError::Unreachable { .. }) => {
                debug!("Destination {} unreachable during reset", key)
            }
            Err(e) => warn!("Zoom reset on {} failed: {}", key, e),
        }
    }

    /// Reset every destination this actuator has touched
    pub async fn reset_all(&mut self) {
        let keys: Vec<DestinationKey> = self.targets.keys().copied().collect();
        for key in keys {
            self.reset(key).await;
        }
    }

    /// Forget a destination without talking to it
    pub fn invalidate(&mut self, key: DestinationKey) -> Option<ZoomTarget> {
        self.targets.remove(&key)
    }
}
