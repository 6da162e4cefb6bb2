use super::actuator::{DestinationKey, ZoomDriver, NEUTRAL_ZOOM};
use crate::error::DestinationError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Driver with no real views behind it; zoom changes are only logged
#[derive(Debug, Default)]
pub struct ConsoleDriver {
    zooms: Mutex<HashMap<DestinationKey, f64>>,
}

impl ConsoleDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zoom last set on `key`, neutral if never touched
    pub fn zoom_of(&self, key: DestinationKey) -> f64 {
        self.zooms.lock().get(&key).copied().unwrap_or(NEUTRAL_ZOOM)
    }
}

#[async_trait]
impl ZoomDriver for ConsoleDriver {
    async fn current_zoom(&self, key: DestinationKey) -> Result<f64, DestinationError> {
        Ok(self.zoom_of(key))
    }

    async fn set_zoom(&self, key: DestinationKey, factor: f64) -> Result<(), DestinationError> {
        info!("Zoom {} -> {:.0}%", key, factor * 100.0);
        self.zooms.lock().insert(key, factor);
        Ok(())
    }

    async fn reset_zoom(&self, key: DestinationKey) -> Result<(), DestinationError> {
        info!("Zoom {} reset", key);
        self.zooms.lock().remove(&key);
        Ok(())
    }
}
