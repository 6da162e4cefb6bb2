use crate::config::ZoomConfig;

/// Piecewise-linear ratio to zoom curve with a neutral deadband.
///
/// Ratios inside `[deadband_low, deadband_high]` give exactly 1.0. Above it
/// the zoom falls linearly to `min_zoom` at `near_ratio`; below it the zoom
/// rises linearly to `max_zoom` at `far_ratio`. Both legs start at 1.0 on
/// the deadband edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomCurve {
    pub deadband_low: f64,
    pub deadband_high: f64,
    pub near_ratio: f64,
    pub min_zoom: f64,
    pub far_ratio: f64,
}

impl ZoomCurve {
    pub fn from_config(config: &ZoomConfig) -> Self {
        Self {
            deadband_low: config.deadband_low,
            deadband_high: config.deadband_high,
            near_ratio: config.near_ratio,
            min_zoom: config.min_zoom,
            far_ratio: config.far_ratio,
        }
    }

    pub fn map(&self, ratio: f64, max_zoom: f64) -> f64 {
        let max_zoom = if max_zoom.is_finite() {
            max_zoom.max(1.0)
        } else {
            1.0
        };

        if ratio.is_nan() {
            return 1.0;
        }

        let zoom = if ratio > self.deadband_high {
            let t = (ratio - self.deadband_high) / (self.near_ratio - self.deadband_high);
            1.0 - t.clamp(0.0, 1.0) * (1.0 - self.min_zoom)
        } else if ratio < self.deadband_low {
            let t = (self.deadband_low - ratio) / (self.deadband_low - self.far_ratio);
            1.0 + t.clamp(0.0, 1.0) * (max_zoom - 1.0)
        } else {
            1.0
        };

        zoom.clamp(self.min_zoom.min(1.0), max_zoom)
    }
}

impl Default for ZoomCurve {
    fn default() -> Self {
        Self::from_config(&ZoomConfig::default())
    }
}

/// Map a smoothed ratio to a zoom factor with the default curve
pub fn map_zoom(ratio: f64, max_zoom: f64) -> f64 {
    ZoomCurve::default().map(ratio, max_zoom)
}
