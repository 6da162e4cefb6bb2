/// Exponential moving average over the raw distance ratio.
///
/// The first sample seeds the average directly; every later one blends as
/// `ema = alpha * raw + (1 - alpha) * ema`.
#[derive(Debug, Clone)]
pub struct EmaFilter {
    alpha: f64,
    value: Option<f64>,
}

impl EmaFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            value: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current smoothed value, `None` until the first sample
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Blend in one raw ratio and return the new smoothed value
    pub fn update(&mut self, raw: f64) -> f64 {
        let next = match self.value {
            Some(previous) => self.alpha * raw + (1.0 - self.alpha) * previous,
            None => raw,
        };
        self.value = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}
