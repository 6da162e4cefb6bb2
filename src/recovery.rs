use std::time::Duration;
use tracing::info;

/// Retry schedule: the same delay before every attempt, no attempt limit
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub delay: Duration,
}

impl RecoveryConfig {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Tracks retry attempts for one component
#[derive(Debug)]
pub struct RecoveryManager {
    component: String,
    config: RecoveryConfig,
    retry_count: u32,
}

impl RecoveryManager {
    pub fn new<S: Into<String>>(component: S, config: RecoveryConfig) -> Self {
        Self {
            component: component.into(),
            config,
            retry_count: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.retry_count = self.retry_count.saturating_add(1);

        info!(
            "Scheduling recovery for {} in {:?} (attempt {})",
            self.component, self.config.delay, self.retry_count
        );

        self.config.delay
    }

    /// Reset retry count after successful recovery
    pub fn reset(&mut self) {
        if self.retry_count > 0 {
            info!(
                "Component {} recovered after {} attempts",
                self.component, self.retry_count
            );
        }
        self.retry_count = 0;
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}
