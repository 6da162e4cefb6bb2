use crate::error::CameraFailure;
use crate::events::{EventBus, ZoomEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Last failure shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum StatusError {
    Camera(CameraFailure),
    PortTimeout,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusError::Camera(reason) => write!(f, "camera: {}", reason),
            StatusError::PortTimeout => write!(f, "port timeout"),
        }
    }
}

/// Transient per-process status, never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub enabled: bool,
    pub camera_active: bool,
    pub last_error: Option<StatusError>,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enabled={} camera_active={}",
            self.enabled, self.camera_active
        )?;
        if let Some(error) = &self.last_error {
            write!(f, " last_error={}", error)?;
        }
        Ok(())
    }
}

/// Holds the status and announces every change on the event bus
pub struct StatusStore {
    inner: Mutex<SessionStatus>,
    event_bus: Arc<EventBus>,
}

impl StatusStore {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            inner: Mutex::new(SessionStatus::default()),
            event_bus,
        }
    }

    pub fn get(&self) -> SessionStatus {
        *self.inner.lock()
    }

    /// Apply `change`; publishes `StatusChanged` only if something changed
    pub async fn update<F>(&self, change: F) -> SessionStatus
    where
        F: FnOnce(&mut SessionStatus),
    {
        let (status, changed) = {
            let mut status = self.inner.lock();
            let before = *status;
            change(&mut *status);
            (*status, *status != before)
        };

        if changed {
            if let Err(e) = self
                .event_bus
                .publish(ZoomEvent::StatusChanged { status })
                .await
            {
                debug!("Status change not published: {}", e);
            }
        }
        status
    }
}
