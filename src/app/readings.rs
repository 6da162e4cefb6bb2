use super::status::StatusError;
use super::ProximityZoomOrchestrator;
use crate::analyzer::DistanceReading;
use crate::channel::{ControllerCommand, SessionEvent, SupervisorEvent};
use crate::events::ZoomEvent;
use crate::zoom::{ActuationOutcome, DestinationKey, FaceLossAction, NEUTRAL_ZOOM};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

impl ProximityZoomOrchestrator {
    /// Wait up to `wait` for one supervisor event and handle it
    pub async fn poll_channel(&mut self, wait: Duration) -> Option<SupervisorEvent> {
        let events = self.supervisor_events.as_mut()?;
        let event = tokio::time::timeout(wait, events.recv()).await.ok().flatten()?;
        self.handle_supervisor_event(event).await;
        Some(event)
    }

    pub async fn handle_supervisor_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Connected { epoch } => self.on_connected(epoch),
            SupervisorEvent::Disconnected { epoch } => {
                info!("Capture connection {} lost", epoch);
                self.status.update(|status| status.camera_active = false).await;
            }
            SupervisorEvent::Session(SessionEvent::CameraReady) => {
                self.status
                    .update(|status| {
                        status.camera_active = true;
                        status.last_error = None;
                    })
                    .await;
            }
            SupervisorEvent::Session(SessionEvent::CameraError(reason)) => {
                if reason.requires_consent() {
                    warn!("Camera permission denied, access must be granted before retrying");
                } else {
                    warn!("Camera failed: {}", reason);
                }
                self.status
                    .update(|status| {
                        status.camera_active = false;
                        status.last_error = Some(StatusError::Camera(reason));
                    })
                    .await;
            }
            SupervisorEvent::Session(SessionEvent::Reading(reading)) => {
                self.handle_reading(reading).await;
            }
        }
    }

    fn on_connected(&mut self, epoch: u64) {
        if !self.status.get().enabled || self.started_epoch == Some(epoch) {
            return;
        }

        // A reconnected host is still streaming; ask again so it confirms readiness
        debug!("Resuming capture on connection {}", epoch);
        let command = ControllerCommand::StartCamera {
            generation: self.generation,
        };
        match self.supervisor.send(command) {
            Ok(()) => self.started_epoch = Some(epoch),
            Err(e) => warn!("Failed to resume capture: {}", e),
        }
    }

    /// Smooth, map and apply one reading to the active destination
    pub async fn handle_reading(&mut self, reading: DistanceReading) -> Option<ActuationOutcome> {
        if !self.status.get().enabled {
            trace!("Ignoring reading while disabled");
            return None;
        }
        let Some(destination) = self.destination.clone() else {
            trace!("No active destination");
            return None;
        };
        if reading.generation != self.generation {
            debug!(
                "Dropping reading from calibration generation {} (current {})",
                reading.generation, self.generation
            );
            return None;
        }

        self.face_loss.record_reading();
        let smoothed = self.ema.update(reading.ratio);
        let settings = self.settings.snapshot();
        let zoom = self.curve.map(smoothed, settings.zoom_max);

        debug!(
            "ratio={:.3} smoothed={:.3} zoom={:.3}",
            reading.ratio, smoothed, zoom
        );

        let outcome = self.actuator.apply(&destination, zoom, &settings).await;
        self.announce(destination.key, outcome).await;
        Some(outcome)
    }

    /// Sever the channel if heartbeats stopped
    pub async fn check_liveness(&mut self) {
        if self.supervisor.check_liveness() {
            self.status.update(|status| status.camera_active = false).await;
        }
    }

    /// Apply the face-loss policy if readings stopped arriving
    pub async fn check_face_loss(&mut self) -> FaceLossAction {
        let Some(destination) = self.destination.clone() else {
            return FaceLossAction::None;
        };

        let action = self.face_loss.check(self.actuator.applied(destination.key));
        let zoom = match action {
            FaceLossAction::None | FaceLossAction::Hold => return action,
            FaceLossAction::ApplyNeutral => {
                self.ema.reset();
                NEUTRAL_ZOOM
            }
            FaceLossAction::Step { zoom, settled } => {
                if settled {
                    self.ema.reset();
                }
                zoom
            }
        };

        let settings = self.settings.snapshot();
        let outcome = self.actuator.apply(&destination, zoom, &settings).await;
        self.announce(destination.key, outcome).await;
        action
    }

    async fn announce(&self, key: DestinationKey, outcome: ActuationOutcome) {
        if let ActuationOutcome::Applied { from, to } = outcome {
            let event = ZoomEvent::ZoomApplied { key, from, to };
            if let Err(e) = self.event_bus.publish(event).await {
                trace!("Zoom event not published: {}", e);
            }
        }
    }
}
