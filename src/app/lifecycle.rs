use super::status::StatusError;
use super::ProximityZoomOrchestrator;
use crate::capture::HostAcquisition;
use crate::channel::ControllerCommand;
use crate::error::Result;
use crate::zoom::{Destination, DestinationKey};
use tracing::{debug, error, info, warn};

impl ProximityZoomOrchestrator {
    /// Make sure a capture host is connected and streaming.
    ///
    /// If the host never connects within the configured timeout, or the
    /// connection is gone before START_CAMERA goes out, the host is closed,
    /// the status shows the loop disabled and the error is returned.
    pub async fn enable(&mut self) -> Result<()> {
        let (host, acquisition) = self.registry.ensure_host().await;
        match acquisition {
            HostAcquisition::Created => info!("Launched capture host {}", host.id()),
            HostAcquisition::Reused => debug!("Reusing capture host {}", host.id()),
        }

        if let Err(e) = self.supervisor.wait_for_connection_default().await {
            error!("Capture host did not connect: {}", e);
            self.abandon_enable(Some(StatusError::PortTimeout)).await;
            return Err(e.into());
        }

        self.ema.reset();
        self.face_loss.reset();
        self.generation += 1;
        let command = ControllerCommand::StartCamera {
            generation: self.generation,
        };
        if let Err(e) = self.supervisor.send(command) {
            error!("Capture host dropped before START_CAMERA: {}", e);
            self.abandon_enable(None).await;
            return Err(e.into());
        }
        self.started_epoch = self.supervisor.connection_info().map(|info| info.epoch);

        self.status
            .update(|status| {
                status.enabled = true;
                status.last_error = None;
            })
            .await;
        info!("Proximity zoom enabled");
        Ok(())
    }

    /// Close the host an enable just launched and leave the loop disabled
    async fn abandon_enable(&mut self, last_error: Option<StatusError>) {
        self.registry.close().await;
        self.started_epoch = None;
        self.status
            .update(|status| {
                status.enabled = false;
                status.camera_active = false;
                if last_error.is_some() {
                    status.last_error = last_error;
                }
            })
            .await;
    }

    /// Stop the camera, put zoom back to natural and close the capture host
    pub async fn disable(&mut self) -> Result<()> {
        if self.supervisor.is_connected() {
            if let Err(e) = self.supervisor.send(ControllerCommand::StopCamera) {
                warn!("Failed to send stop command: {}", e);
            }
        }
        self.started_epoch = None;

        self.status
            .update(|status| {
                status.enabled = false;
                status.camera_active = false;
            })
            .await;

        self.actuator.reset_all().await;
        self.ema.reset();
        self.face_loss.reset();

        self.registry.close().await;
        info!("Proximity zoom disabled");
        Ok(())
    }

    pub async fn toggle_enabled(&mut self) -> Result<()> {
        if self.status.get().enabled {
            self.disable().await
        } else {
            self.enable().await
        }
    }

    /// Throw away calibration and smoothing and recapture the baseline.
    ///
    /// Readings already in flight were measured against the old baseline;
    /// they carry the previous generation and are dropped on arrival.
    pub fn reset_baseline(&mut self) {
        self.ema.reset();
        self.face_loss.reset();
        self.generation += 1;

        if !self.supervisor.is_connected() {
            // The next START_CAMERA carries the new generation
            debug!("No capture connection, baseline reset deferred");
            return;
        }
        let command = ControllerCommand::ResetBaseline {
            generation: self.generation,
        };
        if let Err(e) = self.supervisor.send(command) {
            warn!("Failed to send baseline reset: {}", e);
        }
    }

    /// Point the loop at another destination.
    ///
    /// The baseline was measured for the previous one, so it is recaptured.
    pub fn switch_destination(&mut self, destination: Destination) {
        if self.destination.as_ref() == Some(&destination) {
            return;
        }

        info!("Active destination is now {}", destination);
        self.destination = Some(destination);
        self.reset_baseline();
    }

    /// A destination went away; forget its state
    pub fn destination_closed(&mut self, key: DestinationKey) {
        self.actuator.invalidate(key);

        if self.destination.as_ref().is_some_and(|d| d.key == key) {
            info!("Active destination {} closed", key);
            self.destination = None;
            self.ema.reset();
            self.face_loss.reset();
        }
    }

    /// Flip the exclusion of the active site; returns the new state
    pub async fn toggle_exclusion(&mut self) -> Option<bool> {
        let destination = self.destination.clone()?;
        let excluded = self.settings_store.toggle_exclusion(&destination.site);

        if excluded && self.actuator.target(destination.key).is_some() {
            self.actuator.reset(destination.key).await;
        }

        if let Err(e) = self.settings_store.save() {
            debug!("Settings not persisted: {}", e);
        }
        Some(excluded)
    }
}
