use super::{ProximityZoomOrchestrator, ShutdownReason};
use crate::error::{EventBusError, ProxZoomError, Result};
use crate::events::{EventFilter, ZoomEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

impl ProximityZoomOrchestrator {
    /// Start keyboard control, if configured, and enable the loop.
    ///
    /// A failed enable is reported in the status and can be retried later.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting proximity zoom controller");

        if let Some(keyboard) = &self.keyboard_handler {
            keyboard.start().await?;
        }

        if let Err(e) = self.enable().await {
            error!("Initial enable failed: {}", e);
        }
        Ok(())
    }

    /// Run the main application loop with signal handling
    pub async fn run(&mut self) -> Result<i32> {
        info!("Proximity zoom controller is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| ProxZoomError::system("Shutdown sender already taken"))?;
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ProxZoomError::system("Shutdown receiver already taken"))?;
        let mut supervisor_events = self
            .supervisor_events
            .take()
            .ok_or_else(|| ProxZoomError::system("Supervisor events already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;

        let mut requests = self
            .event_bus
            .subscribe_filtered(EventFilter::Requests, "orchestrator");

        let mut face_loss_ticker = tokio::time::interval(self.config.sampling.interval());
        face_loss_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown_reason = loop {
            // Re-read every pass; each heartbeat moves it
            let liveness_deadline = self.supervisor.liveness_deadline();

            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.unwrap_or_else(|_| {
                        ShutdownReason::Error("Shutdown channel closed unexpectedly".to_string())
                    });
                }
                event = supervisor_events.recv() => match event {
                    Some(event) => self.handle_supervisor_event(event).await,
                    None => break ShutdownReason::Error("Channel supervisor stopped".to_string()),
                },
                request = requests.recv() => match request {
                    Ok(event) => {
                        if let Some(reason) = self.handle_request(event).await {
                            break reason;
                        }
                    }
                    Err(EventBusError::Lagged { skipped }) => {
                        warn!("Dropped {} control requests", skipped);
                    }
                    Err(e) => break ShutdownReason::Error(e.to_string()),
                },
                _ = sleep_until_deadline(liveness_deadline), if liveness_deadline.is_some() => {
                    self.check_liveness().await;
                }
                _ = face_loss_ticker.tick() => {
                    self.check_face_loss().await;
                }
            }
        };

        self.supervisor_events = Some(supervisor_events);
        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;
        info!("Proximity zoom controller shutdown complete");
        Ok(exit_code)
    }

    /// Act on one request from the event bus; returns a reason to stop
    pub async fn handle_request(&mut self, event: ZoomEvent) -> Option<ShutdownReason> {
        match event {
            ZoomEvent::ToggleEnableRequested => {
                if let Err(e) = self.toggle_enabled().await {
                    error!("Toggle failed: {}", e);
                }
            }
            ZoomEvent::ResetBaselineRequested => self.reset_baseline(),
            ZoomEvent::DestinationChanged { destination } => self.switch_destination(destination),
            ZoomEvent::DestinationClosed { key } => self.destination_closed(key),
            ZoomEvent::ToggleExclusionRequested => {
                if self.toggle_exclusion().await.is_none() {
                    warn!("No active destination to exclude");
                }
            }
            ZoomEvent::ShutdownRequested { .. } => return Some(ShutdownReason::UserRequest),
            _ => {}
        }
        None
    }

    /// Disable the loop and stop every background task
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Some(keyboard) = &self.keyboard_handler {
            if let Err(e) = keyboard.stop().await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        if let Err(e) = self.disable().await {
            error!("Error disabling proximity zoom: {}", e);
            exit_code = 1;
        }

        self.supervisor.shutdown().await;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };

                tokio::select! {
                    _ = token.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                }
            });
        }

        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
            }
        });

        // Give the handlers a chance to register before the loop starts
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
