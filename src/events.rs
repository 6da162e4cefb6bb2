use crate::app::SessionStatus;
use crate::error::EventBusError;
use crate::zoom::{Destination, DestinationKey};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Control requests and notifications exchanged inside the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ZoomEvent {
    /// Flip the enabled flag
    ToggleEnableRequested,
    /// Discard calibration and recapture the baseline
    ResetBaselineRequested,
    /// The user moved to another view
    DestinationChanged { destination: Destination },
    /// A view went away
    DestinationClosed { key: DestinationKey },
    /// Flip the exclusion of the active site
    ToggleExclusionRequested,
    /// Session status changed
    StatusChanged { status: SessionStatus },
    /// A zoom command went out to a destination
    ZoomApplied {
        key: DestinationKey,
        from: f64,
        to: f64,
    },
    /// System shutdown requested
    ShutdownRequested { reason: String },
}

impl ZoomEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ZoomEvent::ToggleEnableRequested => "Enable toggle requested".to_string(),
            ZoomEvent::ResetBaselineRequested => "Baseline reset requested".to_string(),
            ZoomEvent::DestinationChanged { destination } => {
                format!("Destination changed to {}", destination)
            }
            ZoomEvent::DestinationClosed { key } => format!("Destination {} closed", key),
            ZoomEvent::ToggleExclusionRequested => "Exclusion toggle requested".to_string(),
            ZoomEvent::StatusChanged { status } => format!("Status changed: {}", status),
            ZoomEvent::ZoomApplied { key, from, to } => {
                format!("Zoom on {} changed {:.3} -> {:.3}", key, from, to)
            }
            ZoomEvent::ShutdownRequested { reason } => format!("Shutdown requested: {}", reason),
        }
    }

    /// Whether this event asks the orchestrator to do something
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            ZoomEvent::ToggleEnableRequested
                | ZoomEvent::ResetBaselineRequested
                | ZoomEvent::DestinationChanged { .. }
                | ZoomEvent::DestinationClosed { .. }
                | ZoomEvent::ToggleExclusionRequested
                | ZoomEvent::ShutdownRequested { .. }
        )
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<ZoomEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Every event, status changes and zoom announcements included
    pub fn subscribe(&self) -> EventReceiver {
        self.subscribe_filtered(EventFilter::All, "observer")
    }

    /// Subscribe through a named, filtered receiver
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: ZoomEvent) -> Result<usize, EventBusError> {
        match &event {
            ZoomEvent::StatusChanged { status } => {
                info!("Status: {}", status);
            }
            ZoomEvent::ShutdownRequested { reason } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    /// Only requests addressed to the orchestrator
    Requests,
}

impl EventFilter {
    pub fn matches(&self, event: &ZoomEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Requests => event.is_request(),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ZoomEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<ZoomEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<ZoomEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<ZoomEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
