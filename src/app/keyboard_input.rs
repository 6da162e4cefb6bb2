use crate::error::Result;
use crate::events::{EventBus, ZoomEvent};
use crate::zoom::{Destination, DestinationKey};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keyboard control for the zoom loop.
///
/// `e` toggles enable, `r` resets the baseline, `n` moves to the next
/// destination, `x` toggles exclusion of the active site and `q` or
/// `Esc` quits.
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    destinations: Vec<Destination>,
    active: Option<DestinationKey>,
    cancellation_token: CancellationToken,
}

/// Cycles through the known destinations on each `n`
#[derive(Debug, Clone)]
struct KeyMap {
    destinations: Vec<Destination>,
    next: usize,
}

impl KeyMap {
    /// The first `n` moves past `active`, not onto it
    fn new(destinations: Vec<Destination>, active: Option<DestinationKey>) -> Self {
        let next = active
            .and_then(|key| destinations.iter().position(|d| d.key == key))
            .map_or(0, |index| (index + 1) % destinations.len());
        Self { destinations, next }
    }

    /// Request for a key press; `None` for keys without a binding
    fn event_for(&mut self, code: KeyCode) -> Option<ZoomEvent> {
        match code {
            KeyCode::Char('e') => Some(ZoomEvent::ToggleEnableRequested),
            KeyCode::Char('r') => Some(ZoomEvent::ResetBaselineRequested),
            KeyCode::Char('x') => Some(ZoomEvent::ToggleExclusionRequested),
            KeyCode::Char('n') => {
                if self.destinations.is_empty() {
                    return None;
                }
                let destination = self.destinations[self.next % self.destinations.len()].clone();
                self.next = (self.next + 1) % self.destinations.len();
                Some(ZoomEvent::DestinationChanged { destination })
            }
            KeyCode::Char('q') | KeyCode::Esc => Some(ZoomEvent::ShutdownRequested {
                reason: "User requested via keyboard".to_string(),
            }),
            _ => None,
        }
    }
}

impl KeyboardInputHandler {
    /// `active` is the destination already in use when keyboard control starts
    pub fn new(
        event_bus: Arc<EventBus>,
        destinations: Vec<Destination>,
        active: Option<DestinationKey>,
    ) -> Self {
        Self {
            event_bus,
            destinations,
            active,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input: e=enable r=reset n=next x=exclude q=quit");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();
        let mut keymap = KeyMap::new(self.destinations.clone(), self.active);

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(zoom_event) = keymap.event_for(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };
                        let quit = matches!(zoom_event, ZoomEvent::ShutdownRequested { .. });
                        info!("{}", zoom_event.description());

                        let event_bus = Arc::clone(&event_bus);
                        runtime_handle.spawn(async move {
                            if let Err(e) = event_bus.publish(zoom_event).await {
                                warn!("Failed to publish keyboard request: {}", e);
                            }
                        });

                        if quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Let the blocking task leave raw mode itself
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
