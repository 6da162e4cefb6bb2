use super::hub::ConnectionHub;
use super::messages::{ControllerCommand, SessionEvent, SessionMessage, KEEPALIVE_PORT};
use super::port::{PortEnd, PortReader, PortWriter};
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the supervisor reports to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SupervisorEvent {
    Connected { epoch: u64 },
    Session(SessionEvent),
    /// The current connection ended. Replaced connections never report this.
    Disconnected { epoch: u64 },
}

/// Public view of the live connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub endpoint: Uuid,
    pub name: String,
    pub epoch: u64,
    pub connected_at: DateTime<Utc>,
}

struct ChannelConnection {
    info: ConnectionInfo,
    last_seen: Instant,
    writer: PortWriter,
}

struct SupervisorShared {
    connection: Mutex<Option<ChannelConnection>>,
    epoch: AtomicU64,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl SupervisorShared {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn touch(&self, epoch: u64) {
        if let Some(connection) = self.connection.lock().as_mut() {
            if connection.info.epoch == epoch {
                connection.last_seen = Instant::now();
            }
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        if self.events.send(event).is_err() {
            debug!("Supervisor event dropped, controller is gone");
        }
    }
}

/// Controller side of the keepalive channel.
///
/// Accepts ports named `capture-keepalive` from the hub, keeps exactly one
/// of them as the current connection, filters heartbeats out of the message
/// stream and tracks their arrival for liveness.
pub struct ChannelSupervisor {
    hub: ConnectionHub,
    config: ChannelConfig,
    shared: Arc<SupervisorShared>,
    cancellation_token: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSupervisor {
    /// Start accepting connections on `hub`
    pub fn start(
        hub: ConnectionHub,
        config: ChannelConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SupervisorShared {
            connection: Mutex::new(None),
            epoch: AtomicU64::new(0),
            events: events_tx,
        });
        let cancellation_token = CancellationToken::new();

        let incoming = hub.listen();
        let accept_task = tokio::spawn(Self::accept_loop(
            incoming,
            Arc::clone(&shared),
            cancellation_token.clone(),
        ));

        info!("Channel supervisor listening for '{}'", KEEPALIVE_PORT);

        let supervisor = Self {
            hub,
            config,
            shared,
            cancellation_token,
            accept_task: Mutex::new(Some(accept_task)),
        };
        (supervisor, events_rx)
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connection.lock().is_some()
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.shared
            .connection
            .lock()
            .as_ref()
            .map(|connection| connection.info.clone())
    }

    /// Resolve once a connection exists, polling every `poll`
    pub async fn wait_for_connection(
        &self,
        timeout: Duration,
        poll: Duration,
    ) -> Result<(), ChannelError> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                if self.is_connected() {
                    return;
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!("No capture connection within {:?}", timeout);
                Err(ChannelError::PortTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Same as `wait_for_connection` with the configured timeout and poll interval
    pub async fn wait_for_connection_default(&self) -> Result<(), ChannelError> {
        self.wait_for_connection(self.config.connect_timeout(), self.config.connect_poll())
            .await
    }

    pub fn send(&self, command: ControllerCommand) -> Result<(), ChannelError> {
        let guard = self.shared.connection.lock();
        let connection = guard.as_ref().ok_or(ChannelError::NotConnected)?;
        connection.writer.post(&command)?;
        debug!("Sent {:?} on connection {}", command, connection.info.epoch);
        Ok(())
    }

    /// Time since the last sign of life on the current connection
    pub fn liveness(&self) -> Option<Duration> {
        self.shared
            .connection
            .lock()
            .as_ref()
            .map(|connection| connection.last_seen.elapsed())
    }

    /// Instant at which the current connection counts as lost unless heard from
    pub fn liveness_deadline(&self) -> Option<Instant> {
        self.shared
            .connection
            .lock()
            .as_ref()
            .map(|connection| connection.last_seen + self.config.liveness_window())
    }

    /// Connected and heard from within heartbeat interval plus margin
    pub fn is_alive(&self) -> bool {
        self.liveness()
            .is_some_and(|elapsed| elapsed < self.config.liveness_window())
    }

    /// Sever the connection if it went silent. Returns true if it did.
    pub fn check_liveness(&self) -> bool {
        match self.liveness() {
            Some(elapsed) if elapsed >= self.config.liveness_window() => {
                warn!(
                    "No heartbeat for {:?}, severing capture connection",
                    elapsed
                );
                self.disconnect();
                true
            }
            _ => false,
        }
    }

    /// Sever the current connection; it is reported as `Disconnected`
    pub fn disconnect(&self) {
        if let Some(connection) = self.shared.connection.lock().take() {
            info!("Disconnecting capture port {}", connection.info.endpoint);
            connection.writer.disconnect();
        }
    }

    /// Stop accepting connections and drop the current one
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.disconnect();

        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Channel supervisor accept task failed: {}", e);
            }
        }
        info!("Channel supervisor stopped");
    }

    async fn accept_loop(
        mut incoming: mpsc::UnboundedReceiver<PortEnd>,
        shared: Arc<SupervisorShared>,
        cancellation_token: CancellationToken,
    ) {
        loop {
            let port = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                port = incoming.recv() => match port {
                    Some(port) => port,
                    None => {
                        debug!("Connection hub listener replaced");
                        break;
                    }
                },
            };

            if port.name() != KEEPALIVE_PORT {
                warn!("Ignoring port '{}'", port.name());
                continue;
            }

            let (writer, reader) = port.split();
            let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let info = ConnectionInfo {
                endpoint: Uuid::new_v4(),
                name: writer.name().to_string(),
                epoch,
                connected_at: Utc::now(),
            };

            info!(
                "Capture port connected (endpoint {}, epoch {})",
                info.endpoint, epoch
            );

            let previous = shared.connection.lock().replace(ChannelConnection {
                info,
                last_seen: Instant::now(),
                writer,
            });
            if let Some(previous) = previous {
                debug!("Replacing connection {}", previous.info.epoch);
                previous.writer.disconnect();
            }

            shared.emit(SupervisorEvent::Connected { epoch });
            tokio::spawn(Self::read_loop(reader, epoch, Arc::clone(&shared)));
        }
    }

    async fn read_loop(mut reader: PortReader, epoch: u64, shared: Arc<SupervisorShared>) {
        while let Some(frame) = reader.recv::<SessionMessage>().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => {
                    warn!("Skipping undecodable frame: {}", e);
                    continue;
                }
            };

            shared.touch(epoch);
            match message.into_event() {
                Some(event) => shared.emit(SupervisorEvent::Session(event)),
                None => debug!("Heartbeat on connection {}", epoch),
            }
        }

        if shared.is_current(epoch) {
            let mut connection = shared.connection.lock();
            if connection.as_ref().is_some_and(|c| c.info.epoch == epoch) {
                *connection = None;
            }
            drop(connection);

            info!("Capture port disconnected (epoch {})", epoch);
            shared.emit(SupervisorEvent::Disconnected { epoch });
        } else {
            debug!("Stale connection {} ended", epoch);
        }
    }
}
