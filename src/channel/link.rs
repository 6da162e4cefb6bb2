use super::hub::ConnectionHub;
use super::messages::{ControllerCommand, SessionMessage, KEEPALIVE_PORT};
use super::port::{PortReader, PortWriter};
use crate::config::ChannelConfig;
use crate::recovery::{RecoveryConfig, RecoveryManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Capture-side sender. Messages posted while disconnected are dropped.
#[derive(Clone, Default)]
pub struct Outbox {
    writer: Arc<Mutex<Option<PortWriter>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbox already bound to a port
    pub fn attached(writer: PortWriter) -> Self {
        let outbox = Self::new();
        outbox.install(writer);
        outbox
    }

    pub fn is_connected(&self) -> bool {
        self.writer
            .lock()
            .as_ref()
            .is_some_and(|writer| writer.is_connected())
    }

    /// Returns whether the message went out
    pub fn send(&self, message: &SessionMessage) -> bool {
        let guard = self.writer.lock();
        let Some(writer) = guard.as_ref() else {
            trace!("Dropping {:?}, no connection", message);
            return false;
        };

        match writer.post(message) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping {:?}: {}", message, e);
                false
            }
        }
    }

    fn install(&self, writer: PortWriter) {
        *self.writer.lock() = Some(writer);
    }

    fn clear(&self) {
        self.writer.lock().take();
    }
}

/// Capture side of the keepalive channel.
///
/// Opens the port, sends heartbeats while it is up, forwards controller
/// commands, and reconnects after a fixed backoff as long as the session is
/// streaming. A link that ends while not streaming stays down.
pub struct SessionLink {
    hub: ConnectionHub,
    config: ChannelConfig,
    outbox: Outbox,
    commands: mpsc::UnboundedSender<ControllerCommand>,
    streaming: Arc<AtomicBool>,
    cancellation_token: CancellationToken,
}

impl SessionLink {
    /// Spawn the link task. Commands from the controller arrive on the returned receiver.
    pub fn spawn(
        hub: ConnectionHub,
        config: ChannelConfig,
        streaming: Arc<AtomicBool>,
        cancellation_token: CancellationToken,
    ) -> (
        Outbox,
        mpsc::UnboundedReceiver<ControllerCommand>,
        JoinHandle<()>,
    ) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let outbox = Outbox::new();

        let link = Self {
            hub,
            config,
            outbox: outbox.clone(),
            commands: commands_tx,
            streaming,
            cancellation_token,
        };
        let task = tokio::spawn(link.run());

        (outbox, commands_rx, task)
    }

    async fn run(self) {
        let mut recovery = RecoveryManager::new(
            "session_link",
            RecoveryConfig::fixed(self.config.reconnect_backoff()),
        );

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.hub.connect(KEEPALIVE_PORT) {
                Ok(port) => {
                    recovery.reset();
                    let (writer, reader) = port.split();
                    self.serve(writer, reader).await;
                }
                Err(e) => warn!("Failed to open keepalive port: {}", e),
            }

            if self.cancellation_token.is_cancelled() {
                break;
            }
            if !self.streaming.load(Ordering::SeqCst) {
                info!("Keepalive link ended while idle, not reconnecting");
                break;
            }

            let delay = recovery.next_delay();
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.streaming.load(Ordering::SeqCst) {
                info!("Streaming stopped during backoff, not reconnecting");
                break;
            }
        }

        self.outbox.clear();
        debug!("Session link task exited");
    }

    /// Run one connection until it drops or the link is cancelled
    async fn serve(&self, writer: PortWriter, mut reader: PortReader) {
        self.outbox.install(writer.clone());
        let heartbeat_token = self.cancellation_token.child_token();
        let heartbeat = tokio::spawn(Self::heartbeat_loop(
            writer.clone(),
            self.config.heartbeat_interval(),
            heartbeat_token.clone(),
        ));

        info!("Keepalive link connected");

        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    writer.disconnect();
                    break;
                }
                frame = reader.recv::<ControllerCommand>() => match frame {
                    Some(Ok(command)) => {
                        debug!("Received {:?}", command);
                        if self.commands.send(command).is_err() {
                            warn!("Command handler is gone, closing link");
                            writer.disconnect();
                            break;
                        }
                    }
                    Some(Err(e)) => warn!("Skipping undecodable command: {}", e),
                    None => {
                        info!("Keepalive link disconnected");
                        break;
                    }
                },
            }
        }

        heartbeat_token.cancel();
        if let Err(e) = heartbeat.await {
            warn!("Heartbeat task failed: {}", e);
        }
        self.outbox.clear();
    }

    async fn heartbeat_loop(
        writer: PortWriter,
        period: Duration,
        cancellation_token: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = writer.post(&SessionMessage::Heartbeat) {
                        debug!("Heartbeat not sent: {}", e);
                        break;
                    }
                    trace!("Heartbeat sent");
                }
            }
        }
    }
}
