use crate::error::ChannelError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// One end of a named duplex port carrying JSON text frames.
///
/// Either end can sever the port; the other end observes it as end-of-stream
/// on its reader and as `Disconnected` on its writer.
pub struct PortEnd {
    name: Arc<str>,
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
    severed: CancellationToken,
}

/// Create both ends of a port
pub fn pair(name: &str) -> (PortEnd, PortEnd) {
    let name: Arc<str> = Arc::from(name);
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let severed = CancellationToken::new();

    let a = PortEnd {
        name: Arc::clone(&name),
        outgoing: a_tx,
        incoming: b_rx,
        severed: severed.clone(),
    };
    let b = PortEnd {
        name,
        outgoing: b_tx,
        incoming: a_rx,
        severed,
    };
    (a, b)
}

impl PortEnd {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn split(self) -> (PortWriter, PortReader) {
        let writer = PortWriter {
            name: Arc::clone(&self.name),
            sender: self.outgoing,
            severed: self.severed.clone(),
        };
        let reader = PortReader {
            name: self.name,
            receiver: self.incoming,
            severed: self.severed,
        };
        (writer, reader)
    }
}

/// Sending half; cheap to clone
#[derive(Clone)]
pub struct PortWriter {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<String>,
    severed: CancellationToken,
}

impl PortWriter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post<M: Serialize>(&self, message: &M) -> Result<(), ChannelError> {
        if self.severed.is_cancelled() {
            return Err(ChannelError::Disconnected {
                name: self.name.to_string(),
            });
        }

        let frame = serde_json::to_string(message).map_err(|e| ChannelError::Encode {
            details: e.to_string(),
        })?;
        trace!("Port '{}' -> {}", self.name, frame);

        self.sender
            .send(frame)
            .map_err(|_| ChannelError::Disconnected {
                name: self.name.to_string(),
            })
    }

    /// Sever the port for both ends
    pub fn disconnect(&self) {
        self.severed.cancel();
    }

    pub fn is_connected(&self) -> bool {
        !self.severed.is_cancelled() && !self.sender.is_closed()
    }
}

/// Receiving half
pub struct PortReader {
    name: Arc<str>,
    receiver: mpsc::UnboundedReceiver<String>,
    severed: CancellationToken,
}

impl PortReader {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next decoded frame; `None` once the port is severed or the peer is gone
    pub async fn recv<M: DeserializeOwned>(&mut self) -> Option<Result<M, ChannelError>> {
        let frame = tokio::select! {
            _ = self.severed.cancelled() => return None,
            frame = self.receiver.recv() => frame?,
        };

        trace!("Port '{}' <- {}", self.name, frame);
        Some(
            serde_json::from_str(&frame).map_err(|e| ChannelError::Decode {
                details: e.to_string(),
            }),
        )
    }

    pub fn disconnect(&self) {
        self.severed.cancel();
    }
}

impl Drop for PortReader {
    fn drop(&mut self) {
        self.severed.cancel();
    }
}
