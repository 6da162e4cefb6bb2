use super::port::{self, PortEnd};
use crate::error::ChannelError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Rendezvous point where the capture side opens ports toward the controller.
///
/// Only one listener exists at a time; a new `listen` replaces the previous
/// one, the way a restarted controller takes over the connection point.
#[derive(Clone, Default)]
pub struct ConnectionHub {
    listener: Arc<Mutex<Option<mpsc::UnboundedSender<PortEnd>>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting ports; previously returned receivers stop receiving
    pub fn listen(&self) -> mpsc::UnboundedReceiver<PortEnd> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.listener.lock() = Some(tx);
        debug!("Connection hub listener installed");
        rx
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|listener| !listener.is_closed())
    }

    /// Open a port named `name` and hand the far end to the listener
    pub fn connect(&self, name: &str) -> Result<PortEnd, ChannelError> {
        let guard = self.listener.lock();
        let listener = guard.as_ref().ok_or_else(|| ChannelError::NoListener {
            name: name.to_string(),
        })?;

        let (local, remote) = port::pair(name);
        listener
            .send(remote)
            .map_err(|_| ChannelError::NoListener {
                name: name.to_string(),
            })?;

        debug!("Opened port '{}'", name);
        Ok(local)
    }
}
