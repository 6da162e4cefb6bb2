use super::host::{CaptureHost, CaptureHostHandle};
use crate::camera::CameraSource;
use crate::channel::ConnectionHub;
use crate::config::ProxZoomConfig;
use crate::inference::LandmarkDetector;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Launches a capture host connected to the given hub
pub type HostFactory = Arc<dyn Fn(&ConnectionHub) -> CaptureHostHandle + Send + Sync>;

/// Result of a get-or-create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAcquisition {
    Created,
    Reused,
}

/// Keeps at most one live capture host
pub struct HostRegistry {
    hub: ConnectionHub,
    factory: HostFactory,
    current: Mutex<Option<Arc<CaptureHostHandle>>>,
}

impl HostRegistry {
    pub fn new(hub: ConnectionHub, factory: HostFactory) -> Self {
        Self {
            hub,
            factory,
            current: Mutex::new(None),
        }
    }

    /// Registry whose hosts run a capture session over `camera` and `detector`
    pub fn with_session(
        hub: ConnectionHub,
        config: ProxZoomConfig,
        camera: Arc<dyn CameraSource>,
        detector: Arc<dyn LandmarkDetector>,
    ) -> Self {
        let factory: HostFactory = Arc::new(move |hub: &ConnectionHub| {
            CaptureHost::spawn(
                hub.clone(),
                &config,
                Arc::clone(&camera),
                Arc::clone(&detector),
            )
        });
        Self::new(hub, factory)
    }

    /// Return the live host, launching one if there is none
    pub async fn ensure_host(&self) -> (Arc<CaptureHostHandle>, HostAcquisition) {
        let mut current = self.current.lock().await;

        if let Some(host) = current.as_ref() {
            if host.is_alive() {
                debug!("Reusing capture host {}", host.id());
                return (Arc::clone(host), HostAcquisition::Reused);
            }
            debug!("Capture host {} is dead, replacing it", host.id());
        }

        // Only one host may exist; make sure a dead one has fully released the camera
        if let Some(stale) = current.take() {
            stale.close().await;
        }

        let host = Arc::new((self.factory)(&self.hub));
        info!("Created capture host {}", host.id());
        *current = Some(Arc::clone(&host));
        (host, HostAcquisition::Created)
    }

    pub async fn current(&self) -> Option<Arc<CaptureHostHandle>> {
        self.current
            .lock()
            .await
            .as_ref()
            .filter(|host| host.is_alive())
            .cloned()
    }

    pub async fn has_live_host(&self) -> bool {
        self.current().await.is_some()
    }

    /// Close and forget the current host
    pub async fn close(&self) {
        let host = self.current.lock().await.take();
        if let Some(host) = host {
            host.close().await;
        }
    }
}
