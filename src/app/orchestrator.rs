use super::keyboard_input::KeyboardInputHandler;
use super::status::{SessionStatus, StatusStore};
use super::types::ShutdownReason;
use crate::analyzer::EmaFilter;
use crate::camera::CameraSource;
use crate::capture::{HostFactory, HostRegistry};
use crate::channel::{ChannelSupervisor, ConnectionHub, SupervisorEvent};
use crate::config::ProxZoomConfig;
use crate::error::{ProxZoomError, Result};
use crate::events::EventBus;
use crate::inference::LandmarkDetector;
use crate::settings::{SettingsHandle, SettingsStore};
use crate::zoom::{Destination, FaceLossMonitor, ZoomActuator, ZoomCurve, ZoomDriver};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Controller side of the proximity zoom loop.
///
/// Keeps one capture host alive while enabled, talks to it through the
/// channel supervisor and turns its readings into zoom commands for the
/// active destination.
pub struct ProximityZoomOrchestrator {
    pub(super) config: ProxZoomConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) settings_store: Arc<SettingsStore>,
    pub(super) settings: SettingsHandle,
    pub(super) status: StatusStore,

    // Channel and capture host
    pub(super) supervisor: ChannelSupervisor,
    pub(super) supervisor_events: Option<mpsc::UnboundedReceiver<SupervisorEvent>>,
    pub(super) registry: HostRegistry,
    /// Connection the current START_CAMERA went out on
    pub(super) started_epoch: Option<u64>,
    /// Bumped on every enable and baseline reset; readings from older ones are dropped
    pub(super) generation: u64,

    // Reading pipeline
    pub(super) curve: ZoomCurve,
    pub(super) ema: EmaFilter,
    pub(super) actuator: ZoomActuator,
    pub(super) face_loss: FaceLossMonitor,
    pub(super) destination: Option<Destination>,

    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ProximityZoomOrchestrator {
    pub fn builder() -> ProximityZoomOrchestratorBuilder {
        ProximityZoomOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &ProxZoomConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.status.get()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings_store
    }

    pub fn supervisor(&self) -> &ChannelSupervisor {
        &self.supervisor
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn actuator(&self) -> &ZoomActuator {
        &self.actuator
    }

    /// Current smoothed ratio
    pub fn smoothed_ratio(&self) -> Option<f64> {
        self.ema.value()
    }

    /// Calibration generation readings must carry to be applied
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Builder for the orchestrator
pub struct ProximityZoomOrchestratorBuilder {
    config: Option<ProxZoomConfig>,
    settings: Option<Arc<SettingsStore>>,
    event_bus: Option<Arc<EventBus>>,
    hub: Option<ConnectionHub>,
    host_factory: Option<HostFactory>,
    camera: Option<Arc<dyn CameraSource>>,
    detector: Option<Arc<dyn LandmarkDetector>>,
    driver: Option<Arc<dyn ZoomDriver>>,
    destination: Option<Destination>,
    keyboard_destinations: Option<Vec<Destination>>,
}

impl Default for ProximityZoomOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProximityZoomOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            settings: None,
            event_bus: None,
            hub: None,
            host_factory: None,
            camera: None,
            detector: None,
            driver: None,
            destination: None,
            keyboard_destinations: None,
        }
    }

    pub fn config(mut self, config: ProxZoomConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Connection point shared with capture hosts
    pub fn hub(mut self, hub: ConnectionHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Camera and detector for hosts launched by the default factory
    pub fn capture(
        mut self,
        camera: Arc<dyn CameraSource>,
        detector: Arc<dyn LandmarkDetector>,
    ) -> Self {
        self.camera = Some(camera);
        self.detector = Some(detector);
        self
    }

    /// Replace the default host factory
    pub fn host_factory(mut self, factory: HostFactory) -> Self {
        self.host_factory = Some(factory);
        self
    }

    pub fn driver(mut self, driver: Arc<dyn ZoomDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Destination active at startup
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Enable keyboard control cycling through `destinations`
    pub fn keyboard(mut self, destinations: Vec<Destination>) -> Self {
        self.keyboard_destinations = Some(destinations);
        self
    }

    /// Must be called inside a tokio runtime
    pub fn build(self) -> Result<ProximityZoomOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let driver = self
            .driver
            .ok_or_else(|| ProxZoomError::system("Zoom driver must be specified"))?;

        let hub = self.hub.unwrap_or_default();
        let registry = match (self.host_factory, self.camera, self.detector) {
            (Some(factory), _, _) => HostRegistry::new(hub.clone(), factory),
            (None, Some(camera), Some(detector)) => {
                HostRegistry::with_session(hub.clone(), config.clone(), camera, detector)
            }
            _ => {
                return Err(ProxZoomError::system(
                    "Camera and landmark detector must be specified",
                ))
            }
        };

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new(config.system.event_bus_capacity)));
        let settings_store = self
            .settings
            .unwrap_or_else(|| Arc::new(SettingsStore::default()));
        let settings = settings_store.handle();

        let (supervisor, supervisor_events) = ChannelSupervisor::start(hub, config.channel.clone());

        let active = self.destination.as_ref().map(|destination| destination.key);
        let keyboard_handler = self.keyboard_destinations.map(|destinations| {
            KeyboardInputHandler::new(Arc::clone(&event_bus), destinations, active)
        });

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(ProximityZoomOrchestrator {
            curve: ZoomCurve::from_config(&config.zoom),
            ema: EmaFilter::new(config.zoom.smoothing_alpha),
            actuator: ZoomActuator::new(driver, config.zoom.min_delta),
            face_loss: FaceLossMonitor::new(config.face_loss.clone()),
            status: StatusStore::new(Arc::clone(&event_bus)),
            config,
            event_bus,
            settings_store,
            settings,
            supervisor,
            supervisor_events: Some(supervisor_events),
            registry,
            started_epoch: None,
            generation: 0,
            destination: self.destination,
            keyboard_handler,
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }
}
