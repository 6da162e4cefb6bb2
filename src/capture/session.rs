use crate::analyzer::{CalibrationState, CalibrationStep, CalibrationTracker, SignalExtractor};
use crate::camera::{CameraSource, CaptureRequest};
use crate::channel::{Outbox, SessionMessage};
use crate::config::ProxZoomConfig;
use crate::error::{CameraError, CameraFailure};
use crate::inference::LandmarkDetector;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Capture session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Failed(CameraFailure),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

#[derive(Clone)]
pub struct SessionObserver {
    state: Arc<Mutex<SessionState>>,
    calibration: Arc<Mutex<CalibrationTracker>>,
}

impl SessionObserver {
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibration.lock().state().clone()
    }
}

/// Everything the sampling loop needs, shared with the session
#[derive(Clone)]
struct Sampler {
    camera: Arc<dyn CameraSource>,
    detector: Arc<dyn LandmarkDetector>,
    extractor: SignalExtractor,
    calibration: Arc<Mutex<CalibrationTracker>>,
    outbox: Outbox,
    interval: Duration,
}

/// Owns the camera and the landmark detector and turns frames into
/// post-calibration distance readings.
pub struct CaptureSession {
    request: CaptureRequest,
    sampler: Sampler,
    state: Arc<Mutex<SessionState>>,
    sampling: Option<(CancellationToken, JoinHandle<()>)>,
    detector_init: Option<JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(
        config: &ProxZoomConfig,
        camera: Arc<dyn CameraSource>,
        detector: Arc<dyn LandmarkDetector>,
        outbox: Outbox,
    ) -> Self {
        Self {
            request: CaptureRequest::from_config(&config.camera),
            sampler: Sampler {
                camera,
                detector,
                extractor: SignalExtractor::from_config(&config.sampling),
                calibration: Arc::new(Mutex::new(CalibrationTracker::new(
                    config.sampling.calibration_window,
                ))),
                outbox,
                interval: config.sampling.interval(),
            },
            state: Arc::new(Mutex::new(SessionState::Idle)),
            sampling: None,
            detector_init: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    pub fn calibration(&self) -> CalibrationState {
        self.sampler.calibration.lock().state().clone()
    }

    /// Read-only view that stays valid after the session moves into a task
    pub fn observer(&self) -> SessionObserver {
        SessionObserver {
            state: Arc::clone(&self.state),
            calibration: Arc::clone(&self.sampler.calibration),
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            debug!("Capture session {} -> {}", previous, state);
        }
    }

    /// Acquire the camera and start sampling, tagging readings with `generation`.
    ///
    /// Starting while already streaming only repeats the readiness signal,
    /// unless the generation moved on while this session was unreachable.
    pub async fn start(&mut self, generation: u64) -> Result<(), CameraError> {
        if self.is_streaming() {
            let mut calibration = self.sampler.calibration.lock();
            if calibration.generation() != generation {
                info!(
                    "Calibration generation {} superseded by {}, recapturing baseline",
                    calibration.generation(),
                    generation
                );
                calibration.recalibrate(generation);
            } else {
                debug!("Capture session already streaming");
            }
            drop(calibration);
            self.sampler.outbox.send(&SessionMessage::CameraReady);
            return Ok(());
        }

        self.sampler.calibration.lock().recalibrate(generation);
        self.set_state(SessionState::Starting);
        info!(
            "Acquiring camera {} ({}x{} @ {}fps)",
            self.request.device_index, self.request.width, self.request.height, self.request.max_fps
        );

        if let Err(e) = self.sampler.camera.acquire(&self.request).await {
            let reason = e.reason();
            error!("Camera acquisition failed ({}): {}", reason, e);
            self.sampler.camera.release().await;
            self.sampler.calibration.lock().reset();
            self.set_state(SessionState::Failed(reason));
            self.sampler
                .outbox
                .send(&SessionMessage::CameraError { error: reason });
            return Err(e);
        }

        self.set_state(SessionState::Streaming);
        self.sampler.outbox.send(&SessionMessage::CameraReady);
        info!("Camera ready, sampling every {:?}", self.sampler.interval);

        if !self.sampler.detector.is_ready() && self.detector_init.is_none() {
            let detector = Arc::clone(&self.sampler.detector);
            self.detector_init = Some(tokio::spawn(async move {
                match detector.initialize().await {
                    Ok(()) => info!("Landmark detector initialized"),
                    Err(e) => warn!("Landmark detector failed to initialize: {}", e),
                }
            }));
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(self.sampler.clone().run(token.clone()));
        self.sampling = Some((token, task));
        Ok(())
    }

    /// Stop sampling, release the camera and clear calibration.
    ///
    /// Safe to call in any state; returns once the camera is released.
    pub async fn stop(&mut self) {
        let was = self.state();
        if was != SessionState::Idle {
            self.set_state(SessionState::Stopping);
        }

        if let Some((token, task)) = self.sampling.take() {
            token.cancel();
            if let Err(e) = task.await {
                error!("Error waiting for sampling loop: {}", e);
            }
        }

        if let Some(init) = self.detector_init.take() {
            if !init.is_finished() {
                init.abort();
            }
        }

        self.sampler.camera.release().await;
        self.sampler.calibration.lock().reset();
        self.set_state(SessionState::Idle);

        if was == SessionState::Streaming {
            info!("Capture session stopped");
        }
    }

    /// Discard the baseline and any partial window.
    ///
    /// Readings computed against the old baseline keep the old generation.
    pub fn reset_baseline(&self, generation: u64) {
        self.sampler.calibration.lock().recalibrate(generation);
        info!("Calibration reset, recapturing baseline as generation {}", generation);
    }
}

impl Sampler {
    async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = None;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.detector.is_ready() {
                trace!("Detector not ready, skipping cycle");
                continue;
            }

            let Some(frame) = self.camera.latest_frame() else {
                trace!("No frame yet, skipping cycle");
                continue;
            };
            if last_frame == Some(frame.id) {
                trace!("Frame {} already sampled", frame.id);
                continue;
            }
            last_frame = Some(frame.id);
            if !frame.validate_size() {
                warn!(
                    "Frame {} has {} bytes for {}x{}, skipping",
                    frame.id,
                    frame.data.len(),
                    frame.width,
                    frame.height
                );
                continue;
            }

            let result = match self.detector.detect(&frame) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Inference failed on frame {}: {}", frame.id, e);
                    continue;
                }
            };

            let Some(spread) = self.extractor.extract(&result) else {
                trace!("No face in frame {}", frame.id);
                continue;
            };

            let step = self.calibration.lock().observe(spread);
            match step {
                CalibrationStep::Reading(reading) => {
                    trace!(
                        "Reading spread={:.4} ratio={:.3}",
                        reading.spread,
                        reading.ratio
                    );
                    self.outbox.send(&SessionMessage::DistanceReading(reading));
                }
                CalibrationStep::Established { baseline } => {
                    info!("Baseline established at {:.4}", baseline);
                }
                CalibrationStep::Accumulating { collected, window } => {
                    debug!("Calibrating {}/{}", collected, window);
                }
                CalibrationStep::Rejected => {
                    debug!("Rejected degenerate spread {}", spread);
                }
            }
        }

        debug!("Sampling loop stopped");
    }
}
