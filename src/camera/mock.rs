use super::interface::{CameraSource, CaptureRequest};
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct MockCameraInner {
    failure: Mutex<Option<CameraError>>,
    latest: Mutex<Option<FrameData>>,
    acquired: AtomicBool,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    frame_counter: AtomicU64,
    capture: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

/// Camera that generates synthetic grayscale frames at the requested rate.
///
/// Clones share the same device, so a test can keep a handle to inspect
/// what the session did with it.
#[derive(Clone, Default)]
pub struct MockCamera {
    inner: Arc<MockCameraInner>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Camera whose every acquisition fails with `error`
    pub fn failing(error: CameraError) -> Self {
        let camera = Self::new();
        camera.set_failure(Some(error));
        camera
    }

    /// Make subsequent acquisitions fail (or succeed again with `None`)
    pub fn set_failure(&self, error: Option<CameraError>) {
        *self.inner.failure.lock() = error;
    }

    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.inner.releases.load(Ordering::SeqCst)
    }

    pub fn frames_generated(&self) -> u64 {
        self.inner.frame_counter.load(Ordering::SeqCst)
    }

    fn spawn_capture_loop(&self, request: CaptureRequest) -> (CancellationToken, JoinHandle<()>) {
        let inner = Arc::clone(&self.inner);
        let token = CancellationToken::new();
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let frame_interval = Duration::from_millis(1000 / request.max_fps.max(1) as u64);
            let mut interval_timer = tokio::time::interval(frame_interval);

            info!(
                "Mock camera capture loop started ({}x{} @ {}fps)",
                request.width, request.height, request.max_fps
            );

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval_timer.tick() => {}
                }

                let frame_id = inner.frame_counter.fetch_add(1, Ordering::SeqCst);
                let shade = (frame_id % 256) as u8;
                let data = vec![shade; request.width as usize * request.height as usize];
                let frame = FrameData::new(
                    frame_id,
                    SystemTime::now(),
                    data,
                    request.width,
                    request.height,
                    FrameFormat::Gray8,
                );

                trace!("Generated mock frame {}", frame_id);
                *inner.latest.lock() = Some(frame);
            }

            debug!("Mock camera capture loop stopped");
        });

        (token, task)
    }
}

#[async_trait]
impl CameraSource for MockCamera {
    async fn acquire(&self, request: &CaptureRequest) -> Result<(), CameraError> {
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.inner.failure.lock().clone() {
            error!("Mock camera acquisition failed: {}", error);
            return Err(error);
        }

        if self.inner.acquired.swap(true, Ordering::SeqCst) {
            warn!("Mock camera is already acquired");
            return Ok(());
        }

        let capture = self.spawn_capture_loop(*request);
        *self.inner.capture.lock() = Some(capture);
        Ok(())
    }

    async fn release(&self) {
        if !self.inner.acquired.swap(false, Ordering::SeqCst) {
            debug!("Mock camera is not acquired");
            return;
        }

        let capture = self.inner.capture.lock().take();
        if let Some((token, task)) = capture {
            token.cancel();
            if let Err(e) = task.await {
                error!("Error waiting for mock capture task: {}", e);
            }
        }

        *self.inner.latest.lock() = None;
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
        info!("Mock camera released");
    }

    fn is_acquired(&self) -> bool {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    fn latest_frame(&self) -> Option<FrameData> {
        self.inner.latest.lock().clone()
    }
}
