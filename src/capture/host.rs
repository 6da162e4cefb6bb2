use super::session::{CaptureSession, SessionObserver};
use crate::camera::CameraSource;
use crate::channel::{ConnectionHub, ControllerCommand, SessionLink};
use crate::config::ProxZoomConfig;
use crate::inference::LandmarkDetector;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Long-lived context holding the capture session and its end of the channel
pub struct CaptureHost;

impl CaptureHost {
    /// Launch a host that connects to `hub` right away
    pub fn spawn(
        hub: ConnectionHub,
        config: &ProxZoomConfig,
        camera: Arc<dyn CameraSource>,
        detector: Arc<dyn LandmarkDetector>,
    ) -> CaptureHostHandle {
        let id = Uuid::new_v4();
        let streaming = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let cancellation_token = CancellationToken::new();

        let (outbox, commands, link_task) = SessionLink::spawn(
            hub,
            config.channel.clone(),
            Arc::clone(&streaming),
            cancellation_token.child_token(),
        );
        let session = CaptureSession::new(config, camera, detector, outbox);
        let observer = session.observer();

        let task = tokio::spawn(Self::run(
            session,
            commands,
            link_task,
            Arc::clone(&streaming),
            Arc::clone(&alive),
            cancellation_token.clone(),
        ));

        info!("Capture host {} launched", id);

        CaptureHostHandle {
            id,
            streaming,
            alive,
            observer,
            cancellation_token,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(
        mut session: CaptureSession,
        mut commands: mpsc::UnboundedReceiver<ControllerCommand>,
        link_task: JoinHandle<()>,
        streaming: Arc<AtomicBool>,
        alive: Arc<AtomicBool>,
        cancellation_token: CancellationToken,
    ) {
        loop {
            let command = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                command = commands.recv() => command,
            };

            match command {
                Some(ControllerCommand::StartCamera { generation }) => {
                    streaming.store(true, Ordering::SeqCst);
                    if session.start(generation).await.is_err() {
                        streaming.store(false, Ordering::SeqCst);
                    }
                }
                Some(ControllerCommand::StopCamera) => {
                    streaming.store(false, Ordering::SeqCst);
                    session.stop().await;
                }
                Some(ControllerCommand::ResetBaseline { generation }) => {
                    session.reset_baseline(generation)
                }
                None => {
                    info!("Keepalive link ended, capture host shutting down");
                    break;
                }
            }
        }

        streaming.store(false, Ordering::SeqCst);
        session.stop().await;

        cancellation_token.cancel();
        if let Err(e) = link_task.await {
            warn!("Session link task failed: {}", e);
        }

        alive.store(false, Ordering::SeqCst);
        debug!("Capture host task exited");
    }
}

/// Controller's handle on a running capture host
pub struct CaptureHostHandle {
    id: Uuid,
    streaming: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    observer: SessionObserver,
    cancellation_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureHostHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// False once the host has torn down, on its own or through `close`
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.cancellation_token.is_cancelled()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> &SessionObserver {
        &self.observer
    }

    /// Tear the host down; returns after the camera is released
    pub async fn close(&self) {
        self.cancellation_token.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Capture host task failed: {}", e);
            }
            info!("Capture host {} closed", self.id);
        }
    }
}

impl Drop for CaptureHostHandle {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
