use super::*;
use crate::camera::{CameraSource, MockCamera};
use crate::channel::{
    pair, ChannelSupervisor, ConnectionHub, ControllerCommand, Outbox, PortReader, SessionEvent,
    SessionMessage, SupervisorEvent, KEEPALIVE_PORT,
};
use crate::config::ProxZoomConfig;
use crate::error::{CameraError, CameraFailure};
use crate::inference::ScriptedDetector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn test_config() -> ProxZoomConfig {
    let mut config = ProxZoomConfig::default();
    config.camera.resolution = (32, 24);
    config
}

fn detector(config: &ProxZoomConfig, spreads: &[Option<f64>]) -> Arc<ScriptedDetector> {
    Arc::new(
        ScriptedDetector::from_spreads(config.sampling.anchor_keypoints, spreads.to_vec()).ready(),
    )
}

/// Five samples at 0.2 then 0.25 forever
fn calibrate_then_closer() -> Vec<Option<f64>> {
    vec![Some(0.2), Some(0.2), Some(0.2), Some(0.2), Some(0.2), Some(0.25)]
}

fn session_with_port(
    config: &ProxZoomConfig,
    camera: &MockCamera,
    detector: Arc<ScriptedDetector>,
) -> (CaptureSession, PortReader, PortReader) {
    let (session_end, controller_end) = pair(KEEPALIVE_PORT);
    let (writer, inbound) = session_end.split();
    let (_, reader) = controller_end.split();
    let session = CaptureSession::new(
        config,
        Arc::new(camera.clone()),
        detector,
        Outbox::attached(writer),
    );
    (session, reader, inbound)
}

async fn next_message(reader: &mut PortReader) -> SessionMessage {
    timeout(Duration::from_secs(10), reader.recv::<SessionMessage>())
        .await
        .expect("session message")
        .expect("port open")
        .expect("decodable")
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SupervisorEvent>) -> SupervisorEvent {
    timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("supervisor event")
        .expect("supervisor alive")
}

async fn next_reading(events: &mut mpsc::UnboundedReceiver<SupervisorEvent>) -> (f64, f64) {
    loop {
        if let SupervisorEvent::Session(SessionEvent::Reading(reading)) = next_event(events).await
        {
            return (reading.baseline, reading.ratio);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_streams_readings_after_calibration() {
    let config = test_config();
    let camera = MockCamera::new();
    let (mut session, mut reader, _inbound) =
        session_with_port(&config, &camera, detector(&config, &calibrate_then_closer()));

    session.start(1).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(next_message(&mut reader).await, SessionMessage::CameraReady);

    match next_message(&mut reader).await {
        SessionMessage::DistanceReading(reading) => {
            assert!((reading.spread - 0.25).abs() < 1e-9);
            assert!((reading.baseline - 0.2).abs() < 1e-9);
            assert!((reading.ratio - 1.25).abs() < 1e-9);
        }
        other => panic!("Expected a reading, got {:?}", other),
    }

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_face_frames_do_not_count_toward_calibration() {
    let config = test_config();
    let camera = MockCamera::new();
    let mut spreads = vec![None, None];
    spreads.extend([Some(0.2); 5]);
    spreads.push(Some(0.3));
    let (mut session, mut reader, _inbound) =
        session_with_port(&config, &camera, detector(&config, &spreads));

    session.start(1).await.unwrap();
    assert_eq!(next_message(&mut reader).await, SessionMessage::CameraReady);

    match next_message(&mut reader).await {
        SessionMessage::DistanceReading(reading) => {
            assert!((reading.baseline - 0.2).abs() < 1e-9);
            assert!((reading.ratio - 1.5).abs() < 1e-9);
        }
        other => panic!("Expected a reading, got {:?}", other),
    }

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_failure_reports_reason() {
    let config = test_config();
    let camera = MockCamera::failing(CameraError::PermissionDenied { device: 0 });
    let (mut session, mut reader, _inbound) =
        session_with_port(&config, &camera, detector(&config, &calibrate_then_closer()));

    let err = session.start(1).await.unwrap_err();
    assert_eq!(err.reason(), CameraFailure::PermissionDenied);
    assert_eq!(
        session.state(),
        SessionState::Failed(CameraFailure::PermissionDenied)
    );
    assert_eq!(
        next_message(&mut reader).await,
        SessionMessage::CameraError {
            error: CameraFailure::PermissionDenied
        }
    );
    assert!(!camera.is_acquired());

    // A later stop is still safe
    session.stop().await;
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_sampling_waits_for_detector() {
    let config = test_config();
    let camera = MockCamera::new();
    let detector = Arc::new(
        ScriptedDetector::from_spreads(config.sampling.anchor_keypoints, calibrate_then_closer())
            .with_init_delay(Duration::from_secs(10)),
    );
    let (mut session, mut reader, _inbound) =
        session_with_port(&config, &camera, Arc::clone(&detector));

    session.start(1).await.unwrap();
    assert_eq!(next_message(&mut reader).await, SessionMessage::CameraReady);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(detector.detections(), 0);
    assert!(session.calibration().pending.is_empty());

    // Once the model is loaded readings start flowing
    assert!(matches!(
        next_message(&mut reader).await,
        SessionMessage::DistanceReading(_)
    ));
    assert!(detector.detections() >= 6);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_clears_calibration() {
    let config = test_config();
    let camera = MockCamera::new();
    let (mut session, mut reader, _inbound) =
        session_with_port(&config, &camera, detector(&config, &calibrate_then_closer()));

    // Never started
    session.stop().await;
    assert_eq!(camera.releases(), 0);

    session.start(1).await.unwrap();
    next_message(&mut reader).await;
    next_message(&mut reader).await;
    assert!(session.calibration().baseline.is_some());

    session.stop().await;
    session.stop().await;

    assert_eq!(session.state(), SessionState::Idle);
    assert!(!camera.is_acquired());
    assert_eq!(camera.releases(), 1);
    assert_eq!(session.calibration(), Default::default());
}

#[tokio::test(start_paused = true)]
async fn test_reset_baseline_recaptures() {
    let config = test_config();
    let camera = MockCamera::new();
    let (mut session, mut reader, _inbound) =
        session_with_port(&config, &camera, detector(&config, &calibrate_then_closer()));

    session.start(1).await.unwrap();
    next_message(&mut reader).await;
    next_message(&mut reader).await;

    session.reset_baseline(2);
    let calibration = session.calibration();
    assert!(calibration.baseline.is_none());
    assert!(calibration.pending.is_empty());

    // The detector now reports 0.25 every frame, so that becomes the new baseline
    match next_message(&mut reader).await {
        SessionMessage::DistanceReading(reading) => {
            assert!((reading.baseline - 0.25).abs() < 1e-9);
            assert!((reading.ratio - 1.0).abs() < 1e-9);
            assert_eq!(reading.generation, 2);
        }
        other => panic!("Expected a reading, got {:?}", other),
    }

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_restart_under_new_generation_recalibrates() {
    let config = test_config();
    let camera = MockCamera::new();
    let (mut session, mut reader, _inbound) =
        session_with_port(&config, &camera, detector(&config, &calibrate_then_closer()));

    session.start(1).await.unwrap();
    next_message(&mut reader).await;
    next_message(&mut reader).await;

    // Same generation: only readiness is repeated, the baseline stays
    session.start(1).await.unwrap();
    assert_eq!(next_message(&mut reader).await, SessionMessage::CameraReady);
    let baseline = session.calibration().baseline.unwrap();
    assert!((baseline - 0.2).abs() < 1e-9);

    // A reset the session never saw is picked up from the start command
    session.start(3).await.unwrap();
    assert_eq!(session.calibration().baseline, None);
    loop {
        if let SessionMessage::DistanceReading(reading) = next_message(&mut reader).await {
            if reading.generation == 3 {
                assert!((reading.baseline - 0.25).abs() < 1e-9);
                break;
            }
            assert_eq!(reading.generation, 1);
        }
    }
    assert_eq!(camera.acquisitions(), 1);

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_host_runs_commands_from_controller() {
    let config = test_config();
    let hub = ConnectionHub::new();
    let (supervisor, mut events) = ChannelSupervisor::start(hub.clone(), config.channel.clone());
    let camera = MockCamera::new();
    let host = CaptureHost::spawn(
        hub.clone(),
        &config,
        Arc::new(camera.clone()),
        detector(&config, &calibrate_then_closer()),
    );

    assert_eq!(
        next_event(&mut events).await,
        SupervisorEvent::Connected { epoch: 1 }
    );
    assert!(host.is_alive());
    assert!(!host.is_streaming());

    supervisor.send(ControllerCommand::StartCamera { generation: 1 }).unwrap();
    assert_eq!(
        next_event(&mut events).await,
        SupervisorEvent::Session(SessionEvent::CameraReady)
    );
    assert!(host.is_streaming());

    let (baseline, ratio) = next_reading(&mut events).await;
    assert!((baseline - 0.2).abs() < 1e-9);
    assert!((ratio - 1.25).abs() < 1e-9);

    supervisor.send(ControllerCommand::StopCamera).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!host.is_streaming());
    assert!(!camera.is_acquired());
    assert_eq!(host.session().state(), SessionState::Idle);

    host.close().await;
    assert!(!host.is_alive());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_preserves_calibration() {
    let config = test_config();
    let hub = ConnectionHub::new();
    let (supervisor, mut events) = ChannelSupervisor::start(hub.clone(), config.channel.clone());
    let camera = MockCamera::new();
    let host = CaptureHost::spawn(
        hub.clone(),
        &config,
        Arc::new(camera.clone()),
        detector(&config, &calibrate_then_closer()),
    );

    next_event(&mut events).await;
    supervisor.send(ControllerCommand::StartCamera { generation: 1 }).unwrap();
    let (baseline, _) = next_reading(&mut events).await;

    supervisor.disconnect();
    assert_eq!(
        next_event(&mut events).await,
        SupervisorEvent::Disconnected { epoch: 1 }
    );

    // Drain readings until the new connection shows up
    loop {
        match next_event(&mut events).await {
            SupervisorEvent::Connected { epoch } => {
                assert_eq!(epoch, 2);
                break;
            }
            SupervisorEvent::Session(SessionEvent::Reading(_)) => {}
            other => panic!("Unexpected event {:?}", other),
        }
    }

    assert!(host.is_streaming());
    assert!(camera.is_acquired());
    assert_eq!(host.session().calibration().baseline, Some(baseline));

    let (after, _) = next_reading(&mut events).await;
    assert_eq!(after, baseline);

    host.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_camera_before_returning() {
    let config = test_config();
    let hub = ConnectionHub::new();
    let (supervisor, mut events) = ChannelSupervisor::start(hub.clone(), config.channel.clone());
    let camera = MockCamera::new();
    let host = CaptureHost::spawn(
        hub.clone(),
        &config,
        Arc::new(camera.clone()),
        detector(&config, &calibrate_then_closer()),
    );

    next_event(&mut events).await;
    supervisor.send(ControllerCommand::StartCamera { generation: 1 }).unwrap();
    next_event(&mut events).await;
    assert!(camera.is_acquired());

    host.close().await;
    assert!(!camera.is_acquired());
    assert!(!host.is_alive());
    assert_eq!(
        next_event(&mut events).await,
        SupervisorEvent::Disconnected { epoch: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_registry_get_or_create() {
    let config = test_config();
    let hub = ConnectionHub::new();
    let (supervisor, mut events) = ChannelSupervisor::start(hub.clone(), config.channel.clone());
    let camera = MockCamera::new();
    let registry = HostRegistry::with_session(
        hub.clone(),
        config.clone(),
        Arc::new(camera.clone()),
        detector(&config, &calibrate_then_closer()),
    );

    let (first, acquisition) = registry.ensure_host().await;
    assert_eq!(acquisition, HostAcquisition::Created);
    let (again, acquisition) = registry.ensure_host().await;
    assert_eq!(acquisition, HostAcquisition::Reused);
    assert_eq!(first.id(), again.id());
    next_event(&mut events).await;

    // An idle host whose link drops is gone for good
    supervisor.disconnect();
    next_event(&mut events).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!first.is_alive());
    assert!(!registry.has_live_host().await);

    let (replacement, acquisition) = registry.ensure_host().await;
    assert_eq!(acquisition, HostAcquisition::Created);
    assert_ne!(replacement.id(), first.id());
    assert_eq!(
        next_event(&mut events).await,
        SupervisorEvent::Connected { epoch: 2 }
    );

    registry.close().await;
    assert!(!replacement.is_alive());
    assert!(registry.current().await.is_none());
}
