use super::*;
use crate::camera::{CameraSource, MockCamera};
use crate::capture::{CaptureHost, HostFactory};
use crate::channel::{
    ConnectionHub, ControllerCommand, SessionEvent, SessionMessage, SupervisorEvent,
    KEEPALIVE_PORT,
};
use crate::config::{FaceLossPolicy, ProxZoomConfig};
use crate::error::{CameraError, CameraFailure, ChannelError, ProxZoomError};
use crate::events::ZoomEvent;
use crate::inference::ScriptedDetector;
use crate::settings::{Settings, SettingsStore};
use crate::zoom::{Destination, FaceLossAction, RecordingDriver};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SITE: &str = "news.example";

fn test_config() -> ProxZoomConfig {
    let mut config = ProxZoomConfig::default();
    config.camera.resolution = (32, 24);
    config
}

/// Five samples at 0.2 for the baseline, then the face backs off to 0.16
fn calibrate_then_farther() -> Vec<Option<f64>> {
    let mut spreads = vec![Some(0.2); 5];
    spreads.push(Some(0.16));
    spreads
}

struct Harness {
    orchestrator: ProximityZoomOrchestrator,
    camera: MockCamera,
    driver: Arc<RecordingDriver>,
    destination: Destination,
}

fn harness_with(
    config: ProxZoomConfig,
    camera: MockCamera,
    spreads: Vec<Option<f64>>,
    settings: Settings,
) -> Harness {
    let driver = Arc::new(RecordingDriver::default());
    let destination = Destination::new(7, SITE);
    let detector = Arc::new(
        ScriptedDetector::from_spreads(config.sampling.anchor_keypoints, spreads).ready(),
    );

    let orchestrator = ProximityZoomOrchestrator::builder()
        .config(config)
        .settings(Arc::new(SettingsStore::new(settings)))
        .capture(Arc::new(camera.clone()), detector)
        .driver(driver.clone())
        .destination(destination.clone())
        .build()
        .unwrap();

    Harness {
        orchestrator,
        camera,
        driver,
        destination,
    }
}

fn harness() -> Harness {
    harness_with(
        test_config(),
        MockCamera::new(),
        calibrate_then_farther(),
        Settings::default(),
    )
}

/// Handle supervisor events until one matches
async fn pump_until<F>(orchestrator: &mut ProximityZoomOrchestrator, done: F) -> SupervisorEvent
where
    F: Fn(&SupervisorEvent) -> bool,
{
    loop {
        let event = orchestrator
            .poll_channel(Duration::from_secs(10))
            .await
            .expect("supervisor event");
        if done(&event) {
            return event;
        }
    }
}

fn is_reading(event: &SupervisorEvent) -> bool {
    matches!(event, SupervisorEvent::Session(SessionEvent::Reading(_)))
}

/// Handle readings until `fresh` of the current generation went through.
/// Returns how many older ones arrived in the meantime.
async fn drain_readings(orchestrator: &mut ProximityZoomOrchestrator, fresh: usize) -> usize {
    let (mut stale, mut current) = (0, 0);
    while current < fresh {
        let event = pump_until(orchestrator, is_reading).await;
        if let SupervisorEvent::Session(SessionEvent::Reading(reading)) = event {
            if reading.generation == orchestrator.generation() {
                current += 1;
            } else {
                stale += 1;
            }
        }
    }
    stale
}

/// Factory whose hosts connect to a hub the supervisor never listens on
fn unreachable_host_factory(config: &ProxZoomConfig, camera: &MockCamera) -> HostFactory {
    let detector = Arc::new(
        ScriptedDetector::from_spreads(config.sampling.anchor_keypoints, calibrate_then_farther())
            .ready(),
    );
    let elsewhere = ConnectionHub::new();
    let host_config = config.clone();
    let host_camera: Arc<dyn CameraSource> = Arc::new(camera.clone());
    Arc::new(move |_: &ConnectionHub| {
        CaptureHost::spawn(
            elsewhere.clone(),
            &host_config,
            Arc::clone(&host_camera),
            detector.clone(),
        )
    })
}

#[tokio::test(start_paused = true)]
async fn test_builder_requires_driver_and_capture() {
    let missing_driver = ProximityZoomOrchestrator::builder()
        .capture(
            Arc::new(MockCamera::new()),
            Arc::new(ScriptedDetector::from_spreads((0, 1), [None])),
        )
        .build();
    assert!(matches!(missing_driver, Err(ProxZoomError::System { .. })));

    let missing_capture = ProximityZoomOrchestrator::builder()
        .driver(Arc::new(RecordingDriver::default()))
        .build();
    assert!(matches!(missing_capture, Err(ProxZoomError::System { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_enable_streams_readings_into_zoom() {
    let Harness {
        mut orchestrator,
        camera,
        driver,
        destination,
    } = harness();

    orchestrator.enable().await.unwrap();
    let status = orchestrator.status();
    assert!(status.enabled);
    assert!(status.last_error.is_none());

    pump_until(&mut orchestrator, |event| {
        *event == SupervisorEvent::Session(SessionEvent::CameraReady)
    })
    .await;
    assert!(orchestrator.status().camera_active);
    assert!(camera.is_acquired());

    pump_until(&mut orchestrator, is_reading).await;

    // Ratio 0.8 sits below the deadband: (0.95 - 0.8) / 0.65 of the way to 2.5
    let (key, zoom) = driver.last_command().expect("zoom command");
    assert_eq!(key, destination.key);
    assert!((zoom - 1.346).abs() < 1e-3);
    assert_eq!(orchestrator.actuator().applied(destination.key), Some(zoom));
    assert!((orchestrator.smoothed_ratio().unwrap() - 0.8).abs() < 1e-9);

    // Same ratio again stays under the minimum delta
    pump_until(&mut orchestrator, is_reading).await;
    assert_eq!(driver.command_count(), 1);

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zoom_applied_is_announced() {
    let Harness {
        mut orchestrator, ..
    } = harness();
    let mut events = orchestrator.event_bus().subscribe();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;

    let mut applied = None;
    while let Ok(Some(event)) = events.try_recv() {
        if let ZoomEvent::ZoomApplied { from, to, .. } = event {
            applied = Some((from, to));
        }
    }
    let (from, to) = applied.expect("zoom announcement");
    assert_eq!(from, 1.0);
    assert!(to > 1.3);

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_excluded_site_never_zooms() {
    let mut settings = Settings::default();
    settings.excluded_sites.insert(SITE.to_string());
    let Harness {
        mut orchestrator,
        driver,
        ..
    } = harness_with(
        test_config(),
        MockCamera::new(),
        calibrate_then_farther(),
        settings,
    );

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    pump_until(&mut orchestrator, is_reading).await;

    assert_eq!(driver.command_count(), 0);
    assert!(orchestrator.smoothed_ratio().is_some());

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_toggle_exclusion_resets_zoom() {
    let Harness {
        mut orchestrator,
        driver,
        destination,
        ..
    } = harness();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    assert_eq!(driver.command_count(), 1);

    assert_eq!(orchestrator.toggle_exclusion().await, Some(true));
    assert_eq!(*driver.resets.lock(), vec![destination.key]);
    assert!(orchestrator.settings().current().is_excluded(SITE));

    pump_until(&mut orchestrator, is_reading).await;
    assert_eq!(driver.command_count(), 1);

    assert_eq!(orchestrator.toggle_exclusion().await, Some(false));
    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_port_timeout_closes_host() {
    let config = test_config();
    let camera = MockCamera::new();
    let factory = unreachable_host_factory(&config, &camera);

    let mut orchestrator = ProximityZoomOrchestrator::builder()
        .config(config)
        .host_factory(factory)
        .driver(Arc::new(RecordingDriver::default()))
        .destination(Destination::new(1, SITE))
        .build()
        .unwrap();

    let err = orchestrator.enable().await.unwrap_err();
    assert!(matches!(
        err,
        ProxZoomError::Channel(ChannelError::PortTimeout { timeout_ms: 2000 })
    ));

    let status = orchestrator.status();
    assert!(!status.enabled);
    assert!(!status.camera_active);
    assert_eq!(status.last_error, Some(StatusError::PortTimeout));
    assert!(!orchestrator.registry().has_live_host().await);
    assert_eq!(camera.acquisitions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connection_lost_before_start_closes_host() {
    let config = test_config();
    let camera = MockCamera::new();
    let factory = unreachable_host_factory(&config, &camera);

    let mut orchestrator = ProximityZoomOrchestrator::builder()
        .config(config)
        .host_factory(factory)
        .driver(Arc::new(RecordingDriver::default()))
        .destination(Destination::new(1, SITE))
        .build()
        .unwrap();

    // A peer connects, then severs before the supervisor has noticed
    let port = orchestrator.supervisor().hub().connect(KEEPALIVE_PORT).unwrap();
    let (writer, _reader) = port.split();
    pump_until(&mut orchestrator, |event| {
        *event == SupervisorEvent::Connected { epoch: 1 }
    })
    .await;
    writer.disconnect();

    let err = orchestrator.enable().await.unwrap_err();
    assert!(matches!(
        err,
        ProxZoomError::Channel(ChannelError::Disconnected { .. })
    ));

    let status = orchestrator.status();
    assert!(!status.enabled);
    assert!(!status.camera_active);
    assert!(!orchestrator.registry().has_live_host().await);
    assert_eq!(camera.acquisitions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_keeps_baseline_and_camera() {
    let Harness {
        mut orchestrator,
        camera,
        ..
    } = harness();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    let host = orchestrator.registry().current().await.expect("live host");
    let baseline = host.session().calibration().baseline;
    assert!(baseline.is_some());

    orchestrator.supervisor().disconnect();
    pump_until(&mut orchestrator, |event| {
        matches!(event, SupervisorEvent::Disconnected { .. })
    })
    .await;
    assert!(!orchestrator.status().camera_active);

    pump_until(&mut orchestrator, |event| {
        *event == SupervisorEvent::Connected { epoch: 2 }
    })
    .await;
    pump_until(&mut orchestrator, |event| {
        *event == SupervisorEvent::Session(SessionEvent::CameraReady)
    })
    .await;

    assert!(orchestrator.status().camera_active);
    assert!(orchestrator.status().enabled);
    assert_eq!(host.session().calibration().baseline, baseline);
    assert_eq!(camera.acquisitions(), 1);

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disable_resets_zoom_and_releases_camera() {
    let Harness {
        mut orchestrator,
        camera,
        driver,
        destination,
    } = harness();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    assert!(orchestrator.actuator().target(destination.key).is_some());

    orchestrator.disable().await.unwrap();

    let status = orchestrator.status();
    assert!(!status.enabled);
    assert!(!status.camera_active);
    assert!(!camera.is_acquired());
    assert_eq!(*driver.resets.lock(), vec![destination.key]);
    assert!(orchestrator.actuator().target(destination.key).is_none());
    assert!(orchestrator.smoothed_ratio().is_none());
    assert!(!orchestrator.registry().has_live_host().await);

    // Readings that were already in flight are ignored
    let commands = driver.command_count();
    while orchestrator
        .poll_channel(Duration::from_millis(100))
        .await
        .is_some()
    {}
    assert_eq!(driver.command_count(), commands);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_enabled_round_trip() {
    let Harness {
        mut orchestrator,
        camera,
        ..
    } = harness();

    orchestrator.toggle_enabled().await.unwrap();
    assert!(orchestrator.status().enabled);
    pump_until(&mut orchestrator, |event| {
        *event == SupervisorEvent::Session(SessionEvent::CameraReady)
    })
    .await;

    orchestrator.toggle_enabled().await.unwrap();
    assert!(!orchestrator.status().enabled);
    assert!(!camera.is_acquired());
}

#[tokio::test(start_paused = true)]
async fn test_switch_destination_recaptures_baseline() {
    let Harness {
        mut orchestrator,
        driver,
        destination,
        ..
    } = harness();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    let host = orchestrator.registry().current().await.expect("live host");
    assert!(host.session().calibration().baseline.is_some());

    // Same destination is a no-op
    orchestrator.switch_destination(destination.clone());
    assert!(orchestrator.smoothed_ratio().is_some());

    let other = Destination::new(8, "docs.example");
    orchestrator.switch_destination(other.clone());
    assert_eq!(orchestrator.destination(), Some(&other));
    assert!(orchestrator.smoothed_ratio().is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(host.session().calibration().baseline.is_none());

    // The previous destination keeps its zoom
    assert!(orchestrator.actuator().applied(destination.key).is_some());
    assert!(driver.resets.lock().is_empty());

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_switch_drops_readings_measured_before_it() {
    let Harness {
        mut orchestrator,
        driver,
        destination,
        ..
    } = harness();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    assert_eq!(driver.command_count(), 1);

    // Readings against the 0.2 baseline pile up unhandled
    tokio::time::sleep(Duration::from_secs(1)).await;

    let other = Destination::new(8, "docs.example");
    orchestrator.switch_destination(other.clone());
    assert_eq!(orchestrator.generation(), 2);

    // The face now sits at 0.16 and becomes the new baseline
    let stale = drain_readings(&mut orchestrator, 5).await;
    assert!(stale > 0);

    // Ratio 1.0 against the new baseline stays neutral, so nothing is sent there
    assert!(driver.commands.lock().iter().all(|(key, _)| *key != other.key));
    assert_eq!(orchestrator.actuator().applied(other.key), Some(1.0));
    assert!((orchestrator.smoothed_ratio().unwrap() - 1.0).abs() < 1e-9);
    assert!(orchestrator.actuator().applied(destination.key).is_some());

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_baseline_reset_drops_readings_measured_before_it() {
    let Harness {
        mut orchestrator,
        driver,
        destination,
        ..
    } = harness();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    let before = driver.command_count();
    assert_eq!(before, 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    orchestrator.reset_baseline();

    let stale = drain_readings(&mut orchestrator, 5).await;
    assert!(stale > 0);

    // Only the recaptured baseline is used: ratio 1.0 puts zoom back to neutral
    assert!((orchestrator.smoothed_ratio().unwrap() - 1.0).abs() < 1e-9);
    assert!(driver.commands.lock()[before..]
        .iter()
        .all(|&(key, zoom)| key == destination.key && zoom == 1.0));
    assert_eq!(driver.last_command(), Some((destination.key, 1.0)));

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_destination_closed_drops_state() {
    let Harness {
        mut orchestrator,
        driver,
        destination,
        ..
    } = harness();

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;

    driver.close(destination.key);
    orchestrator.destination_closed(destination.key);

    assert!(orchestrator.destination().is_none());
    assert!(orchestrator.actuator().target(destination.key).is_none());
    assert!(orchestrator.smoothed_ratio().is_none());

    // Readings with nowhere to go are dropped
    let event = pump_until(&mut orchestrator, is_reading).await;
    if let SupervisorEvent::Session(SessionEvent::Reading(reading)) = event {
        assert!(orchestrator.handle_reading(reading).await.is_none());
    }

    orchestrator.disable().await.unwrap();
    assert!(driver.resets.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_camera_error_is_reported() {
    let Harness {
        mut orchestrator, ..
    } = harness_with(
        test_config(),
        MockCamera::failing(CameraError::PermissionDenied { device: 0 }),
        calibrate_then_farther(),
        Settings::default(),
    );

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, |event| {
        matches!(event, SupervisorEvent::Session(SessionEvent::CameraError(_)))
    })
    .await;

    let status = orchestrator.status();
    assert!(status.enabled);
    assert!(!status.camera_active);
    assert_eq!(
        status.last_error,
        Some(StatusError::Camera(CameraFailure::PermissionDenied))
    );

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_face_loss_neutral_policy() {
    let mut config = test_config();
    config.face_loss.policy = FaceLossPolicy::Neutral;
    let mut spreads = calibrate_then_farther();
    spreads.push(None);
    let Harness {
        mut orchestrator,
        driver,
        destination,
        ..
    } = harness_with(config, MockCamera::new(), spreads, Settings::default());

    orchestrator.enable().await.unwrap();
    pump_until(&mut orchestrator, is_reading).await;
    assert!(orchestrator.actuator().applied(destination.key).unwrap() > 1.3);

    assert_eq!(orchestrator.check_face_loss().await, FaceLossAction::None);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(
        orchestrator.check_face_loss().await,
        FaceLossAction::ApplyNeutral
    );
    assert_eq!(driver.last_command(), Some((destination.key, 1.0)));
    assert!(orchestrator.smoothed_ratio().is_none());

    // Applied once until the face comes back
    assert_eq!(orchestrator.check_face_loss().await, FaceLossAction::None);

    orchestrator.disable().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handle_request_dispatch() {
    let Harness {
        mut orchestrator, ..
    } = harness();

    assert!(orchestrator
        .handle_request(ZoomEvent::ToggleEnableRequested)
        .await
        .is_none());
    assert!(orchestrator.status().enabled);

    let other = Destination::new(9, "docs.example");
    orchestrator
        .handle_request(ZoomEvent::DestinationChanged {
            destination: other.clone(),
        })
        .await;
    assert_eq!(orchestrator.destination(), Some(&other));

    orchestrator
        .handle_request(ZoomEvent::DestinationClosed { key: other.key })
        .await;
    assert!(orchestrator.destination().is_none());

    let reason = orchestrator
        .handle_request(ZoomEvent::ShutdownRequested {
            reason: "test".to_string(),
        })
        .await;
    assert_eq!(reason, Some(ShutdownReason::UserRequest));

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    assert!(!orchestrator.status().enabled);
    assert!(!orchestrator.supervisor().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown_request() {
    let Harness {
        mut orchestrator, ..
    } = harness();
    let event_bus = orchestrator.event_bus();

    orchestrator.start().await.unwrap();
    assert!(orchestrator.status().enabled);

    let requester = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        event_bus
            .publish(ZoomEvent::ShutdownRequested {
                reason: "done".to_string(),
            })
            .await
    });

    let exit_code = orchestrator.run().await.unwrap();
    assert_eq!(exit_code, 0);
    assert!(requester.await.unwrap().is_ok());
    assert!(!orchestrator.status().enabled);
}

#[tokio::test(start_paused = true)]
async fn test_run_severs_connection_one_window_after_last_heartbeat() {
    let Harness {
        mut orchestrator, ..
    } = harness();
    let event_bus = orchestrator.event_bus();

    // A peer that sends a single heartbeat and then goes quiet
    let port = orchestrator.supervisor().hub().connect(KEEPALIVE_PORT).unwrap();
    let (writer, mut reader) = port.split();
    let started = Instant::now();
    let peer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        writer.post(&SessionMessage::Heartbeat).unwrap();
        while reader.recv::<ControllerCommand>().await.is_some() {}
        started.elapsed()
    });

    let requester = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        event_bus
            .publish(ZoomEvent::ShutdownRequested {
                reason: "done".to_string(),
            })
            .await
    });

    assert_eq!(orchestrator.run().await.unwrap(), 0);
    assert!(requester.await.unwrap().is_ok());

    // Heartbeat at 10s plus the 25s window
    let severed_after = peer.await.unwrap();
    assert!(severed_after >= Duration::from_secs(35));
    assert!(severed_after < Duration::from_secs(36));
}
