use super::*;
use crate::config::CameraConfig;
use crate::error::{CameraError, ProxZoomError};
use std::time::Duration;

fn create_test_request() -> CaptureRequest {
    CaptureRequest::from_config(&CameraConfig {
        index: 0,
        resolution: (32, 24),
        fps: 30,
    })
}

#[test]
fn test_capture_request_from_config() {
    let request = create_test_request();
    assert_eq!(request.device_index, 0);
    assert_eq!((request.width, request.height), (32, 24));
    assert_eq!(request.max_fps, 30);
}

#[tokio::test(start_paused = true)]
async fn test_mock_camera_produces_frames() {
    let camera = MockCamera::new();
    assert!(camera.latest_frame().is_none());

    camera.acquire(&create_test_request()).await.unwrap();
    assert!(camera.is_acquired());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let frame = camera.latest_frame().expect("frame after warmup");
    assert_eq!((frame.width, frame.height), (32, 24));
    assert!(frame.validate_size());
    assert!(camera.frames_generated() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_mock_camera_release_is_idempotent() {
    let camera = MockCamera::new();

    // Never acquired: release is a no-op
    camera.release().await;
    assert_eq!(camera.releases(), 0);

    camera.acquire(&create_test_request()).await.unwrap();
    camera.release().await;
    camera.release().await;

    assert!(!camera.is_acquired());
    assert!(camera.latest_frame().is_none());
    assert_eq!(camera.releases(), 1);

    // Generation stopped with the release
    let generated = camera.frames_generated();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(camera.frames_generated(), generated);
}

#[tokio::test]
async fn test_mock_camera_failure() {
    let camera = MockCamera::failing(CameraError::PermissionDenied { device: 0 });

    let err = camera.acquire(&create_test_request()).await.unwrap_err();
    assert!(matches!(err, CameraError::PermissionDenied { device: 0 }));
    assert!(!camera.is_acquired());
    assert_eq!(camera.acquisitions(), 1);

    camera.set_failure(None);
    camera.acquire(&create_test_request()).await.unwrap();
    assert!(camera.is_acquired());
    camera.release().await;
}

#[test]
fn test_camera_builder_validation() {
    let result = CameraBuilder::new().build();
    match result {
        Err(ProxZoomError::System { message }) => {
            assert!(message.contains("Camera backend must be specified"))
        }
        _ => panic!("Expected system error for missing backend"),
    }

    assert!(CameraBuilder::new()
        .backend(CameraBackend::Mock)
        .build()
        .is_ok());
}
