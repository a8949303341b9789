use super::*;
use crate::config::{CameraConfig, FacingMode};
use crate::error::CameraError;

fn config() -> CameraConfig {
    CameraConfig::default()
}

#[tokio::test]
async fn test_denied_permission_skips_media_request() {
    let devices = MockMediaDevices::new(1280, 720).with_permission(PermissionState::Denied);

    let result = acquire_stream(&devices, &config()).await;

    assert!(matches!(result, Err(CameraError::PermissionDenied)));
    assert!(devices.requests().is_empty());
    assert_eq!(devices.opened_streams(), 0);
}

#[tokio::test]
async fn test_preferred_constraints_accepted() {
    let devices = MockMediaDevices::new(1280, 720);

    let acquired = acquire_stream(&devices, &config()).await.unwrap();

    assert_eq!(acquired.profile, ConstraintProfile::Preferred);
    assert!(acquired.stream.is_active());
    let requests = devices.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0], ConstraintSet::preferred(&config()));
}

#[tokio::test]
async fn test_rejected_preferred_constraints_fall_back() {
    // Rear camera only, below the preferred resolution range
    let devices = MockMediaDevices::new(320, 240).with_facing(FacingMode::Environment);

    let acquired = acquire_stream(&devices, &config()).await.unwrap();

    assert_eq!(acquired.profile, ConstraintProfile::Fallback);
    let requests = devices.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].is_minimal());
    assert_eq!(devices.active_streams(), 1);
}

#[tokio::test]
async fn test_fallback_can_be_disabled() {
    let devices = MockMediaDevices::new(320, 240);
    let mut config = config();
    config.fallback_constraints = false;

    let result = acquire_stream(&devices, &config).await;

    assert!(matches!(result, Err(CameraError::Unknown(ref m)) if m.contains("width")));
    assert_eq!(devices.requests().len(), 1);
}

#[tokio::test]
async fn test_unclassified_error_is_retried_once() {
    let devices = MockMediaDevices::new(1280, 720);
    devices.push_error(DeviceError::Other("AbortError: device vanished".to_string()));
    devices.push_error(DeviceError::Other("AbortError: device vanished".to_string()));

    let result = acquire_stream(&devices, &config()).await;

    assert_eq!(
        result.err(),
        Some(CameraError::Unknown("AbortError: device vanished".to_string()))
    );
    assert_eq!(devices.requests().len(), 2);
    assert_eq!(devices.active_streams(), 0);
}

#[tokio::test]
async fn test_busy_device_is_not_retried() {
    let devices = MockMediaDevices::new(1280, 720);
    devices.set_busy(true);

    let result = acquire_stream(&devices, &config()).await;

    assert!(matches!(result, Err(CameraError::DeviceBusy)));
    assert_eq!(devices.requests().len(), 1);
}

#[tokio::test]
async fn test_missing_camera() {
    let devices = MockMediaDevices::new(1280, 720).without_camera();
    let result = acquire_stream(&devices, &config()).await;
    assert!(matches!(result, Err(CameraError::NoDeviceFound)));
    assert_eq!(devices.requests().len(), 1);
}

#[tokio::test]
async fn test_failed_permission_query_still_requests() {
    let devices = MockMediaDevices::new(1280, 720).with_failing_permission_query();
    let acquired = acquire_stream(&devices, &config()).await.unwrap();
    assert_eq!(acquired.profile, ConstraintProfile::Preferred);
}

#[tokio::test]
async fn test_prompt_denied_by_user() {
    let devices = MockMediaDevices::new(1280, 720).with_permission(PermissionState::Prompt);
    devices.push_error(DeviceError::NotAllowed);

    let result = acquire_stream(&devices, &config()).await;

    assert!(matches!(result, Err(CameraError::PermissionDenied)));
    assert_eq!(devices.requests().len(), 1);
}

#[tokio::test]
async fn test_stopping_stream_ends_feed() {
    let devices = MockMediaDevices::new(64, 48);
    let stream = devices
        .get_user_media(&ConstraintSet::minimal())
        .await
        .unwrap();
    let feed = stream.subscribe();
    assert!(matches!(*feed.borrow(), StreamFeed::Frame(_)));

    stream.stop();
    stream.stop();

    assert!(!stream.is_active());
    assert!(matches!(*feed.borrow(), StreamFeed::Ended));
    assert_eq!(devices.stop_calls(), 2);
    assert_eq!(devices.active_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_interval_mode_produces_frames() {
    let devices = MockMediaDevices::new(32, 24)
        .with_frame_mode(MockFrameMode::Interval(std::time::Duration::from_millis(100)));
    let stream = devices
        .get_user_media(&ConstraintSet::minimal())
        .await
        .unwrap();
    let mut feed = stream.subscribe();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        feed.changed().await.unwrap();
        if let StreamFeed::Frame(frame) = &*feed.borrow_and_update() {
            assert!(frame.is_decodable());
            seen.push(frame.id);
        }
    }
    assert_eq!(seen, vec![0, 1, 2]);
    stream.stop();
}
