use super::*;
use crate::camera::{ConstraintProfile, MediaDevices, MockFrameMode, MockMediaDevices, PermissionState};
use crate::config::{FacecheckConfig, FacingMode};
use crate::error::{CameraError, FacecheckError};
use crate::events::{EventFilter, EventReceiver, WorkflowEvent};
use crate::submit::{
    MemberId, SubmissionPurpose, SubmissionReceipt, SubmissionStrategy, VerificationRequest,
    VerificationResult,
};
use crate::surface::{DisplaySurface, VideoSurface};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Returns scripted results in order and records what was submitted
#[derive(Default)]
struct ScriptedSubmitter {
    results: Mutex<VecDeque<VerificationResult>>,
    delay: Duration,
    submitted: Mutex<Vec<VerificationRequest>>,
}

impl ScriptedSubmitter {
    fn new(results: Vec<VerificationResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.submitted.lock().len()
    }
}

#[async_trait]
impl SubmissionStrategy for ScriptedSubmitter {
    fn purpose(&self) -> SubmissionPurpose {
        SubmissionPurpose::Verification
    }

    async fn submit(&self, request: VerificationRequest) -> VerificationResult {
        self.submitted.lock().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| VerificationResult::TransportError("no scripted result".into()))
    }
}

fn created() -> VerificationResult {
    VerificationResult::Success(SubmissionReceipt {
        status: 201,
        record: None,
    })
}

struct Harness {
    workflow: Arc<CaptureWorkflow>,
    devices: MockMediaDevices,
    surface: Arc<VideoSurface>,
    submitter: Arc<ScriptedSubmitter>,
}

fn harness_with(
    config: FacecheckConfig,
    devices: MockMediaDevices,
    submitter: ScriptedSubmitter,
) -> Harness {
    let surface = Arc::new(VideoSurface::new());
    let submitter = Arc::new(submitter);
    let workflow = Arc::new(CaptureWorkflow::new(
        &config,
        Arc::new(devices.clone()) as Arc<dyn MediaDevices>,
        Arc::clone(&surface) as Arc<dyn DisplaySurface>,
        Arc::clone(&submitter) as Arc<dyn SubmissionStrategy>,
    ));
    Harness {
        workflow,
        devices,
        surface,
        submitter,
    }
}

fn harness(devices: MockMediaDevices, results: Vec<VerificationResult>) -> Harness {
    harness_with(FacecheckConfig::default(), devices, ScriptedSubmitter::new(results))
}

fn member() -> MemberId {
    MemberId::new("member-7").unwrap()
}

#[tokio::test]
async fn test_stop_camera_is_idempotent_in_every_state() {
    let h = harness(MockMediaDevices::new(640, 480), vec![]);

    // Never opened
    h.workflow.stop_camera();
    h.workflow.stop_camera();
    assert_eq!(h.workflow.state(), WorkflowState::Idle);

    h.workflow.start_camera().await.unwrap();
    assert_eq!(h.workflow.state(), WorkflowState::Live);
    assert_eq!(h.devices.active_streams(), 1);

    for _ in 0..4 {
        h.workflow.stop_camera();
        assert!(h.workflow.session_id().is_none());
        assert_eq!(h.devices.active_streams(), 0);
    }
    assert_eq!(h.devices.stop_calls(), 1);
    assert_eq!(h.workflow.state(), WorkflowState::Idle);
    assert!(!h.surface.is_attached());

    h.workflow.cancel();
    h.workflow.cancel();
    assert_eq!(h.workflow.state(), WorkflowState::Idle);
}

#[tokio::test]
async fn test_restart_while_live_leaves_single_session() {
    let h = harness(MockMediaDevices::new(640, 480), vec![]);

    h.workflow.start_camera().await.unwrap();
    let first = h.workflow.session_id().unwrap();
    h.workflow.start_camera().await.unwrap();
    let second = h.workflow.session_id().unwrap();

    assert_ne!(first, second);
    assert_eq!(h.devices.opened_streams(), 2);
    assert_eq!(h.devices.active_streams(), 1);
    assert!(h.workflow.is_camera_live());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_are_serialized() {
    let devices = MockMediaDevices::new(640, 480).with_acquire_delay(Duration::from_millis(300));
    let h = harness(devices, vec![]);

    let a = tokio::spawn({
        let workflow = Arc::clone(&h.workflow);
        async move { workflow.start_camera().await }
    });
    let b = tokio::spawn({
        let workflow = Arc::clone(&h.workflow);
        async move { workflow.start_camera().await }
    });

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(h.devices.opened_streams(), 2);
    assert_eq!(h.devices.active_streams(), 1);
    assert_eq!(h.workflow.state(), WorkflowState::Live);
}

#[tokio::test]
async fn test_capture_before_ready_fails() {
    let devices = MockMediaDevices::new(640, 480).with_frame_mode(MockFrameMode::Never);
    let mut config = FacecheckConfig::default();
    config.camera.ready_timeout_ms = 60_000;
    let h = harness_with(config, devices, ScriptedSubmitter::default());

    // Idle
    assert!(matches!(
        h.workflow.capture(),
        Err(FacecheckError::Camera(CameraError::CaptureFailed { .. }))
    ));

    let start = tokio::spawn({
        let workflow = Arc::clone(&h.workflow);
        async move { workflow.start_camera().await }
    });
    while h.devices.opened_streams() == 0 {
        tokio::task::yield_now().await;
    }

    // Stream open, surface still waiting for its first frame
    assert!(matches!(
        h.workflow.capture(),
        Err(FacecheckError::Camera(CameraError::CaptureFailed { .. }))
    ));
    assert!(h.workflow.captured_frame().is_none());

    h.workflow.cancel();
    assert!(matches!(
        start.await.unwrap(),
        Err(FacecheckError::Camera(CameraError::Cancelled))
    ));
    assert_eq!(h.devices.active_streams(), 0);
}

#[tokio::test]
async fn test_captured_frame_matches_surface_dimensions() {
    let h = harness(MockMediaDevices::new(800, 600), vec![]);
    h.workflow.start_camera().await.unwrap();

    let surface_dims = h.surface.dimensions();
    let frame = h.workflow.capture().unwrap();

    assert_eq!(surface_dims, (800, 600));
    assert_eq!(frame.dimensions(), surface_dims);
    assert!(!frame.is_empty());
    assert_eq!(h.workflow.state(), WorkflowState::Captured);
    // Capturing leaves the camera running
    assert!(h.workflow.is_camera_live());

    let again = h.workflow.capture().unwrap();
    assert_ne!(again.id(), frame.id());
    assert_eq!(h.workflow.captured_frame().unwrap().id(), again.id());
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_is_bounded() {
    let devices = MockMediaDevices::new(640, 480).with_frame_mode(MockFrameMode::Never);
    let h = harness(devices, vec![]);

    let started = tokio::time::Instant::now();
    let result = h.workflow.start_camera().await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(FacecheckError::Camera(CameraError::DeviceTimeout { timeout })) if timeout == Duration::from_millis(8000)
    ));
    assert!(elapsed >= Duration::from_millis(8000));
    assert!(elapsed < Duration::from_millis(8500));
    assert!(matches!(
        h.workflow.state(),
        WorkflowState::Failed(WorkflowFailure::Camera(CameraError::DeviceTimeout { .. }))
    ));
    assert_eq!(h.devices.active_streams(), 0);
    assert!(!h.surface.is_attached());
}

#[tokio::test]
async fn test_playback_failure_releases_camera() {
    let devices = MockMediaDevices::new(640, 480)
        .with_frame_mode(MockFrameMode::Fail("decoder crashed".to_string()));
    let h = harness(devices, vec![]);

    let err = h.workflow.start_camera().await.unwrap_err();

    assert!(matches!(
        err,
        FacecheckError::Camera(CameraError::PlaybackFailed { ref details }) if details == "decoder crashed"
    ));
    assert_eq!(h.devices.active_streams(), 0);
    assert!(h.workflow.session_id().is_none());
}

#[tokio::test]
async fn test_denied_permission_never_requests_media() {
    let devices = MockMediaDevices::new(640, 480).with_permission(PermissionState::Denied);
    let h = harness(devices, vec![]);
    let mut failures = EventReceiver::new(
        h.workflow.events(),
        EventFilter::EventTypes(vec!["camera_failed"]),
        "test",
    );

    let err = h.workflow.start_camera().await.unwrap_err();

    assert!(matches!(err, FacecheckError::Camera(CameraError::PermissionDenied)));
    assert!(h.devices.requests().is_empty());
    assert_eq!(
        h.workflow.state(),
        WorkflowState::Failed(WorkflowFailure::Camera(CameraError::PermissionDenied))
    );
    assert_eq!(failures.drain().len(), 1);
}

#[tokio::test]
async fn test_fallback_constraints_reach_live() {
    let devices = MockMediaDevices::new(320, 240).with_facing(FacingMode::Environment);
    let h = harness(devices, vec![]);
    let mut opened = EventReceiver::new(
        h.workflow.events(),
        EventFilter::EventTypes(vec!["session_opened"]),
        "test",
    );

    h.workflow.start_camera().await.unwrap();

    let requests = h.devices.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].is_minimal());
    assert!(requests[1].is_minimal());
    assert_eq!(h.workflow.state(), WorkflowState::Live);

    let events = opened.drain();
    assert!(matches!(
        &events[..],
        [WorkflowEvent::SessionOpened { profile, .. }] if *profile == ConstraintProfile::Fallback.to_string()
    ));
}

#[tokio::test]
async fn test_success_stops_camera_and_clears_frame() {
    let h = harness(MockMediaDevices::new(640, 480), vec![created()]);

    let result = h.workflow.run_attempt(member()).await.unwrap();

    assert!(result.is_success());
    assert_eq!(h.workflow.state(), WorkflowState::Succeeded);
    assert_eq!(h.devices.active_streams(), 0);
    assert!(h.workflow.captured_frame().is_none());
    assert!(!h.surface.is_attached());

    let submitted = h.submitter.submitted.lock();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].member_id.as_str(), "member-7");
    assert_eq!(submitted[0].frame.dimensions(), (640, 480));
}

#[tokio::test]
async fn test_rejection_keeps_camera_for_recapture() {
    let h = harness(
        MockMediaDevices::new(640, 480),
        vec![
            VerificationResult::Rejected("face mismatch".to_string()),
            created(),
        ],
    );

    let result = h.workflow.run_attempt(member()).await.unwrap();
    assert_eq!(result, VerificationResult::Rejected("face mismatch".to_string()));
    assert_eq!(
        h.workflow.state(),
        WorkflowState::Rejected {
            reason: "face mismatch".to_string()
        }
    );
    assert!(h.workflow.is_camera_live());
    assert!(h.workflow.captured_frame().is_none());

    // User retries with a fresh capture
    h.workflow.capture().unwrap();
    let retry = h.workflow.submit(member()).await.unwrap();
    assert!(retry.is_success());
    assert_eq!(h.submitter.calls(), 2);
    assert_eq!(h.devices.opened_streams(), 1);
}

#[tokio::test]
async fn test_rejection_can_stop_camera_by_policy() {
    let mut config = FacecheckConfig::default();
    config.workflow.keep_camera_on_reject = false;
    let h = harness_with(
        config,
        MockMediaDevices::new(640, 480),
        ScriptedSubmitter::new(vec![VerificationResult::Rejected("face mismatch".into())]),
    );

    h.workflow.run_attempt(member()).await.unwrap();

    assert!(matches!(h.workflow.state(), WorkflowState::Rejected { .. }));
    assert_eq!(h.devices.active_streams(), 0);
    assert!(h.workflow.capture().is_err());

    // Try again re-enters acquisition
    h.workflow.start_camera().await.unwrap();
    assert_eq!(h.workflow.state(), WorkflowState::Live);
}

#[tokio::test]
async fn test_transport_failure_keeps_frame_for_resubmit() {
    let h = harness(
        MockMediaDevices::new(640, 480),
        vec![
            VerificationResult::TransportError("connection refused".to_string()),
            created(),
        ],
    );

    let result = h.workflow.run_attempt(member()).await.unwrap();

    assert!(matches!(result, VerificationResult::TransportError(_)));
    assert_eq!(
        h.workflow.state(),
        WorkflowState::Failed(WorkflowFailure::Transport("connection refused".to_string()))
    );
    let kept = h.workflow.captured_frame().unwrap();
    assert_eq!(h.submitter.calls(), 1);

    let retry = h.workflow.submit(member()).await.unwrap();
    assert!(retry.is_success());
    assert_eq!(h.submitter.submitted.lock()[1].frame.id(), kept.id());
}

#[tokio::test]
async fn test_submit_requires_captured_frame() {
    let h = harness(MockMediaDevices::new(640, 480), vec![created()]);
    assert!(matches!(
        h.workflow.submit(member()).await,
        Err(FacecheckError::InvalidTransition { .. })
    ));

    h.workflow.start_camera().await.unwrap();
    assert!(h.workflow.submit(member()).await.is_err());
    assert_eq!(h.submitter.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_acquisition_stops_late_stream() {
    let devices = MockMediaDevices::new(640, 480).with_acquire_delay(Duration::from_secs(2));
    let h = harness(devices, vec![]);

    let start = tokio::spawn({
        let workflow = Arc::clone(&h.workflow);
        async move { workflow.start_camera().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.workflow.state(), WorkflowState::Requesting);

    h.workflow.cancel();
    assert_eq!(h.workflow.state(), WorkflowState::Idle);

    let result = start.await.unwrap();
    assert!(matches!(result, Err(FacecheckError::Camera(CameraError::Cancelled))));
    assert_eq!(h.devices.opened_streams(), 1);
    assert_eq!(h.devices.active_streams(), 0);
    assert_eq!(h.workflow.state(), WorkflowState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_submission() {
    let h = harness_with(
        FacecheckConfig::default(),
        MockMediaDevices::new(640, 480),
        ScriptedSubmitter::new(vec![created()]).with_delay(Duration::from_secs(5)),
    );
    h.workflow.start_camera().await.unwrap();
    h.workflow.capture().unwrap();

    let submit = tokio::spawn({
        let workflow = Arc::clone(&h.workflow);
        async move { workflow.submit(member()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.workflow.state(), WorkflowState::Submitting);

    h.workflow.cancel();

    assert!(matches!(
        submit.await.unwrap(),
        Err(FacecheckError::Camera(CameraError::Cancelled))
    ));
    assert_eq!(h.workflow.state(), WorkflowState::Idle);
    assert_eq!(h.devices.active_streams(), 0);
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let h = harness(MockMediaDevices::new(640, 480), vec![created()]);
    let mut changes = EventReceiver::new(
        h.workflow.events(),
        EventFilter::EventTypes(vec!["state_changed"]),
        "test",
    );

    h.workflow.run_attempt(member()).await.unwrap();

    let path: Vec<String> = changes
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            WorkflowEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        path,
        vec!["requesting", "live", "captured", "submitting", "succeeded"]
    );
}

#[tokio::test]
async fn test_drop_releases_camera() {
    let devices = MockMediaDevices::new(640, 480);
    {
        let h = harness(devices.clone(), vec![]);
        h.workflow.start_camera().await.unwrap();
        assert_eq!(devices.active_streams(), 1);
    }
    assert_eq!(devices.active_streams(), 0);
}
