use super::state::{transition, Trigger, WorkflowState};
use crate::camera::{acquire_stream, MediaDevices};
use crate::capture::capture_frame;
use crate::config::{CameraConfig, FacecheckConfig};
use crate::error::{CameraError, FacecheckError, Result};
use crate::events::{EventBus, WorkflowEvent};
use crate::frame::CapturedFrame;
use crate::session::CameraSession;
use crate::submit::{MemberId, SubmissionStrategy, VerificationRequest, VerificationResult};
use crate::surface::{bind_stream, wait_until_ready, DisplaySurface};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Inner {
    state: WorkflowState,
    session: Option<CameraSession>,
    frame: Option<CapturedFrame>,
    /// Cancels the attempt currently in flight
    token: CancellationToken,
}

/// Drives one capture attempt at a time through acquisition, binding,
/// capture and submission.
///
/// The workflow exclusively owns the camera session. Every exit path
/// (failure, success, cancellation, drop) releases it.
pub struct CaptureWorkflow {
    devices: Arc<dyn MediaDevices>,
    surface: Arc<dyn DisplaySurface>,
    strategy: Arc<dyn SubmissionStrategy>,
    camera: CameraConfig,
    jpeg_quality: u8,
    keep_camera_on_reject: bool,
    inner: Mutex<Inner>,
    acquire_lock: tokio::sync::Mutex<()>,
    event_bus: EventBus,
}

impl CaptureWorkflow {
    pub fn new(
        config: &FacecheckConfig,
        devices: Arc<dyn MediaDevices>,
        surface: Arc<dyn DisplaySurface>,
        strategy: Arc<dyn SubmissionStrategy>,
    ) -> Self {
        Self {
            devices,
            surface,
            strategy,
            camera: config.camera.clone(),
            jpeg_quality: config.capture.encoder_quality(),
            keep_camera_on_reject: config.workflow.keep_camera_on_reject,
            inner: Mutex::new(Inner {
                state: WorkflowState::Idle,
                session: None,
                frame: None,
                token: CancellationToken::new(),
            }),
            acquire_lock: tokio::sync::Mutex::new(()),
            event_bus: EventBus::new(config.workflow.event_bus_capacity),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.lock().state.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    /// Frame awaiting submission, if any
    pub fn captured_frame(&self) -> Option<CapturedFrame> {
        self.inner.lock().frame.clone()
    }

    pub fn is_camera_live(&self) -> bool {
        self.inner
            .lock()
            .session
            .as_ref()
            .is_some_and(CameraSession::is_live)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock().session.as_ref().map(CameraSession::id)
    }

    /// Acquire the camera and wait until the surface shows a frame.
    ///
    /// Concurrent calls are serialized; a call made while a session is live
    /// replaces it.
    pub async fn start_camera(&self) -> Result<()> {
        let _in_flight = self.acquire_lock.lock().await;

        let token = {
            let mut inner = self.inner.lock();
            let next = transition(&inner.state, &Trigger::Start)?;
            self.teardown_locked(&mut inner);
            inner.token = CancellationToken::new();

            let mut session = CameraSession::new();
            session.mark_requesting();
            info!("Starting camera session {}", session.id());
            inner.session = Some(session);
            self.set_state(&mut inner, next);
            inner.token.clone()
        };

        let acquired = acquire_stream(self.devices.as_ref(), &self.camera).await;

        let signals = {
            let mut inner = self.inner.lock();
            if token.is_cancelled() {
                if let Ok(late) = acquired {
                    debug!("Stopping stream {} acquired after cancellation", late.stream.id());
                    late.stream.stop();
                }
                return Err(CameraError::Cancelled.into());
            }

            let acquired = match acquired {
                Ok(acquired) => acquired,
                Err(e) => return Err(self.fail_camera_locked(&mut inner, e)),
            };

            let bound = bind_stream(self.surface.as_ref(), acquired.stream.as_ref());
            match inner.session.as_mut() {
                Some(session) => session.adopt(acquired.stream, acquired.profile),
                None => {
                    acquired.stream.stop();
                    return Err(CameraError::Cancelled.into());
                }
            }

            match bound {
                Ok(signals) => signals,
                Err(e) => return Err(self.fail_camera_locked(&mut inner, e)),
            }
        };

        let ready = tokio::select! {
            ready = wait_until_ready(self.surface.as_ref(), signals, self.camera.ready_timeout()) => ready,
            _ = token.cancelled() => Err(CameraError::Cancelled),
        };

        let mut inner = self.inner.lock();
        if token.is_cancelled() {
            return Err(CameraError::Cancelled.into());
        }

        match ready {
            Ok(()) => {
                let opened = inner.session.as_mut().map(|session| {
                    session.mark_live();
                    (session.id(), session.profile())
                });
                let next = transition(&inner.state, &Trigger::CameraReady)?;
                self.set_state(&mut inner, next);

                if let Some((session_id, profile)) = opened {
                    self.event_bus.publish(WorkflowEvent::SessionOpened {
                        session_id,
                        profile: profile.map(|p| p.to_string()).unwrap_or_default(),
                        timestamp: SystemTime::now(),
                    });
                }
                Ok(())
            }
            Err(e) => Err(self.fail_camera_locked(&mut inner, e)),
        }
    }

    /// Snapshot the live surface.
    ///
    /// Fails with `CaptureFailed` until the camera is live; the camera keeps
    /// running on failure.
    pub fn capture(&self) -> Result<CapturedFrame> {
        let mut inner = self.inner.lock();

        let live = inner.session.as_ref().is_some_and(CameraSession::is_live);
        let next = match transition(&inner.state, &Trigger::Capture) {
            Ok(next) if live => next,
            _ => {
                debug!("Capture refused while {}", inner.state);
                return Err(CameraError::capture_failed("camera is not live").into());
            }
        };

        match capture_frame(self.surface.as_ref(), self.jpeg_quality) {
            Ok(frame) => {
                self.event_bus.publish(WorkflowEvent::FrameCaptured {
                    frame_id: frame.id(),
                    width: frame.dimensions().0,
                    height: frame.dimensions().1,
                    bytes: frame.len(),
                });
                inner.frame = Some(frame.clone());
                self.set_state(&mut inner, next);
                Ok(frame)
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                let next = transition(&inner.state, &Trigger::CaptureFailed)?;
                self.set_state(&mut inner, next);
                Err(e.into())
            }
        }
    }

    /// Submit the captured frame for `member_id`. Exactly one request is
    /// made; a transport failure keeps the frame for another submit.
    pub async fn submit(&self, member_id: MemberId) -> Result<VerificationResult> {
        let (request, token) = {
            let mut inner = self.inner.lock();
            let next = transition(&inner.state, &Trigger::Submit)?;
            let frame = inner
                .frame
                .clone()
                .ok_or_else(|| CameraError::capture_failed("no captured frame to submit"))?;
            self.set_state(&mut inner, next);
            (VerificationRequest::new(member_id, frame), inner.token.clone())
        };

        let member = request.member_id.to_string();
        let result = tokio::select! {
            result = self.strategy.submit(request) => result,
            _ = token.cancelled() => return Err(CameraError::Cancelled.into()),
        };

        let mut inner = self.inner.lock();
        if token.is_cancelled() {
            return Err(CameraError::Cancelled.into());
        }

        let trigger = match &result {
            VerificationResult::Success(_) => Trigger::Accepted,
            VerificationResult::Rejected(reason) => Trigger::Rejected(reason.clone()),
            VerificationResult::TransportError(reason) => Trigger::TransportFailed(reason.clone()),
        };
        let next = transition(&inner.state, &trigger)?;
        self.set_state(&mut inner, next);

        self.event_bus.publish(WorkflowEvent::SubmissionFinished {
            member_id: member,
            outcome: result.outcome().to_string(),
        });

        match &result {
            VerificationResult::Success(_) => self.teardown_locked(&mut inner),
            VerificationResult::Rejected(_) => {
                inner.frame = None;
                if !self.keep_camera_on_reject {
                    self.release_camera_locked(&mut inner);
                }
            }
            VerificationResult::TransportError(_) => {}
        }

        Ok(result)
    }

    /// Start, capture and submit in one go
    pub async fn run_attempt(&self, member_id: MemberId) -> Result<VerificationResult> {
        self.start_camera().await?;
        self.capture()?;
        self.submit(member_id).await
    }

    /// Release the camera. Safe to call any number of times in any state.
    ///
    /// An attempt that has not finished returns to `Idle`; a finished one
    /// keeps its outcome.
    pub fn stop_camera(&self) {
        let mut inner = self.inner.lock();
        inner.token.cancel();
        self.release_camera_locked(&mut inner);
        if !inner.state.is_terminal() && inner.state != WorkflowState::Idle {
            inner.frame = None;
            self.set_state(&mut inner, WorkflowState::Idle);
        }
    }

    /// Abandon the attempt: stop the camera, drop any captured frame and
    /// return to `Idle`. Idempotent.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.token.cancel();
        self.teardown_locked(&mut inner);
        if let Ok(next) = transition(&inner.state, &Trigger::Cancel) {
            self.set_state(&mut inner, next);
        }
    }

    fn set_state(&self, inner: &mut Inner, next: WorkflowState) {
        if inner.state != next {
            info!("Workflow {} -> {}", inner.state, next);
            self.event_bus.publish(WorkflowEvent::StateChanged {
                from: inner.state.name().to_string(),
                to: next.name().to_string(),
                timestamp: SystemTime::now(),
            });
        }
        inner.state = next;
    }

    /// Record a camera failure: release the device, detach the surface and
    /// move to `Failed`
    fn fail_camera_locked(&self, inner: &mut Inner, error: CameraError) -> FacecheckError {
        self.surface.detach();
        if let Some(mut session) = inner.session.take() {
            session.fail(error.clone());
            self.event_bus.publish(WorkflowEvent::SessionReleased {
                session_id: session.id(),
            });
        }
        self.event_bus.publish(WorkflowEvent::CameraFailed {
            error: error.to_string(),
        });

        if let Ok(next) = transition(&inner.state, &Trigger::CameraFailed(error.clone())) {
            self.set_state(inner, next);
        }
        error.into()
    }

    fn release_camera_locked(&self, inner: &mut Inner) {
        self.surface.detach();
        if let Some(mut session) = inner.session.take() {
            session.release();
            self.event_bus.publish(WorkflowEvent::SessionReleased {
                session_id: session.id(),
            });
        }
    }

    fn teardown_locked(&self, inner: &mut Inner) {
        self.release_camera_locked(inner);
        inner.frame = None;
    }
}

impl Drop for CaptureWorkflow {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        inner.token.cancel();
        if let Some(mut session) = inner.session.take() {
            session.release();
        }
        self.surface.detach();
    }
}
