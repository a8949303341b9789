use crate::error::{CameraError, FacecheckError};
use std::fmt;

/// Why an attempt ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowFailure {
    /// Acquisition or playback failed; the camera has been released
    Camera(CameraError),
    /// The endpoint could not be reached; the captured frame is kept
    Transport(String),
}

impl fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowFailure::Camera(e) => write!(f, "{}", e),
            WorkflowFailure::Transport(reason) => write!(f, "transport error: {}", reason),
        }
    }
}

/// State of one capture attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Requesting,
    Live,
    Captured,
    Submitting,
    Succeeded,
    Rejected { reason: String },
    Failed(WorkflowFailure),
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Requesting => "requesting",
            WorkflowState::Live => "live",
            WorkflowState::Captured => "captured",
            WorkflowState::Submitting => "submitting",
            WorkflowState::Succeeded => "succeeded",
            WorkflowState::Rejected { .. } => "rejected",
            WorkflowState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Succeeded | WorkflowState::Rejected { .. } | WorkflowState::Failed(_)
        )
    }

    /// States from which another snapshot may be taken, provided the camera
    /// is still live
    fn allows_capture(&self) -> bool {
        matches!(
            self,
            WorkflowState::Live
                | WorkflowState::Captured
                | WorkflowState::Rejected { .. }
                | WorkflowState::Failed(WorkflowFailure::Transport(_))
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Rejected { reason } => write!(f, "rejected ({})", reason),
            WorkflowState::Failed(failure) => write!(f, "failed ({})", failure),
            other => f.write_str(other.name()),
        }
    }
}

/// Inputs that drive the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Start,
    CameraReady,
    CameraFailed(CameraError),
    Capture,
    CaptureFailed,
    Submit,
    Accepted,
    Rejected(String),
    TransportFailed(String),
    Cancel,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Start => "start",
            Trigger::CameraReady => "camera_ready",
            Trigger::CameraFailed(_) => "camera_failed",
            Trigger::Capture => "capture",
            Trigger::CaptureFailed => "capture_failed",
            Trigger::Submit => "submit",
            Trigger::Accepted => "accepted",
            Trigger::Rejected(_) => "rejected",
            Trigger::TransportFailed(_) => "transport_failed",
            Trigger::Cancel => "cancel",
        }
    }
}

/// Next state for `trigger` applied in `state`
pub fn transition(state: &WorkflowState, trigger: &Trigger) -> Result<WorkflowState, FacecheckError> {
    use WorkflowState as S;

    let next = match (state, trigger) {
        (_, Trigger::Cancel) => S::Idle,

        // A start while live replaces the session; only an in-flight
        // submission blocks it
        (S::Submitting, Trigger::Start) => return Err(invalid(state, trigger)),
        (_, Trigger::Start) => S::Requesting,

        (S::Requesting, Trigger::CameraReady) => S::Live,
        (S::Requesting | S::Live, Trigger::CameraFailed(e)) => {
            S::Failed(WorkflowFailure::Camera(e.clone()))
        }

        (s, Trigger::Capture) if s.allows_capture() => S::Captured,
        (s, Trigger::CaptureFailed) if s.allows_capture() => s.clone(),

        (S::Captured | S::Failed(WorkflowFailure::Transport(_)), Trigger::Submit) => S::Submitting,

        (S::Submitting, Trigger::Accepted) => S::Succeeded,
        (S::Submitting, Trigger::Rejected(reason)) => S::Rejected {
            reason: reason.clone(),
        },
        (S::Submitting, Trigger::TransportFailed(reason)) => {
            S::Failed(WorkflowFailure::Transport(reason.clone()))
        }

        _ => return Err(invalid(state, trigger)),
    };

    Ok(next)
}

fn invalid(state: &WorkflowState, trigger: &Trigger) -> FacecheckError {
    FacecheckError::InvalidTransition {
        from: state.name(),
        trigger: trigger.name(),
    }
}
