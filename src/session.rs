use crate::camera::{ConstraintProfile, MediaStream};
use crate::error::CameraError;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle status of a camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Requesting,
    Live,
    Error,
    Stopped,
}

/// One acquisition-to-release lifecycle of a device stream.
///
/// The session exclusively owns the stream. [`CameraSession::release`] stops
/// its tracks exactly once no matter how many times it is called; dropping
/// the session releases as a last resort.
pub struct CameraSession {
    id: Uuid,
    stream: Option<Box<dyn MediaStream>>,
    status: SessionStatus,
    error: Option<CameraError>,
    profile: Option<ConstraintProfile>,
    opened_at: DateTime<Utc>,
}

impl CameraSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stream: None,
            status: SessionStatus::Idle,
            error: None,
            profile: None,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&CameraError> {
        self.error.as_ref()
    }

    pub fn profile(&self) -> Option<ConstraintProfile> {
        self.profile
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn stream(&self) -> Option<&dyn MediaStream> {
        self.stream.as_deref()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_live(&self) -> bool {
        self.status == SessionStatus::Live && self.stream.is_some()
    }

    pub fn mark_requesting(&mut self) {
        self.status = SessionStatus::Requesting;
    }

    /// Take ownership of an opened stream
    pub fn adopt(&mut self, stream: Box<dyn MediaStream>, profile: ConstraintProfile) {
        if let Some(previous) = self.stream.replace(stream) {
            previous.stop();
        }
        self.profile = Some(profile);
        self.opened_at = Utc::now();
        self.status = SessionStatus::Requesting;
    }

    pub fn mark_live(&mut self) {
        if self.stream.is_some() {
            self.status = SessionStatus::Live;
        }
    }

    /// Record a failure and release the device
    pub fn fail(&mut self, error: CameraError) {
        self.release();
        self.status = SessionStatus::Error;
        self.error = Some(error);
    }

    /// Stop the stream's tracks and drop the handle. Idempotent.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
            info!("Camera session {} released stream {}", self.id, stream.id());
        } else {
            debug!("Camera session {} already released", self.id);
        }
        if self.status != SessionStatus::Error {
            self.status = SessionStatus::Stopped;
        }
    }
}

impl Default for CameraSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }
}
