use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacecheckError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Invalid transition: cannot apply {trigger} while {from}")]
    InvalidTransition {
        from: &'static str,
        trigger: &'static str,
    },

    #[error("Invalid member id: {reason}")]
    InvalidMemberId { reason: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FacecheckError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Receiver lagged behind by {missed} events")]
    Lagged { missed: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

/// Failures of the camera side of a capture attempt: negotiation, binding
/// and frame capture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device found")]
    NoDeviceFound,

    #[error("Camera is in use by another application")]
    DeviceBusy,

    #[error("Camera did not produce a frame within {timeout:?}")]
    DeviceTimeout { timeout: Duration },

    #[error("Video playback failed: {details}")]
    PlaybackFailed { details: String },

    #[error("Frame capture failed: {details}")]
    CaptureFailed { details: String },

    #[error("Capture attempt cancelled")]
    Cancelled,

    #[error("Unknown camera error: {0}")]
    Unknown(String),
}

impl CameraError {
    pub fn capture_failed<S: Into<String>>(details: S) -> Self {
        Self::CaptureFailed {
            details: details.into(),
        }
    }

    pub fn playback_failed<S: Into<String>>(details: S) -> Self {
        Self::PlaybackFailed {
            details: details.into(),
        }
    }
}

/// What the UI should offer after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    /// Re-open the camera from scratch.
    TryAgain,
    /// Keep the live camera and take another snapshot.
    RetryCapture,
    /// Nothing to retry; show guidance text.
    GuidanceOnly,
}

pub trait CameraErrorExt {
    fn is_transient(&self) -> bool;
    fn user_message(&self) -> String;
    fn affordance(&self) -> Affordance;
}

impl CameraErrorExt for CameraError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            CameraError::DeviceBusy
                | CameraError::DeviceTimeout { .. }
                | CameraError::PlaybackFailed { .. }
                | CameraError::CaptureFailed { .. }
                | CameraError::Unknown(_)
        )
    }

    fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Camera access was denied. Allow camera access in your system or browser settings, then reload.".to_string()
            }
            CameraError::NoDeviceFound => "No camera was found on this device.".to_string(),
            CameraError::DeviceBusy => {
                "The camera is being used by another application. Close it and try again.".to_string()
            }
            CameraError::DeviceTimeout { timeout } => format!(
                "The camera did not start within {} seconds. Try again.",
                timeout.as_secs()
            ),
            CameraError::PlaybackFailed { details } => {
                format!("The camera preview stopped unexpectedly ({}). Try again.", details)
            }
            CameraError::CaptureFailed { details } => {
                format!("Could not take a photo ({}). Try capturing again.", details)
            }
            CameraError::Cancelled => "Check-in cancelled.".to_string(),
            CameraError::Unknown(message) => format!("Camera error: {}. Try again.", message),
        }
    }

    fn affordance(&self) -> Affordance {
        match self {
            CameraError::CaptureFailed { .. } => Affordance::RetryCapture,
            CameraError::PermissionDenied | CameraError::NoDeviceFound | CameraError::Cancelled => {
                Affordance::GuidanceOnly
            }
            _ => Affordance::TryAgain,
        }
    }
}

pub type Result<T> = std::result::Result<T, FacecheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_offer_guidance_only() {
        assert_eq!(CameraError::PermissionDenied.affordance(), Affordance::GuidanceOnly);
        assert_eq!(CameraError::NoDeviceFound.affordance(), Affordance::GuidanceOnly);
        assert!(!CameraError::PermissionDenied.is_transient());
        assert!(!CameraError::NoDeviceFound.is_transient());
    }

    #[test]
    fn test_transient_errors_offer_retry() {
        let timeout = CameraError::DeviceTimeout {
            timeout: Duration::from_secs(8),
        };
        assert!(timeout.is_transient());
        assert_eq!(timeout.affordance(), Affordance::TryAgain);
        assert!(timeout.user_message().contains("8 seconds"));

        let capture = CameraError::capture_failed("surface not ready");
        assert!(capture.is_transient());
        assert_eq!(capture.affordance(), Affordance::RetryCapture);

        assert_eq!(CameraError::DeviceBusy.affordance(), Affordance::TryAgain);
        assert_eq!(
            CameraError::playback_failed("decoder error").affordance(),
            Affordance::TryAgain
        );
    }

    #[test]
    fn test_camera_error_converts_into_crate_error() {
        let err: FacecheckError = CameraError::DeviceBusy.into();
        assert!(matches!(err, FacecheckError::Camera(CameraError::DeviceBusy)));
        assert!(err.to_string().contains("in use"));
    }
}
