//! Camera device layer: permission query, media acquisition and the stream
//! handles that own device tracks.

mod constraints;
mod mock;
mod negotiate;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod v4l2;
#[cfg(test)]
mod tests;

pub use constraints::{ConstraintProfile, ConstraintSet};
pub use mock::{MockFrameMode, MockMediaDevices};
pub use negotiate::{acquire_stream, AcquiredStream};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use v4l2::V4l2MediaDevices;

use crate::frame::VideoFrame;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// Camera permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; a media request will ask the user
    Prompt,
}

/// Errors raised by the media acquisition API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("NotAllowedError: camera access not allowed")]
    NotAllowed,

    #[error("NotFoundError: no matching camera")]
    NotFound,

    #[error("NotReadableError: {0}")]
    NotReadable(String),

    #[error("OverconstrainedError: {constraint}")]
    OverConstrained { constraint: String },

    #[error("{0}")]
    Other(String),
}

/// Latest state of a stream's video track
#[derive(Debug, Clone)]
pub enum StreamFeed {
    /// Opened, no frame delivered yet
    Starting,
    Frame(VideoFrame),
    /// The device reported a fault
    Failed(String),
    /// Tracks were stopped
    Ended,
}

/// Handle to an open camera stream. Holding one keeps the device locked
/// until [`MediaStream::stop`] is called.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    /// Human-readable device name
    fn label(&self) -> &str;

    fn subscribe(&self) -> watch::Receiver<StreamFeed>;

    /// Stop every track. Must be idempotent.
    fn stop(&self);

    fn is_active(&self) -> bool;
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn query_permission(&self) -> Result<PermissionState, DeviceError>;

    async fn get_user_media(
        &self,
        constraints: &ConstraintSet,
    ) -> Result<Box<dyn MediaStream>, DeviceError>;
}
