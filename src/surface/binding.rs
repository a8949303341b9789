use super::{DisplaySurface, SurfaceSignal};
use crate::camera::MediaStream;
use crate::error::CameraError;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Attach `stream` to `surface` and begin playback.
///
/// Kept separate from [`wait_until_ready`] so the caller can publish the
/// session (and make it cancellable) before suspending.
pub fn bind_stream(
    surface: &dyn DisplaySurface,
    stream: &dyn MediaStream,
) -> Result<watch::Receiver<SurfaceSignal>, CameraError> {
    debug!("Binding stream {} to display surface", stream.id());
    surface.attach(stream)
}

/// Suspend until the surface reports a decodable frame.
///
/// Fails with `DeviceTimeout` if nothing arrives within `timeout` and with
/// `PlaybackFailed` on a playback error. The surface is detached on every
/// failure; stopping the stream's tracks is left to the session owner.
pub async fn wait_until_ready(
    surface: &dyn DisplaySurface,
    mut signals: watch::Receiver<SurfaceSignal>,
    timeout: Duration,
) -> Result<(), CameraError> {
    let wait = async {
        loop {
            let signal = signals.borrow_and_update().clone();
            match signal {
                SurfaceSignal::Ready => return Ok(()),
                SurfaceSignal::PlaybackError(details) => {
                    return Err(CameraError::PlaybackFailed { details })
                }
                SurfaceSignal::Pending => {}
            }
            if signals.changed().await.is_err() {
                return Err(CameraError::playback_failed("display surface closed"));
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(())) => {
            let (width, height) = surface.dimensions();
            info!("Display surface ready ({}x{})", width, height);
            Ok(())
        }
        Ok(Err(e)) => {
            warn!("Display surface failed before first frame: {}", e);
            surface.detach();
            Err(e)
        }
        Err(_) => {
            warn!("No decodable frame within {:?}", timeout);
            surface.detach();
            Err(CameraError::DeviceTimeout { timeout })
        }
    }
}
