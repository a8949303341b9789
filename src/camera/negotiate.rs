use super::{ConstraintProfile, ConstraintSet, DeviceError, MediaDevices, MediaStream, PermissionState};
use crate::config::CameraConfig;
use crate::error::CameraError;
use tracing::{debug, info, warn};

/// A stream obtained from the device layer together with the constraint
/// profile that was accepted
pub struct AcquiredStream {
    pub stream: Box<dyn MediaStream>,
    pub profile: ConstraintProfile,
}

/// Obtain a live camera stream.
///
/// A denied permission fails without touching the media API. The preferred
/// constraint set is tried first; if the device layer rejects it, one retry
/// is made with the minimal set when `fallback_constraints` is enabled.
pub async fn acquire_stream(
    devices: &dyn MediaDevices,
    config: &CameraConfig,
) -> Result<AcquiredStream, CameraError> {
    let permission = match devices.query_permission().await {
        Ok(state) => state,
        Err(e) => {
            debug!("Permission query unavailable ({}), treating as prompt", e);
            PermissionState::Prompt
        }
    };

    if permission == PermissionState::Denied {
        info!("Camera permission is denied; not requesting a stream");
        return Err(CameraError::PermissionDenied);
    }

    let preferred = ConstraintSet::preferred(config);
    debug!("Requesting camera stream with {}", preferred);

    match devices.get_user_media(&preferred).await {
        Ok(stream) => {
            info!("Camera stream {} opened ({})", stream.id(), stream.label());
            Ok(AcquiredStream {
                stream,
                profile: ConstraintProfile::Preferred,
            })
        }
        Err(e) if config.fallback_constraints && is_constraint_rejection(&e) => {
            warn!(
                "Preferred camera constraints rejected ({}); retrying with any camera",
                e
            );
            let stream = devices
                .get_user_media(&ConstraintSet::minimal())
                .await
                .map_err(map_device_error)?;
            info!(
                "Camera stream {} opened with fallback constraints ({})",
                stream.id(),
                stream.label()
            );
            Ok(AcquiredStream {
                stream,
                profile: ConstraintProfile::Fallback,
            })
        }
        Err(e) => Err(map_device_error(e)),
    }
}

/// Errors that a relaxed request could plausibly avoid
fn is_constraint_rejection(error: &DeviceError) -> bool {
    matches!(
        error,
        DeviceError::OverConstrained { .. } | DeviceError::Other(_)
    )
}

pub(crate) fn map_device_error(error: DeviceError) -> CameraError {
    match error {
        DeviceError::NotAllowed => CameraError::PermissionDenied,
        DeviceError::NotFound => CameraError::NoDeviceFound,
        DeviceError::NotReadable(details) => {
            debug!("Camera not readable: {}", details);
            CameraError::DeviceBusy
        }
        DeviceError::OverConstrained { constraint } => {
            CameraError::Unknown(format!("no camera satisfies constraint '{}'", constraint))
        }
        DeviceError::Other(message) => CameraError::Unknown(message),
    }
}
