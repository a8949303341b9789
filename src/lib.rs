pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod members;
pub mod session;
pub mod submit;
pub mod surface;
pub mod workflow;

pub use camera::{
    acquire_stream, AcquiredStream, ConstraintProfile, ConstraintSet, DeviceError, MediaDevices,
    MediaStream, MockFrameMode, MockMediaDevices, PermissionState, StreamFeed,
};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::V4l2MediaDevices;
pub use capture::{capture_frame, encode_frame};
pub use config::FacecheckConfig;
pub use error::{Affordance, CameraError, CameraErrorExt, FacecheckError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, WorkflowEvent};
pub use frame::{CapturedFrame, PixelFormat, VideoFrame};
pub use members::{HttpMemberDirectory, MemberDirectory, MemberSummary, StaticMemberDirectory};
pub use session::{CameraSession, SessionStatus};
pub use submit::{
    classify_response, HttpSubmitter, MemberId, SubmissionPurpose, SubmissionReceipt,
    SubmissionStrategy, VerificationRequest, VerificationResult,
};
pub use surface::{bind_stream, wait_until_ready, DisplaySurface, SurfaceSignal, VideoSurface};
pub use workflow::{transition, CaptureWorkflow, Trigger, WorkflowFailure, WorkflowState};
