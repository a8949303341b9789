use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FacecheckConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub api: ApiConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Device node opened by the V4L2 backend
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Preferred camera orientation
    #[serde(default = "default_facing_mode")]
    pub facing_mode: FacingMode,

    /// Preferred width range in pixels
    #[serde(default = "default_width_range")]
    pub width: ResolutionRange,

    /// Preferred height range in pixels
    #[serde(default = "default_height_range")]
    pub height: ResolutionRange,

    /// Retry once with unconstrained settings when the preferred set is rejected
    #[serde(default = "default_fallback_constraints")]
    pub fallback_constraints: bool,

    /// Upper bound on the wait for the first decodable frame
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Frames per second produced by the mock backend
    #[serde(default = "default_mock_frame_rate")]
    pub mock_frame_rate: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionRange {
    pub min: u32,
    pub ideal: u32,
    pub max: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// JPEG quality in (0, 1]
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the member/attendance REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path receiving face check-in submissions
    #[serde(default = "default_attendance_path")]
    pub attendance_path: String,

    /// Path receiving enrollment photos; `{memberId}` is substituted
    #[serde(default = "default_enrollment_path")]
    pub enrollment_path: String,

    /// Path of the member search collection
    #[serde(default = "default_members_path")]
    pub members_path: String,

    /// Upper bound on a single API request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of members returned by a search
    #[serde(default = "default_member_search_limit")]
    pub member_search_limit: usize,

    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowConfig {
    /// Leave the camera running after a rejected verification
    #[serde(default = "default_keep_camera_on_reject")]
    pub keep_camera_on_reject: bool,

    /// Workflow event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl CameraConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl CaptureConfig {
    /// Quality on the encoder's 1..=100 scale
    pub fn encoder_quality(&self) -> u8 {
        (self.jpeg_quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("attendance_path", &self.attendance_path)
            .field("enrollment_path", &self.enrollment_path)
            .field("members_path", &self.members_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("member_search_limit", &self.member_search_limit)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Join a path onto the base URL without doubling slashes
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl FacecheckConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("facecheck.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let width = default_width_range();
        let height = default_height_range();

        let settings = Config::builder()
            // Start with default values
            .set_default("camera.device", default_camera_device())?
            .set_default("camera.facing_mode", "user")?
            .set_default("camera.width.min", width.min)?
            .set_default("camera.width.ideal", width.ideal)?
            .set_default("camera.width.max", width.max)?
            .set_default("camera.height.min", height.min)?
            .set_default("camera.height.ideal", height.ideal)?
            .set_default("camera.height.max", height.max)?
            .set_default("camera.fallback_constraints", default_fallback_constraints())?
            .set_default("camera.ready_timeout_ms", default_ready_timeout_ms() as i64)?
            .set_default("camera.mock_frame_rate", default_mock_frame_rate())?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as f64)?
            .set_default("api.base_url", default_base_url())?
            .set_default("api.attendance_path", default_attendance_path())?
            .set_default("api.enrollment_path", default_enrollment_path())?
            .set_default("api.members_path", default_members_path())?
            .set_default(
                "api.request_timeout_secs",
                default_request_timeout_secs() as i64,
            )?
            .set_default(
                "api.member_search_limit",
                default_member_search_limit() as i64,
            )?
            .set_default(
                "workflow.keep_camera_on_reject",
                default_keep_camera_on_reject(),
            )?
            .set_default(
                "workflow.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with FACECHECK_ prefix, e.g. FACECHECK_API__BASE_URL
            .add_source(
                Environment::with_prefix("FACECHECK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: FacecheckConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, range) in [("width", &self.camera.width), ("height", &self.camera.height)] {
            if range.min == 0 || range.max == 0 {
                return Err(ConfigError::Message(format!(
                    "Camera {} bounds must be greater than 0",
                    axis
                )));
            }
            if range.min > range.max || range.ideal < range.min || range.ideal > range.max {
                return Err(ConfigError::Message(format!(
                    "Camera {} range must satisfy min <= ideal <= max",
                    axis
                )));
            }
        }

        if self.camera.ready_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera ready_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.camera.mock_frame_rate == 0 {
            return Err(ConfigError::Message(
                "Camera mock_frame_rate must be greater than 0".to_string(),
            ));
        }

        if !(self.capture.jpeg_quality > 0.0 && self.capture.jpeg_quality <= 1.0) {
            return Err(ConfigError::Message(
                "Capture jpeg_quality must be in (0, 1]".to_string(),
            ));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "API base_url must not be empty".to_string(),
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "API request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.api.member_search_limit == 0 {
            return Err(ConfigError::Message(
                "API member_search_limit must be greater than 0".to_string(),
            ));
        }

        if self.workflow.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FacecheckConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            capture: CaptureConfig {
                jpeg_quality: default_jpeg_quality(),
            },
            api: ApiConfig {
                base_url: default_base_url(),
                attendance_path: default_attendance_path(),
                enrollment_path: default_enrollment_path(),
                members_path: default_members_path(),
                request_timeout_secs: default_request_timeout_secs(),
                member_search_limit: default_member_search_limit(),
                auth_token: None,
            },
            workflow: WorkflowConfig {
                keep_camera_on_reject: default_keep_camera_on_reject(),
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            facing_mode: default_facing_mode(),
            width: default_width_range(),
            height: default_height_range(),
            fallback_constraints: default_fallback_constraints(),
            ready_timeout_ms: default_ready_timeout_ms(),
            mock_frame_rate: default_mock_frame_rate(),
        }
    }
}

// Default value functions
fn default_camera_device() -> String {
    "/dev/video0".to_string()
}
fn default_facing_mode() -> FacingMode {
    FacingMode::User
}
fn default_width_range() -> ResolutionRange {
    ResolutionRange {
        min: 640,
        ideal: 1280,
        max: 1920,
    }
}
fn default_height_range() -> ResolutionRange {
    ResolutionRange {
        min: 480,
        ideal: 720,
        max: 1080,
    }
}
fn default_fallback_constraints() -> bool {
    true
}
fn default_ready_timeout_ms() -> u64 {
    8000
}
fn default_mock_frame_rate() -> u32 {
    15
}

fn default_jpeg_quality() -> f32 {
    0.8
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}
fn default_attendance_path() -> String {
    "/attendance/face".to_string()
}
fn default_enrollment_path() -> String {
    "/members/{memberId}/face".to_string()
}
fn default_members_path() -> String {
    "/members".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_member_search_limit() -> usize {
    10
}

fn default_keep_camera_on_reject() -> bool {
    true
}
fn default_event_bus_capacity() -> usize {
    64
}
