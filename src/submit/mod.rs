//! Delivery of captured frames to the attendance and enrollment endpoints.

mod http;

pub use http::{classify_response, HttpSubmitter};

use crate::error::{FacecheckError, Result};
use crate::frame::CapturedFrame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque member identifier issued by the member-management API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(FacecheckError::InvalidMemberId {
                reason: "member id must not be empty".to_string(),
            });
        }
        if trimmed.chars().any(char::is_control) {
            return Err(FacecheckError::InvalidMemberId {
                reason: "member id contains control characters".to_string(),
            });
        }
        if matches!(trimmed, "." | "..") {
            return Err(FacecheckError::InvalidMemberId {
                reason: "member id must not be a relative path".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a submission is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPurpose {
    /// Attendance check-in against the member's enrolled face
    Verification,
    /// Store the photo as the member's reference face
    Enrollment,
}

impl fmt::Display for SubmissionPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionPurpose::Verification => write!(f, "verification"),
            SubmissionPurpose::Enrollment => write!(f, "enrollment"),
        }
    }
}

/// A captured frame bound to a member. Submitted once.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub request_id: Uuid,
    pub member_id: MemberId,
    pub frame: CapturedFrame,
}

impl VerificationRequest {
    pub fn new(member_id: MemberId, frame: CapturedFrame) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            member_id,
            frame,
        }
    }
}

/// Accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub status: u16,
    /// Record created by the endpoint, when it returned JSON
    pub record: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    Success(SubmissionReceipt),
    /// The endpoint understood the request and refused it
    Rejected(String),
    /// Network, timeout or server fault; nothing is known to be recorded
    TransportError(String),
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationResult::Success(_))
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            VerificationResult::Success(_) => "success",
            VerificationResult::Rejected(_) => "rejected",
            VerificationResult::TransportError(_) => "transport_error",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            VerificationResult::Success(_) => "Check-in recorded.".to_string(),
            VerificationResult::Rejected(reason) => {
                format!("Verification failed: {}. You can capture again.", reason)
            }
            VerificationResult::TransportError(reason) => format!(
                "Could not reach the attendance service ({}). Try submitting again.",
                reason
            ),
        }
    }
}

/// How a captured frame is delivered. One implementation per call site
/// (enrollment upload, check-in verification) over shared camera handling.
#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    fn purpose(&self) -> SubmissionPurpose;

    /// Issue exactly one request. Never retries.
    async fn submit(&self, request: VerificationRequest) -> VerificationResult;
}
