use super::{
    MemberId, SubmissionPurpose, SubmissionReceipt, SubmissionStrategy, VerificationRequest,
    VerificationResult,
};
use crate::config::ApiConfig;
use crate::error::{FacecheckError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAX_REASON_LEN: usize = 200;
const MEMBER_PLACEHOLDER: &str = "{memberId}";

/// Where submissions are posted
enum Target {
    Fixed(String),
    /// The member id fills exactly one path segment between `prefix` and `suffix`
    PerMember { prefix: Url, suffix: Vec<String> },
}

impl Target {
    fn parse(endpoint: &str) -> Result<Self> {
        let Some((prefix, suffix)) = endpoint.split_once(MEMBER_PLACEHOLDER) else {
            return Ok(Target::Fixed(endpoint.to_string()));
        };

        let prefix = Url::parse(prefix).map_err(|e| {
            FacecheckError::component("submit", format!("invalid endpoint '{}': {}", endpoint, e))
        })?;
        if prefix.cannot_be_a_base() {
            return Err(FacecheckError::component(
                "submit",
                format!("endpoint '{}' cannot carry a member path", endpoint),
            ));
        }

        Ok(Target::PerMember {
            prefix,
            suffix: suffix
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

/// Multipart submitter for the attendance (verification) and photo
/// (enrollment) endpoints
pub struct HttpSubmitter {
    client: reqwest::Client,
    target: Target,
    purpose: SubmissionPurpose,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpSubmitter {
    pub fn new(api: &ApiConfig, purpose: SubmissionPurpose) -> Result<Self> {
        let path = match purpose {
            SubmissionPurpose::Verification => &api.attendance_path,
            SubmissionPurpose::Enrollment => &api.enrollment_path,
        };
        let client = reqwest::Client::builder()
            .timeout(api.request_timeout())
            .build()?;

        Ok(Self {
            client,
            target: Target::parse(&api.endpoint(path))?,
            purpose,
            auth_token: api.auth_token.clone(),
            timeout: api.request_timeout(),
        })
    }

    /// Target URL for a member; `{memberId}` in the configured path is
    /// replaced by the id, percent-encoded as a single path segment
    pub fn endpoint_for(&self, member_id: &MemberId) -> String {
        match &self.target {
            Target::Fixed(url) => url.clone(),
            Target::PerMember { prefix, suffix } => {
                let mut url = prefix.clone();
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments
                        .pop_if_empty()
                        .push(member_id.as_str())
                        .extend(suffix);
                }
                url.to_string()
            }
        }
    }

    fn build_form(request: &VerificationRequest) -> std::result::Result<Form, reqwest::Error> {
        let image = Part::bytes(request.frame.jpeg().to_vec())
            .file_name("face.jpg")
            .mime_str("image/jpeg")?;

        Ok(Form::new()
            .text("memberId", request.member_id.as_str().to_string())
            .part("faceImage", image))
    }
}

#[async_trait]
impl SubmissionStrategy for HttpSubmitter {
    fn purpose(&self) -> SubmissionPurpose {
        self.purpose
    }

    async fn submit(&self, request: VerificationRequest) -> VerificationResult {
        let url = self.endpoint_for(&request.member_id);
        let form = match Self::build_form(&request) {
            Ok(form) => form,
            Err(e) => return VerificationResult::TransportError(format!("could not build request: {}", e)),
        };

        let mut builder = self.client.post(&url).multipart(form);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        info!(
            "Submitting {} for member {} ({} byte JPEG, request {})",
            self.purpose,
            request.member_id,
            request.frame.len(),
            request.request_id
        );

        let started = Instant::now();
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok((status, body))) => {
                debug!(
                    "{} answered {} in {:?} ({} byte body)",
                    url,
                    status,
                    started.elapsed(),
                    body.len()
                );
                classify_response(status.as_u16(), &body)
            }
            Ok(Err(e)) => VerificationResult::TransportError(describe_transport_error(&e, self.timeout)),
            Err(_) => VerificationResult::TransportError(format!(
                "request timed out after {}s",
                self.timeout.as_secs()
            )),
        };

        match &result {
            VerificationResult::Success(receipt) => {
                info!("Submission {} accepted (HTTP {})", request.request_id, receipt.status)
            }
            VerificationResult::Rejected(reason) => {
                info!("Submission {} rejected: {}", request.request_id, reason)
            }
            VerificationResult::TransportError(reason) => {
                warn!("Submission {} failed: {}", request.request_id, reason)
            }
        }

        result
    }
}

fn describe_transport_error(error: &reqwest::Error, timeout: Duration) -> String {
    if error.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs())
    } else if error.is_connect() {
        format!("could not connect: {}", error)
    } else {
        error.to_string()
    }
}

/// Map an HTTP answer onto a verification outcome.
///
/// 2xx is success, 4xx a rejection carrying the server's reason, anything
/// else a transport failure. 408 and 429 say nothing about the face and are
/// transport failures too, so the same capture can be resubmitted.
pub fn classify_response(status: u16, body: &str) -> VerificationResult {
    let status_code = StatusCode::from_u16(status).ok();
    let canonical = status_code
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status");

    match status {
        200..=299 => VerificationResult::Success(SubmissionReceipt {
            status,
            record: serde_json::from_str(body).ok(),
        }),
        408 | 429 => transport_failure(status, canonical, body),
        400..=499 => VerificationResult::Rejected(
            extract_reason(body).unwrap_or_else(|| canonical.to_string()),
        ),
        _ => transport_failure(status, canonical, body),
    }
}

fn transport_failure(status: u16, canonical: &str, body: &str) -> VerificationResult {
    let detail = extract_reason(body)
        .map(|reason| format!(": {}", reason))
        .unwrap_or_default();
    VerificationResult::TransportError(format!("HTTP {} {}{}", status, canonical, detail))
}

/// Human-readable reason from a structured error body, or the body itself
fn extract_reason(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["message", "error", "reason", "detail"] {
            match json.get(key) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                    return Some(s.trim().to_string())
                }
                Some(serde_json::Value::Object(inner)) => {
                    if let Some(serde_json::Value::String(s)) = inner.get("message") {
                        return Some(s.trim().to_string());
                    }
                }
                _ => {}
            }
        }
        return None;
    }

    if trimmed.starts_with('<') {
        // HTML error page
        return None;
    }

    Some(truncate(trimmed, MAX_REASON_LEN))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}
