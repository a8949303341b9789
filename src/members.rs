//! Member lookup used to pick who is checking in.

use crate::config::ApiConfig;
use crate::error::{FacecheckError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// A member as returned by a directory search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    #[serde(alias = "_id")]
    pub id: String,

    #[serde(default, alias = "name", alias = "displayName")]
    pub display_name: String,

    #[serde(default, alias = "memberCode")]
    pub member_code: Option<String>,
}

impl fmt::Display for MemberSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member_code {
            Some(code) => write!(f, "{} [{}] ({})", self.display_name, code, self.id),
            None => write!(f, "{} ({})", self.display_name, self.id),
        }
    }
}

#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Members whose name or id matches `query`, at most `limit` of them
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemberSummary>>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MemberListing {
    Bare(Vec<MemberSummary>),
    Members { members: Vec<MemberSummary> },
    Data { data: Vec<MemberSummary> },
}

impl MemberListing {
    fn into_members(self) -> Vec<MemberSummary> {
        match self {
            MemberListing::Bare(members)
            | MemberListing::Members { members }
            | MemberListing::Data { data: members } => members,
        }
    }
}

/// Directory backed by the member-management REST API
pub struct HttpMemberDirectory {
    client: reqwest::Client,
    url: String,
    max_results: usize,
    auth_token: Option<String>,
}

impl HttpMemberDirectory {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.request_timeout())
            .build()?;

        Ok(Self {
            client,
            url: api.endpoint(&api.members_path),
            max_results: api.member_search_limit,
            auth_token: api.auth_token.clone(),
        })
    }
}

#[async_trait]
impl MemberDirectory for HttpMemberDirectory {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemberSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.min(self.max_results);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let limit_param = limit.to_string();
        let mut request = self
            .client
            .get(&self.url)
            .query(&[("search", query), ("limit", limit_param.as_str())]);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        debug!("Searching members at {} for '{}'", self.url, query);
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FacecheckError::component(
                "members",
                format!("search returned HTTP {}", status).as_str(),
            ));
        }
        let listing: MemberListing = response.json().await?;

        let mut members = listing.into_members();
        members.truncate(limit);
        info!("Member search '{}' returned {} result(s)", query, members.len());
        Ok(members)
    }
}

/// Fixed in-memory directory for offline use
#[derive(Debug, Clone, Default)]
pub struct StaticMemberDirectory {
    members: Vec<MemberSummary>,
}

impl StaticMemberDirectory {
    pub fn new(members: Vec<MemberSummary>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl MemberDirectory for StaticMemberDirectory {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemberSummary>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .members
            .iter()
            .filter(|m| {
                m.id.to_lowercase().contains(&needle)
                    || m.display_name.to_lowercase().contains(&needle)
                    || m
                        .member_code
                        .as_deref()
                        .is_some_and(|code| code.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
