//! Ordered candidate probing.
//!
//! A probe walks a list of candidate paths under one base URL, strictly in
//! order, and stops at the first response that satisfies its acceptance
//! rule. Liveness checks, catalog fetches and tool invocations are all thin
//! wrappers around [`ProbeEngine::probe`].
//!
//! Per-attempt status handling:
//! - 200/201: checked against the acceptance rule; a miss moves on.
//! - 404: moves on to the next candidate.
//! - any other 4xx/5xx: terminal, reported as [`ProbeOutcome::Rejected`].
//! - transport error or timeout: moves on to the next candidate.

use std::time::Duration;

use reqwest::{Client as HttpClient, Method};
use serde::Serialize;
use serde_json::{json, Value};

use super::candidates::{catalog_paths, invocation_paths, join_url, liveness_paths};
use super::errors::ProbeError;
use super::parse::{has_tools, normalize_catalog};
use crate::registry::{AuthConfig, ServiceDescriptor, Tool};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout, applied on top of each request's own timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upstream error bodies are cut to this many characters.
pub const MAX_BODY_CHARS: usize = 500;

// ─── Request / outcome types ─────────────────────────────────────────────────

/// What a 200/201 answer must look like to end the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Any body.
    Any,
    /// A recognized tool catalog with at least one tool.
    NonEmptyCatalog,
}

/// One probe: a base URL plus ordered candidates sharing method, payload,
/// headers and per-attempt timeout.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub base_url: String,
    pub candidates: Vec<String>,
    pub method: Method,
    pub payload: Option<Value>,
    pub timeout: Duration,
    pub headers: Vec<(&'static str, String)>,
    /// Non-JSON bodies count as a miss.
    pub require_json: bool,
    pub accept: Acceptance,
}

impl ProbeRequest {
    pub fn get(base_url: impl Into<String>, candidates: Vec<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            candidates,
            method: Method::GET,
            payload: None,
            timeout,
            headers: Vec::new(),
            require_json: false,
            accept: Acceptance::Any,
        }
    }

    pub fn post(
        base_url: impl Into<String>,
        candidates: Vec<String>,
        payload: Value,
        timeout: Duration,
    ) -> Self {
        Self {
            method: Method::POST,
            payload: Some(payload),
            ..Self::get(base_url, candidates, timeout)
        }
    }

    pub fn with_auth(mut self, auth: &AuthConfig) -> Self {
        self.headers = auth.headers();
        self
    }

    pub fn json_only(mut self) -> Self {
        self.require_json = true;
        self
    }

    pub fn accepting(mut self, accept: Acceptance) -> Self {
        self.accept = accept;
        self
    }

    fn accepts(&self, body: &ProbeBody) -> bool {
        if self.require_json && !body.is_json() {
            return false;
        }
        match self.accept {
            Acceptance::Any => true,
            Acceptance::NonEmptyCatalog => match body {
                ProbeBody::Json(v) => has_tools(v),
                ProbeBody::Text(_) => false,
            },
        }
    }
}

/// A response body, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProbeBody {
    Json(Value),
    Text(String),
}

impl ProbeBody {
    fn parse(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Self::Json(v),
            Err(_) => Self::Text(text),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// JSON bodies as-is; text bodies as a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(v) => v,
            Self::Text(t) => Value::String(t),
        }
    }
}

/// The accepted response of a successful probe.
#[derive(Debug, Clone)]
pub struct ProbeHit {
    pub candidate: String,
    pub url: String,
    pub status: u16,
    pub body: ProbeBody,
    /// Candidates tried, including this one.
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Success(ProbeHit),
    /// A candidate answered with a terminal failure status.
    Rejected {
        candidate: String,
        url: String,
        status: u16,
        body: String,
        attempts: usize,
    },
    /// No candidate was accepted.
    Exhausted {
        attempts: usize,
        /// Candidates that answered 200/201 but missed the acceptance rule.
        answered: usize,
        last_error: Option<String>,
    },
}

impl ProbeOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            Self::Success(hit) => hit.attempts,
            Self::Rejected { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Result of a liveness check. Never an error: a dead target is `alive: false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessReport {
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ─── ProbeEngine ─────────────────────────────────────────────────────────────

/// Shared prober. Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ProbeEngine {
    http: HttpClient,
}

impl ProbeEngine {
    pub fn new() -> Result<Self, ProbeError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProbeError::ClientBuild {
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }

    /// Try each candidate in order until one is accepted or a terminal
    /// status is seen.
    pub async fn probe(&self, request: &ProbeRequest) -> ProbeOutcome {
        let mut attempts = 0;
        let mut answered = 0;
        let mut last_error = None;

        for candidate in &request.candidates {
            attempts += 1;
            let url = join_url(&request.base_url, candidate);

            let mut builder = self
                .http
                .request(request.method.clone(), &url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(*name, value);
            }
            if let Some(payload) = &request.payload {
                builder = builder.json(payload);
            }

            let response = match builder.send().await {
                Ok(r) => r,
                Err(e) => {
                    let reason = describe_transport_error(&e, request.timeout);
                    tracing::debug!(url = %url, error = %reason, "probe attempt failed");
                    last_error = Some(reason);
                    continue;
                }
            };

            let status = response.status().as_u16();
            let text = match response.text().await {
                Ok(t) => t,
                Err(e) => {
                    let reason = describe_transport_error(&e, request.timeout);
                    tracing::debug!(url = %url, error = %reason, "probe body read failed");
                    last_error = Some(reason);
                    continue;
                }
            };

            match status {
                200 | 201 => {
                    answered += 1;
                    let body = ProbeBody::parse(text);
                    if request.accepts(&body) {
                        tracing::debug!(url = %url, status, attempts, "probe accepted");
                        return ProbeOutcome::Success(ProbeHit {
                            candidate: candidate.clone(),
                            url,
                            status,
                            body,
                            attempts,
                        });
                    }
                    tracing::debug!(url = %url, "response did not match, trying next candidate");
                    last_error = Some(format!("{url}: unexpected response body"));
                }
                404 => {
                    last_error = Some(format!("{url}: HTTP 404"));
                }
                s if s >= 400 => {
                    tracing::debug!(url = %url, status, "probe rejected");
                    return ProbeOutcome::Rejected {
                        candidate: candidate.clone(),
                        url,
                        status,
                        body: truncate_chars(&text, MAX_BODY_CHARS),
                        attempts,
                    };
                }
                _ => {
                    last_error = Some(format!("{url}: HTTP {status}"));
                }
            }
        }

        ProbeOutcome::Exhausted {
            attempts,
            answered,
            last_error,
        }
    }

    /// Probe the liveness candidates of `base_url`.
    pub async fn check_liveness(
        &self,
        base_url: &str,
        auth: &AuthConfig,
        timeout: Duration,
    ) -> LivenessReport {
        let request = ProbeRequest::get(base_url, liveness_paths(), timeout).with_auth(auth);
        match self.probe(&request).await {
            ProbeOutcome::Success(hit) => LivenessReport {
                alive: true,
                endpoint: Some(hit.candidate),
                status_code: Some(hit.status),
                data: Some(match hit.body {
                    ProbeBody::Json(v) => v,
                    ProbeBody::Text(t) => json!({ "raw": truncate_chars(&t, MAX_BODY_CHARS) }),
                }),
                error: None,
            },
            ProbeOutcome::Rejected { status, body, .. } => LivenessReport {
                alive: false,
                status_code: Some(status),
                error: Some(format!("HTTP {status}: {body}")),
                ..Default::default()
            },
            ProbeOutcome::Exhausted { last_error, .. } => LivenessReport {
                alive: false,
                error: Some(
                    last_error.unwrap_or_else(|| "no liveness endpoint responded".to_string()),
                ),
                ..Default::default()
            },
        }
    }

    /// Fetch and normalize a service's tool catalog.
    ///
    /// A service that answered 200 somewhere without exposing any tools has
    /// an empty catalog; one that never answered is unreachable.
    pub async fn fetch_tools(
        &self,
        service: &ServiceDescriptor,
        timeout: Duration,
    ) -> Result<Vec<Tool>, ProbeError> {
        let request = ProbeRequest::get(&service.endpoint, catalog_paths(), timeout)
            .with_auth(&service.auth)
            .json_only()
            .accepting(Acceptance::NonEmptyCatalog);

        match self.probe(&request).await {
            ProbeOutcome::Success(hit) => {
                let tools = match &hit.body {
                    ProbeBody::Json(v) => normalize_catalog(v).unwrap_or_default(),
                    ProbeBody::Text(_) => Vec::new(),
                };
                tracing::debug!(
                    server = %service.name,
                    endpoint = %hit.candidate,
                    tool_count = tools.len(),
                    "fetched tool catalog"
                );
                Ok(tools)
            }
            ProbeOutcome::Rejected {
                url, status, body, ..
            } => Err(ProbeError::Rejected { url, status, body }),
            ProbeOutcome::Exhausted { answered, .. } if answered > 0 => {
                tracing::debug!(server = %service.name, "service answered but lists no tools");
                Ok(Vec::new())
            }
            ProbeOutcome::Exhausted {
                attempts,
                last_error,
                ..
            } => Err(ProbeError::Unreachable {
                base_url: service.endpoint.clone(),
                attempts,
                last_error,
            }),
        }
    }

    /// POST an invocation payload through the invocation candidates.
    pub async fn invoke(
        &self,
        service: &ServiceDescriptor,
        tool: &str,
        method: Option<&str>,
        parameters: &Value,
        timeout: Duration,
    ) -> Result<Value, ProbeError> {
        let mut payload = json!({ "tool": tool, "parameters": parameters });
        if let Some(m) = method {
            payload["method"] = Value::String(m.to_string());
        }
        let request = ProbeRequest::post(&service.endpoint, invocation_paths(tool), payload, timeout)
            .with_auth(&service.auth)
            .json_only();

        match self.probe(&request).await {
            ProbeOutcome::Success(hit) => {
                tracing::info!(server = %service.name, tool, endpoint = %hit.candidate, "tool invoked");
                Ok(hit.body.into_value())
            }
            ProbeOutcome::Rejected {
                url, status, body, ..
            } => {
                tracing::warn!(server = %service.name, tool, status, "tool invocation rejected");
                Err(ProbeError::Rejected { url, status, body })
            }
            ProbeOutcome::Exhausted {
                attempts,
                last_error,
                ..
            } => Err(ProbeError::Unreachable {
                base_url: service.endpoint.clone(),
                attempts,
                last_error,
            }),
        }
    }
}

fn describe_transport_error(e: &reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        format!("timed out after {}ms", timeout.as_millis())
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
