//! Client for the optional external discovery service.
//!
//! Every call degrades to a value: transport failures, non-200 answers and
//! malformed bodies all become an empty [`DiscoveryResult`] with
//! `source = "error"`, `None`, or [`DiscoveryHealth::unavailable`].

use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::types::{DiscoveryHealth, DiscoveryResult, RemoteService, ServiceFilter};
use crate::probe::ProbeError;

// ─── Constants ───────────────────────────────────────────────────────────────

pub const DEFAULT_DISCOVERY_URL: &str = "http://localhost:5000";

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an availability answer is reused before re-probing.
pub const AVAILABILITY_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for the `/health` probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ServicesPayload {
    #[serde(default)]
    services: Vec<Value>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct AvailabilityCheck {
    available: bool,
    checked_at: Instant,
}

// ─── DiscoveryClient ─────────────────────────────────────────────────────────

pub struct DiscoveryClient {
    base_url: String,
    http: HttpClient,
    timeout: Duration,
    check_interval: Duration,
    /// Held across the health probe so concurrent callers share one check.
    availability: Mutex<Option<AvailabilityCheck>>,
}

impl DiscoveryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let http = HttpClient::builder()
            .build()
            .map_err(|e| ProbeError::ClientBuild {
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            timeout,
            check_interval: AVAILABILITY_CHECK_INTERVAL,
            availability: Mutex::new(None),
        })
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the service answers `/health` with 200.
    ///
    /// The answer is reused for the check interval unless `force_check`.
    pub async fn is_available(&self, force_check: bool) -> bool {
        let mut cached = self.availability.lock().await;
        if !force_check {
            if let Some(check) = *cached {
                if check.checked_at.elapsed() < self.check_interval {
                    return check.available;
                }
            }
        }

        let available = match self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().as_u16() == 200,
            Err(e) => {
                tracing::debug!(url = %self.base_url, error = %e, "discovery service unreachable");
                false
            }
        };

        if cached.map(|c| c.available) != Some(available) {
            tracing::info!(url = %self.base_url, available, "discovery service availability changed");
        }
        *cached = Some(AvailabilityCheck {
            available,
            checked_at: Instant::now(),
        });
        available
    }

    /// `GET /services` with optional filters.
    pub async fn get_services(&self, filter: &ServiceFilter) -> DiscoveryResult {
        let mut query: Vec<(&str, String)> = vec![("use_cache", filter.use_cache.to_string())];
        if let Some(t) = filter.service_type.as_deref().filter(|t| !t.is_empty()) {
            query.push(("service_type", t.to_string()));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            query.push(("status", s.to_string()));
        }
        let request = self
            .http
            .get(format!("{}/services", self.base_url))
            .query(&query);
        self.fetch_result(request, "discovery-service", "list services")
            .await
    }

    /// `GET /services/{name}`; `None` when absent or on any failure.
    pub async fn get_service(&self, name: &str) -> Option<RemoteService> {
        let url = format!("{}/services/{name}", self.base_url);
        match self.get_json(self.http.get(&url), self.timeout).await {
            Ok(body) => match serde_json::from_value::<RemoteService>(body) {
                Ok(svc) => Some(svc),
                Err(e) => {
                    tracing::warn!(service = name, error = %e, "malformed service record");
                    None
                }
            },
            Err(reason) => {
                tracing::debug!(service = name, error = %reason, "service lookup failed");
                None
            }
        }
    }

    /// `POST /services/refresh`, asking the service to rediscover.
    pub async fn refresh_services(&self, force: bool, sources: &[String]) -> DiscoveryResult {
        let mut payload = json!({ "force": force });
        if !sources.is_empty() {
            payload["sources"] = json!(sources);
        }
        let request = self
            .http
            .post(format!("{}/services/refresh", self.base_url))
            .json(&payload);
        self.fetch_result(request, "refresh", "refresh services")
            .await
    }

    /// `GET /services/type/{type}`.
    pub async fn get_services_by_type(&self, service_type: &str) -> DiscoveryResult {
        let request = self
            .http
            .get(format!("{}/services/type/{service_type}", self.base_url));
        self.fetch_result(request, "filter", "list services by type")
            .await
    }

    /// The service's health document.
    pub async fn get_health(&self) -> DiscoveryHealth {
        let request = self.http.get(format!("{}/health", self.base_url));
        match self.get_json(request, HEALTH_TIMEOUT).await {
            Ok(body) => serde_json::from_value(body).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "malformed discovery health document");
                DiscoveryHealth::unavailable()
            }),
            Err(reason) => {
                tracing::warn!(url = %self.base_url, error = %reason, "failed to get discovery health");
                DiscoveryHealth::unavailable()
            }
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn fetch_result(
        &self,
        request: reqwest::RequestBuilder,
        default_source: &str,
        action: &str,
    ) -> DiscoveryResult {
        let body = match self.get_json(request, self.timeout).await {
            Ok(body) => body,
            Err(reason) => {
                tracing::warn!(url = %self.base_url, action, error = %reason, "discovery request failed");
                return DiscoveryResult::error();
            }
        };
        let payload: ServicesPayload = match serde_json::from_value(body) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(url = %self.base_url, error = %e, "malformed discovery response");
                return DiscoveryResult::error();
            }
        };

        let services: Vec<RemoteService> = payload
            .services
            .into_iter()
            .filter_map(|s| match serde_json::from_value(s) {
                Ok(svc) => Some(svc),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed service record");
                    None
                }
            })
            .collect();

        DiscoveryResult {
            total: payload.total.unwrap_or(services.len()),
            services,
            timestamp: chrono::Utc::now(),
            source: payload.source.unwrap_or_else(|| default_source.to_string()),
        }
    }

    /// Only a 200 with a JSON body counts.
    async fn get_json(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<Value, String> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(format!("HTTP {status}"));
        }
        response.json::<Value>().await.map_err(|e| e.to_string())
    }
}
