//! Discovery value types.
//!
//! Remote records come from the external discovery service, which speaks
//! snake_case; everything is re-serialized in camelCase with snake_case
//! accepted on input.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::probe::LivenessReport;
use crate::registry::ServiceStatus;

/// Default ports for the local port scan.
pub const DEFAULT_SCAN_PORTS: [u16; 4] = [11003, 8000, 3000, 5000];

/// `source` of a result that failed to reach the discovery service.
pub const SOURCE_ERROR: &str = "error";
/// `source` of a discovery pass that fell back to local scanning.
pub const SOURCE_LOCAL: &str = "local";

/// A service record as reported by the discovery service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteService {
    pub name: String,
    #[serde(default = "unknown", alias = "service_type")]
    pub service_type: String,
    #[serde(default = "unknown")]
    pub version: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "container_id")]
    pub container_id: Option<String>,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, alias = "discovered_at", deserialize_with = "lenient_timestamp")]
    pub discovered_at: Option<DateTime<Utc>>,
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Zone-less timestamps are read as UTC; unparseable ones become `None`
/// instead of failing the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(text)) => Ok(parse_timestamp(&text)),
        _ => Ok(None),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

/// Read a boolean given as JSON or as query text; an empty value means
/// `empty`.
pub(crate) fn parse_flag<'de, D>(deserializer: D, empty: bool) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "" => Ok(empty),
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean '{other}'"))),
        },
    }
}

fn flag_or_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    parse_flag(deserializer, true)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl RemoteService {
    /// Base URL of the service: its endpoint, else `http://localhost:{port}`.
    pub fn url(&self) -> Option<String> {
        self.endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .or_else(|| self.port.map(|p| format!("http://localhost:{p}")))
    }
}

/// A batch of services from the discovery service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub services: Vec<RemoteService>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl DiscoveryResult {
    /// The empty result returned whenever the discovery service fails.
    pub fn error() -> Self {
        Self {
            services: Vec::new(),
            total: 0,
            timestamp: Utc::now(),
            source: SOURCE_ERROR.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.source == SOURCE_ERROR
    }
}

/// Health document of the discovery service.
///
/// Unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryHealth {
    #[serde(default = "unknown")]
    pub status: String,
    #[serde(default, alias = "services_discovered")]
    pub services_discovered: u64,
    #[serde(default, alias = "docker_available")]
    pub docker_available: bool,
    #[serde(default, alias = "redis_available")]
    pub redis_available: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DiscoveryHealth {
    pub fn unavailable() -> Self {
        Self {
            status: "unavailable".to_string(),
            services_discovered: 0,
            docker_available: false,
            redis_available: false,
            extra: BTreeMap::new(),
        }
    }
}

/// Filters for listing services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFilter {
    #[serde(default, alias = "service_type")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "yes", alias = "use_cache", deserialize_with = "flag_or_true")]
    pub use_cache: bool,
}

impl Default for ServiceFilter {
    fn default() -> Self {
        Self {
            service_type: None,
            status: None,
            use_cache: true,
        }
    }
}

fn yes() -> bool {
    true
}

/// Where a discovered service was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoverySource {
    #[serde(rename = "mcp-discovery-service")]
    DiscoveryService,
    #[serde(rename = "docker")]
    Docker,
    #[serde(rename = "port_scan")]
    PortScan,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscoveryService => "mcp-discovery-service",
            Self::Docker => "docker",
            Self::PortScan => "port_scan",
        }
    }
}

/// One service found by a discovery pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredService {
    pub name: String,
    pub url: String,
    pub source: DiscoverySource,
    pub service_type: String,
    pub capabilities: Vec<String>,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<LivenessReport>,
}

impl DiscoveredService {
    /// Convert a discovery-service record; `None` when it has no usable URL.
    pub fn from_remote(remote: &RemoteService) -> Option<Self> {
        Some(Self {
            name: remote.name.clone(),
            url: remote.url()?,
            source: DiscoverySource::DiscoveryService,
            service_type: remote.service_type.clone(),
            capabilities: remote.capabilities.clone(),
            status: remote.status,
            container_id: remote.container_id.clone(),
            probe: None,
        })
    }
}

/// Parameters of one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    #[serde(default = "yes", alias = "scan_docker")]
    pub scan_docker: bool,
    #[serde(default = "default_scan_ports", alias = "scan_ports")]
    pub scan_ports: Vec<u16>,
    #[serde(default = "yes", alias = "scan_localhost")]
    pub scan_localhost: bool,
    #[serde(default = "yes", alias = "use_discovery_service")]
    pub use_discovery_service: bool,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
}

fn default_scan_ports() -> Vec<u16> {
    DEFAULT_SCAN_PORTS.to_vec()
}

fn default_sources() -> Vec<String> {
    vec!["docker".to_string(), "env".to_string()]
}

impl Default for DiscoverRequest {
    fn default() -> Self {
        Self {
            scan_docker: true,
            scan_ports: default_scan_ports(),
            scan_localhost: true,
            use_discovery_service: true,
            sources: default_sources(),
        }
    }
}
