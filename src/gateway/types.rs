//! Request and response values of the gateway operations.
//!
//! Every operation answers with one of these; failures are carried as
//! `success: false` / `error` fields rather than raised.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::discovery::{DiscoveredService, DiscoveryHealth, RemoteService};
use crate::probe::LivenessReport;
use crate::registry::{ServiceDescriptor, ServiceStatus, Tool};

pub const SOURCE_DISCOVERY_SERVICE: &str = "mcp-discovery-service";
pub const SOURCE_LOCAL_REGISTRY: &str = "local-registry";
pub const SOURCE_LOCAL_FALLBACK: &str = "local-fallback";

// ─── Servers ─────────────────────────────────────────────────────────────────

/// Which registries `list_servers` consults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSelection {
    #[default]
    All,
    Discovery,
    Local,
}

impl ServerSelection {
    pub fn includes_discovery(self) -> bool {
        matches!(self, Self::All | Self::Discovery)
    }

    pub fn includes_local(self) -> bool {
        matches!(self, Self::All | Self::Local)
    }
}

/// A server as reported by the discovery service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteServerEntry {
    pub name: String,
    pub url: Option<String>,
    pub service_type: String,
    pub capabilities: Vec<String>,
    pub status: ServiceStatus,
    pub source: &'static str,
}

impl From<&RemoteService> for RemoteServerEntry {
    fn from(svc: &RemoteService) -> Self {
        Self {
            name: svc.name.clone(),
            url: svc.url(),
            service_type: svc.service_type.clone(),
            capabilities: svc.capabilities.clone(),
            status: svc.status,
            source: SOURCE_DISCOVERY_SERVICE,
        }
    }
}

/// A server from the local registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalServerEntry {
    #[serde(flatten)]
    pub descriptor: ServiceDescriptor,
    pub source: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerEntry {
    Discovery(RemoteServerEntry),
    Local(LocalServerEntry),
}

impl ServerEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Discovery(e) => &e.name,
            Self::Local(e) => &e.descriptor.name,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::Discovery(e) => e.source,
            Self::Local(e) => e.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerListing {
    pub servers: Vec<ServerEntry>,
    pub count: usize,
    pub discovery_service_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServiceRecords {
    Remote(Vec<RemoteService>),
    Local(Vec<ServiceDescriptor>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceListing {
    pub services: ServiceRecords,
    pub total: usize,
    pub source: String,
    pub from_discovery_service: bool,
}

/// Body of a manual registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterServerRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "auth_type")]
    pub auth_type: Option<String>,
    #[serde(default, alias = "auth_token_env")]
    pub auth_token_env: Option<String>,
}

/// Result of a registry mutation requested over the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServiceDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_result: Option<LivenessReport>,
}

impl OperationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            server: None,
            probe_result: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            server: None,
            probe_result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryOutcome {
    pub discovered: Vec<DiscoveredService>,
    pub count: usize,
    pub source: String,
    pub discovery_service_available: bool,
    pub registered_total: usize,
}

// ─── Tools ───────────────────────────────────────────────────────────────────

/// A tool tagged with the service that serves it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServedTool {
    #[serde(flatten)]
    pub tool: Tool,
    pub server: String,
    pub server_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolListing {
    pub tools: Vec<ServedTool>,
    pub count: usize,
    pub categorized: BTreeMap<String, Vec<ServedTool>>,
    pub servers_queried: usize,
    /// Services whose catalog could not be fetched this time.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_servers: Vec<String>,
}

impl ToolListing {
    pub fn new(tools: Vec<ServedTool>, servers_queried: usize, failed_servers: Vec<String>) -> Self {
        let mut categorized: BTreeMap<String, Vec<ServedTool>> = BTreeMap::new();
        for tool in &tools {
            categorized
                .entry(tool.tool.category.clone())
                .or_default()
                .push(tool.clone());
        }
        Self {
            count: tools.len(),
            tools,
            categorized,
            servers_queried,
            failed_servers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTools {
    pub server: String,
    pub url: String,
    pub tools: Vec<Tool>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub server: String,
    pub tool: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub server: String,
    pub tool: String,
}

impl InvocationResult {
    pub fn failed(server: &str, tool: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            status: None,
            server: server.to_string(),
            tool: tool.to_string(),
        }
    }
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub discovery_service: DiscoveryServiceHealth,
    pub local_registry: LocalRegistryHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryServiceHealth {
    pub available: bool,
    pub url: String,
    pub health: Option<DiscoveryHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRegistryHealth {
    pub servers: BTreeMap<String, ServerHealth>,
    pub alive_count: usize,
    pub total_count: usize,
    pub registry_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    pub alive: bool,
    pub enabled: bool,
    pub url: String,
    pub status: ServiceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub tool_count: usize,
}
