//! Local fallback discovery.
//!
//! Two independent passes: running containers that look like tool services,
//! and a fixed list of local ports. Each hit is confirmed with a liveness
//! probe before it is reported.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::Docker;
use futures::future::join_all;
use thiserror::Error;

use super::types::{DiscoverRequest, DiscoveredService, DiscoverySource};
use crate::probe::{ProbeEngine, ProbeTimeouts};
use crate::registry::{AuthConfig, ServiceStatus};

/// Name fragments that mark a container as a tool service.
const NAME_MARKERS: &[&str] = &["mcp", "tool", "agent"];

/// Label prefix that marks a container as a tool service.
const LABEL_PREFIX: &str = "mcp.";

const LABEL_TYPE: &str = "mcp.type";
const LABEL_CAPABILITIES: &str = "mcp.capabilities";

pub const DEFAULT_SCAN_HOST: &str = "localhost";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("container runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    #[error("failed to list containers: {reason}")]
    ListFailed { reason: String },
}

// ─── Container runtime ───────────────────────────────────────────────────────

/// A running container, reduced to what discovery needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Published host ports.
    pub host_ports: Vec<u16>,
}

impl ContainerInfo {
    /// Whether the name or labels suggest a tool/agent/MCP role.
    pub fn looks_like_tool_service(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        NAME_MARKERS.iter().any(|m| name.contains(m))
            || self.labels.keys().any(|k| k.starts_with(LABEL_PREFIX))
    }

    pub fn service_type(&self) -> String {
        self.labels
            .get(LABEL_TYPE)
            .filter(|t| !t.is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.labels
            .get(LABEL_CAPABILITIES)
            .map(|caps| {
                caps.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn short_id(&self) -> String {
        self.id.chars().take(12).collect()
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Currently running containers.
    async fn list_running(&self) -> Result<Vec<ContainerInfo>, ScanError>;
}

/// Docker (or Podman's Docker-compatible socket) via bollard.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, ScanError> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| ScanError::RuntimeUnavailable {
                reason: e.to_string(),
            })?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<ContainerInfo>, ScanError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String>::default()))
            .await
            .map_err(|e| ScanError::ListFailed {
                reason: e.to_string(),
            })?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let host_ports: BTreeSet<u16> = c
                    .ports
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|p| p.public_port)
                    .collect();
                ContainerInfo {
                    id: c.id.unwrap_or_default(),
                    name: c
                        .names
                        .unwrap_or_default()
                        .into_iter()
                        .next()
                        .map(|n| n.trim_start_matches('/').to_string())
                        .unwrap_or_default(),
                    labels: c.labels.unwrap_or_default().into_iter().collect(),
                    host_ports: host_ports.into_iter().collect(),
                }
            })
            .collect())
    }
}

// ─── LocalScanner ────────────────────────────────────────────────────────────

/// Which passes to run and which ports to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub containers: bool,
    pub ports: bool,
    pub port_list: Vec<u16>,
}

impl From<&DiscoverRequest> for ScanOptions {
    fn from(req: &DiscoverRequest) -> Self {
        Self {
            containers: req.scan_docker,
            ports: req.scan_localhost,
            port_list: req.scan_ports.clone(),
        }
    }
}

pub struct LocalScanner {
    probe: ProbeEngine,
    timeouts: ProbeTimeouts,
    host: String,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl LocalScanner {
    pub fn new(probe: ProbeEngine, timeouts: ProbeTimeouts, host: impl Into<String>) -> Self {
        Self {
            probe,
            timeouts,
            host: host.into(),
            runtime: None,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Run the requested passes. Container results come first, then ports.
    pub async fn scan(&self, options: &ScanOptions) -> Vec<DiscoveredService> {
        let mut found = Vec::new();
        if options.containers {
            match self.scan_containers().await {
                Ok(hits) => found.extend(hits),
                Err(e) => tracing::warn!(error = %e, "container discovery failed"),
            }
        }
        if options.ports {
            found.extend(self.scan_ports(&options.port_list).await);
        }
        tracing::info!(count = found.len(), "local scan complete");
        found
    }

    /// Qualifying containers, each reported once at its first live port.
    pub async fn scan_containers(&self) -> Result<Vec<DiscoveredService>, ScanError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| ScanError::RuntimeUnavailable {
                reason: "no container runtime configured".to_string(),
            })?;

        let candidates: Vec<ContainerInfo> = runtime
            .list_running()
            .await?
            .into_iter()
            .filter(ContainerInfo::looks_like_tool_service)
            .collect();
        tracing::debug!(count = candidates.len(), "tool-like containers found");

        let results = join_all(candidates.iter().map(|c| self.probe_container(c))).await;
        Ok(results.into_iter().flatten().collect())
    }

    async fn probe_container(&self, container: &ContainerInfo) -> Option<DiscoveredService> {
        let probes = container.host_ports.iter().map(|port| async move {
            let url = format!("http://{}:{port}", self.host);
            let report = self
                .probe
                .check_liveness(&url, &AuthConfig::None, self.timeouts.liveness)
                .await;
            (url, report)
        });
        let (url, report) = join_all(probes)
            .await
            .into_iter()
            .find(|(_, report)| report.alive)?;

        tracing::info!(container = %container.name, url = %url, "discovered container service");
        Some(DiscoveredService {
            name: container.name.clone(),
            url,
            source: DiscoverySource::Docker,
            service_type: container.service_type(),
            capabilities: container.capabilities(),
            status: ServiceStatus::Healthy,
            container_id: Some(container.short_id()),
            probe: Some(report),
        })
    }

    /// Probe each port on the scan host concurrently.
    pub async fn scan_ports(&self, ports: &[u16]) -> Vec<DiscoveredService> {
        let probes = ports.iter().map(|&port| async move {
            let url = format!("http://{}:{port}", self.host);
            let report = self
                .probe
                .check_liveness(&url, &AuthConfig::None, self.timeouts.port_scan)
                .await;
            (port, url, report)
        });

        join_all(probes)
            .await
            .into_iter()
            .filter(|(_, _, report)| report.alive)
            .map(|(port, url, report)| DiscoveredService {
                name: format!("{}-{port}", self.host),
                url,
                source: DiscoverySource::PortScan,
                service_type: "unknown".to_string(),
                capabilities: Vec::new(),
                status: ServiceStatus::Healthy,
                container_id: None,
                probe: Some(report),
            })
            .collect()
    }
}
