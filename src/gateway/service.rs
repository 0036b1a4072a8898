//! The gateway: discovery, registry, tool listing and invocation composed
//! into the public operation set.
//!
//! Control flow for discovery: the external discovery service is asked
//! first; when it is down or finds nothing, the local scanner runs and its
//! hits are auto-registered. Tool listing and invocation always go through
//! the registry and the service's own endpoint, whichever path found it.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::errors::GatewayError;
use super::prompt::{function_specs, render_tool_context, MAX_FUNCTION_TOOLS};
use super::types::{
    DiscoveryOutcome, DiscoveryServiceHealth, HealthReport, InvocationResult, InvokeRequest,
    LocalRegistryHealth, LocalServerEntry, OperationOutcome, RegisterServerRequest,
    RemoteServerEntry, ServedTool, ServerEntry, ServerHealth, ServerListing, ServerSelection,
    ServerTools, ServiceListing, ServiceRecords, ToolListing, SOURCE_LOCAL_FALLBACK,
    SOURCE_LOCAL_REGISTRY,
};
use crate::config::GatewayConfig;
use crate::discovery::types::SOURCE_LOCAL;
use crate::discovery::{
    DiscoverRequest, DiscoveredService, DiscoveryClient, DockerRuntime, LocalScanner, ScanOptions,
    ServiceFilter,
};
use crate::probe::candidates::is_dot_segment;
use crate::probe::{ProbeEngine, ProbeError, ProbeTimeouts};
use crate::registry::{AuthConfig, RegistryStore, ServiceDescriptor, ServiceStatus, Tool};

/// Concurrent probes in a bulk fan-out.
const FAN_OUT: usize = 8;

pub struct Gateway {
    registry: Arc<RegistryStore>,
    discovery: DiscoveryClient,
    scanner: LocalScanner,
    probe: ProbeEngine,
    timeouts: ProbeTimeouts,
    default_discover: DiscoverRequest,
}

impl Gateway {
    pub fn new(
        registry: Arc<RegistryStore>,
        discovery: DiscoveryClient,
        scanner: LocalScanner,
        probe: ProbeEngine,
        timeouts: ProbeTimeouts,
    ) -> Self {
        Self {
            registry,
            discovery,
            scanner,
            probe,
            timeouts,
            default_discover: DiscoverRequest::default(),
        }
    }

    /// Wire every component from configuration and open the registry file.
    ///
    /// A missing container runtime only disables the container pass.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let timeouts = config.probe_timeouts()?;
        let probe = ProbeEngine::new()?;
        let discovery = DiscoveryClient::new(&config.discovery.url, config.discovery_timeout()?)?;

        let mut scanner = LocalScanner::new(probe.clone(), timeouts, &config.scan.host);
        match DockerRuntime::connect() {
            Ok(runtime) => scanner = scanner.with_runtime(Arc::new(runtime)),
            Err(e) => tracing::warn!(error = %e, "container discovery disabled"),
        }

        let registry = RegistryStore::open(config.registry_file(), &config.seed_config())
            .with_cache_ttl(config.cache_ttl());

        Ok(Self {
            default_discover: config.default_discover_request(),
            ..Self::new(Arc::new(registry), discovery, scanner, probe, timeouts)
        })
    }

    pub fn with_default_discover_request(mut self, request: DiscoverRequest) -> Self {
        self.default_discover = request;
        self
    }

    pub fn registry(&self) -> &Arc<RegistryStore> {
        &self.registry
    }

    pub fn discovery(&self) -> &DiscoveryClient {
        &self.discovery
    }

    /// Discovery parameters used when a caller supplies none.
    pub fn default_discover_request(&self) -> &DiscoverRequest {
        &self.default_discover
    }

    // ─── Servers ─────────────────────────────────────────────────────────────

    /// Servers from the discovery service and/or the local registry.
    ///
    /// A local entry is dropped when the discovery service already reported
    /// a server of the same name.
    pub async fn list_servers(&self, selection: ServerSelection) -> ServerListing {
        let available = self.discovery.is_available(false).await;
        let mut servers: Vec<ServerEntry> = Vec::new();

        if selection.includes_discovery() && available {
            let result = self.discovery.get_services(&ServiceFilter::default()).await;
            servers.extend(
                result
                    .services
                    .iter()
                    .map(|svc| ServerEntry::Discovery(RemoteServerEntry::from(svc))),
            );
        }

        if selection.includes_local() {
            for descriptor in self.registry.list_all().await {
                if servers.iter().any(|s| s.name() == descriptor.name) {
                    continue;
                }
                servers.push(ServerEntry::Local(LocalServerEntry {
                    descriptor,
                    source: SOURCE_LOCAL_REGISTRY,
                }));
            }
        }

        ServerListing {
            count: servers.len(),
            servers,
            discovery_service_available: available,
        }
    }

    /// Services from the discovery service, or the local registry when it
    /// is unavailable.
    pub async fn list_services(&self, filter: &ServiceFilter) -> ServiceListing {
        if self.discovery.is_available(false).await {
            let result = self.discovery.get_services(filter).await;
            return ServiceListing {
                total: result.total,
                services: ServiceRecords::Remote(result.services),
                source: result.source,
                from_discovery_service: true,
            };
        }

        let services = self.registry.list_all().await;
        ServiceListing {
            total: services.len(),
            services: ServiceRecords::Local(services),
            source: SOURCE_LOCAL_FALLBACK.to_string(),
            from_discovery_service: false,
        }
    }

    /// Register a server after confirming it answers a liveness probe.
    pub async fn register_server(&self, request: RegisterServerRequest) -> OperationOutcome {
        let name = request.name.trim();
        if name.is_empty() {
            return OperationOutcome::failed("server name is required");
        }

        let auth = AuthConfig::from_parts(
            request.auth_type.as_deref(),
            request.auth_token_env.as_deref(),
        );
        let mut descriptor = ServiceDescriptor::new(name, request.url.trim())
            .with_description(request.description.unwrap_or_default())
            .with_auth(auth);
        if let Err(reason) = descriptor.validate_endpoint() {
            return OperationOutcome::failed(format!("invalid url '{}': {reason}", request.url));
        }

        let report = self
            .probe
            .check_liveness(&descriptor.endpoint, &descriptor.auth, self.timeouts.liveness)
            .await;
        if !report.alive {
            tracing::info!(server = name, url = %descriptor.endpoint, "registration refused, server not responding");
            return OperationOutcome {
                probe_result: Some(report),
                ..OperationOutcome::failed(format!(
                    "Server at {} is not responding",
                    descriptor.endpoint
                ))
            };
        }

        descriptor.status = ServiceStatus::Healthy;
        match self.registry.register(descriptor).await {
            Ok(registered) => OperationOutcome {
                server: Some(registered),
                ..OperationOutcome::ok(format!("Server {name} registered successfully"))
            },
            Err(e) => OperationOutcome::failed(e.to_string()),
        }
    }

    pub async fn unregister_server(&self, name: &str) -> OperationOutcome {
        if self.registry.unregister(name).await {
            OperationOutcome::ok(format!("Server {name} unregistered"))
        } else {
            OperationOutcome::failed(format!("Server {name} not found"))
        }
    }

    // ─── Discovery ───────────────────────────────────────────────────────────

    /// Run one discovery pass and auto-register what it finds.
    ///
    /// Existing descriptors are never overwritten, apart from disabled
    /// catalog placeholders.
    pub async fn discover(&self, request: &DiscoverRequest) -> DiscoveryOutcome {
        let mut discovered: Vec<DiscoveredService> = Vec::new();
        let mut source = SOURCE_LOCAL.to_string();

        if request.use_discovery_service && self.discovery.is_available(false).await {
            let result = self.discovery.refresh_services(true, &request.sources).await;
            discovered = result
                .services
                .iter()
                .filter_map(DiscoveredService::from_remote)
                .collect();
            if !discovered.is_empty() {
                tracing::info!(count = discovered.len(), source = %result.source, "discovered services via discovery service");
                source = result.source;
            }
        }

        if discovered.is_empty() {
            tracing::info!("running local discovery");
            discovered = self.scanner.scan(&ScanOptions::from(request)).await;
        }

        let mut added = 0;
        for found in &discovered {
            let descriptor = ServiceDescriptor::new(&found.name, &found.url)
                .with_description(format!("Auto-discovered from {}", found.source.as_str()))
                .with_service_type(&found.service_type)
                .with_capabilities(found.capabilities.iter().cloned());
            match self.registry.register_discovered(descriptor).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(server = %found.name, error = %e, "skipping discovered server"),
            }
        }
        tracing::info!(found = discovered.len(), added, source = %source, "discovery complete");

        DiscoveryOutcome {
            count: discovered.len(),
            discovered,
            source,
            discovery_service_available: self.discovery.is_available(false).await,
            registered_total: self.registry.len().await,
        }
    }

    // ─── Tools ───────────────────────────────────────────────────────────────

    /// Tool catalog of one service, from cache unless stale or `refresh`.
    ///
    /// Failed fetches are not cached.
    async fn tools_for(
        &self,
        service: &ServiceDescriptor,
        refresh: bool,
    ) -> Result<Vec<Tool>, ProbeError> {
        if !refresh && self.registry.is_cache_fresh(&service.name).await {
            return Ok(self.registry.cached_tools(&service.name).await);
        }
        let tools = self.probe.fetch_tools(service, self.timeouts.catalog).await?;
        self.registry.update_tools(&service.name, tools.clone()).await;
        Ok(tools)
    }

    /// Tools of every enabled service, fetched concurrently.
    ///
    /// A service whose fetch fails is logged and left out.
    pub async fn list_all_tools(&self, refresh: bool) -> ToolListing {
        let services: Vec<ServiceDescriptor> = self
            .registry
            .list_all()
            .await
            .into_iter()
            .filter(|s| s.enabled)
            .collect();
        let queried = services.len();

        let results: Vec<(ServiceDescriptor, Result<Vec<Tool>, ProbeError>)> =
            stream::iter(services)
                .map(|service| async move {
                    let result = self.tools_for(&service, refresh).await;
                    (service, result)
                })
                .buffered(FAN_OUT)
                .collect()
                .await;

        let mut tools = Vec::new();
        let mut failed = Vec::new();
        for (service, result) in results {
            match result {
                Ok(list) => tools.extend(list.into_iter().map(|tool| ServedTool {
                    tool,
                    server: service.name.clone(),
                    server_url: service.endpoint.clone(),
                })),
                Err(e) => {
                    tracing::warn!(server = %service.name, error = %e, "failed to fetch tools");
                    failed.push(service.name);
                }
            }
        }

        ToolListing::new(tools, queried, failed)
    }

    /// Tools of one named service. A failed fetch yields an empty list with
    /// the error attached.
    pub async fn list_server_tools(
        &self,
        name: &str,
        refresh: bool,
    ) -> Result<ServerTools, GatewayError> {
        let service = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| GatewayError::ServerNotFound {
                name: name.to_string(),
            })?;

        let (tools, error) = match self.tools_for(&service, refresh).await {
            Ok(tools) => (tools, None),
            Err(e) => {
                tracing::warn!(server = name, error = %e, "failed to fetch tools");
                (Vec::new(), Some(e.to_string()))
            }
        };
        Ok(ServerTools {
            server: service.name,
            url: service.endpoint,
            count: tools.len(),
            tools,
            error,
        })
    }

    /// Invoke a tool on a registered, enabled service.
    pub async fn invoke_tool(&self, request: &InvokeRequest) -> InvocationResult {
        let (server, tool) = (request.server.as_str(), request.tool.as_str());
        let invalid = if tool.trim().is_empty() {
            Some("tool name is required")
        } else if is_dot_segment(tool) {
            Some("tool name cannot be '.' or '..'")
        } else {
            None
        };
        if let Some(reason) = invalid {
            let err = GatewayError::InvalidRequest {
                reason: reason.to_string(),
            };
            return InvocationResult::failed(server, tool, err.to_string());
        }

        let service = match self.resolve_enabled(server).await {
            Ok(s) => s,
            Err(e) => return InvocationResult::failed(server, tool, e.to_string()),
        };

        match self
            .probe
            .invoke(
                &service,
                tool,
                request.method.as_deref(),
                &request.parameters,
                self.timeouts.invocation,
            )
            .await
        {
            Ok(result) => InvocationResult {
                success: true,
                result: Some(result),
                error: None,
                status: None,
                server: server.to_string(),
                tool: tool.to_string(),
            },
            Err(e @ ProbeError::Rejected { .. }) => InvocationResult {
                status: e.status(),
                ..InvocationResult::failed(server, tool, e.to_string())
            },
            Err(e) => {
                tracing::warn!(server, tool, error = %e, "tool invocation failed");
                InvocationResult::failed(
                    server,
                    tool,
                    format!("Could not invoke tool {tool} on server {server}"),
                )
            }
        }
    }

    async fn resolve_enabled(&self, name: &str) -> Result<ServiceDescriptor, GatewayError> {
        let service = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| GatewayError::ServerNotFound {
                name: name.to_string(),
            })?;
        if !service.enabled {
            return Err(GatewayError::ServerDisabled {
                name: name.to_string(),
            });
        }
        Ok(service)
    }

    // ─── Health ──────────────────────────────────────────────────────────────

    /// Discovery-service health plus a liveness probe of every registered
    /// service. Probe results are recorded into the registry.
    pub async fn health(&self) -> HealthReport {
        let available = self.discovery.is_available(false).await;
        let discovery_health = if available {
            Some(self.discovery.get_health().await)
        } else {
            None
        };

        let services = self.registry.list_all().await;
        let total = services.len();
        let checks: Vec<(String, ServerHealth)> = stream::iter(services)
            .map(|service| async move {
                let report = self
                    .probe
                    .check_liveness(&service.endpoint, &service.auth, self.timeouts.health)
                    .await;
                let status = self
                    .registry
                    .record_probe(&service.name, report.alive)
                    .await
                    .unwrap_or(service.status());
                let last_seen = match self.registry.get(&service.name).await {
                    Some(current) => current.last_seen(),
                    None => service.last_seen(),
                };
                let health = ServerHealth {
                    alive: report.alive,
                    enabled: service.enabled,
                    url: service.endpoint.clone(),
                    status,
                    last_seen,
                    tool_count: self.registry.tool_count(&service.name).await,
                };
                (service.name, health)
            })
            .buffered(FAN_OUT)
            .collect()
            .await;

        let servers: std::collections::BTreeMap<String, ServerHealth> =
            checks.into_iter().collect();
        let alive_count = servers.values().filter(|h| h.alive).count();

        HealthReport {
            healthy: alive_count > 0 || available,
            discovery_service: DiscoveryServiceHealth {
                available,
                url: self.discovery.base_url().to_string(),
                health: discovery_health,
            },
            local_registry: LocalRegistryHealth {
                servers,
                alive_count,
                total_count: total,
                registry_file: self.registry.path().map(|p| p.display().to_string()),
            },
        }
    }

    // ─── Prompt integration ──────────────────────────────────────────────────

    /// Markdown summary of known tools for an LLM system prompt; empty when
    /// no tools are known.
    pub async fn build_prompt_context(&self) -> String {
        let listing = self.list_all_tools(false).await;
        render_tool_context(&listing.tools)
    }

    /// Cached tools of enabled services as OpenAI function specs. No network.
    pub async fn openai_tools(&self) -> Vec<serde_json::Value> {
        let mut tools = Vec::new();
        for service in self.registry.list_all().await {
            if !service.enabled {
                continue;
            }
            tools.extend(self.registry.cached_tools(&service.name).await);
            if tools.len() >= MAX_FUNCTION_TOOLS {
                break;
            }
        }
        function_specs(&tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{ContainerInfo, ContainerRuntime, ScanError};
    use crate::test_support::{dead_base_url, StubServer};
    use serde_json::json;
    use std::time::Duration;

    fn timeouts() -> ProbeTimeouts {
        ProbeTimeouts {
            liveness: Duration::from_secs(1),
            port_scan: Duration::from_secs(1),
            health: Duration::from_secs(1),
            catalog: Duration::from_millis(500),
            invocation: Duration::from_secs(2),
        }
    }

    fn gateway_with(discovery_url: &str, registry: RegistryStore) -> Gateway {
        let probe = ProbeEngine::new().unwrap();
        let discovery = DiscoveryClient::new(discovery_url, Duration::from_secs(1)).unwrap();
        let scanner = LocalScanner::new(probe.clone(), timeouts(), "127.0.0.1");
        Gateway::new(Arc::new(registry), discovery, scanner, probe, timeouts())
    }

    async fn offline_gateway() -> Gateway {
        gateway_with(&dead_base_url().await, RegistryStore::in_memory())
    }

    fn no_scan() -> DiscoverRequest {
        DiscoverRequest {
            scan_docker: false,
            scan_localhost: false,
            ..DiscoverRequest::default()
        }
    }

    async fn add(gw: &Gateway, name: &str, url: &str) {
        gw.registry()
            .register(ServiceDescriptor::new(name, url))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_list_unregister() {
        let stub = StubServer::new()
            .json("GET", "/health", 200, json!({"status": "ok"}))
            .spawn()
            .await;
        let gw = offline_gateway().await;

        let outcome = gw
            .register_server(RegisterServerRequest {
                name: "svc-a".into(),
                url: stub.base_url.clone(),
                description: None,
                auth_type: None,
                auth_token_env: None,
            })
            .await;
        assert!(outcome.success, "{outcome:?}");

        let listing = gw.list_servers(ServerSelection::Local).await;
        assert_eq!(listing.count, 1);
        match &listing.servers[0] {
            ServerEntry::Local(entry) => {
                assert_eq!(entry.descriptor.name, "svc-a");
                assert_eq!(entry.descriptor.status(), ServiceStatus::Healthy);
                assert_eq!(entry.source, "local-registry");
            }
            other => panic!("expected local entry, got {other:?}"),
        }

        assert!(gw.unregister_server("svc-a").await.success);
        assert_eq!(gw.list_servers(ServerSelection::Local).await.count, 0);
        assert!(!gw.unregister_server("svc-a").await.success);
    }

    #[tokio::test]
    async fn test_register_refuses_dead_server() {
        let gw = offline_gateway().await;
        let outcome = gw
            .register_server(RegisterServerRequest {
                name: "ghost".into(),
                url: dead_base_url().await,
                description: None,
                auth_type: None,
                auth_token_env: None,
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.probe_result.is_some_and(|r| !r.alive));
        assert!(gw.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_url_without_probing() {
        let gw = offline_gateway().await;
        let outcome = gw
            .register_server(RegisterServerRequest {
                name: "bad".into(),
                url: "ftp://nowhere".into(),
                description: None,
                auth_type: None,
                auth_token_env: None,
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.probe_result.is_none());
    }

    #[tokio::test]
    async fn test_list_servers_dedupes_against_discovery() {
        let disco = StubServer::new()
            .json("GET", "/health", 200, json!({"status": "healthy"}))
            .json(
                "GET",
                "/services",
                200,
                json!({"services": [{"name": "fs", "endpoint": "http://fs:1", "status": "healthy"}]}),
            )
            .spawn()
            .await;
        let gw = gateway_with(&disco.base_url, RegistryStore::in_memory());
        add(&gw, "fs", "http://localhost:9001").await;
        add(&gw, "web", "http://localhost:9002").await;

        let listing = gw.list_servers(ServerSelection::All).await;

        assert!(listing.discovery_service_available);
        assert_eq!(listing.count, 2);
        assert_eq!(listing.servers[0].source(), "mcp-discovery-service");
        assert_eq!(listing.servers[1].name(), "web");
    }

    #[tokio::test]
    async fn test_list_services_falls_back_to_registry() {
        let gw = offline_gateway().await;
        add(&gw, "fs", "http://localhost:9001").await;

        let listing = gw.list_services(&ServiceFilter::default()).await;

        assert_eq!(listing.source, "local-fallback");
        assert!(!listing.from_discovery_service);
        assert_eq!(listing.total, 1);
    }

    #[tokio::test]
    async fn test_discover_falls_back_to_local_source() {
        let tool_svc = StubServer::new()
            .json("GET", "/health", 200, json!({}))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        let request = DiscoverRequest {
            scan_docker: false,
            scan_ports: vec![tool_svc.port],
            ..DiscoverRequest::default()
        };

        let outcome = gw.discover(&request).await;

        assert_eq!(outcome.source, "local");
        assert!(!outcome.discovery_service_available);
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.registered_total, 1);
        let registered = gw
            .registry()
            .get(&format!("127.0.0.1-{}", tool_svc.port))
            .await
            .unwrap();
        assert_eq!(registered.description, "Auto-discovered from port_scan");
    }

    #[tokio::test]
    async fn test_discover_uses_discovery_service_source() {
        let disco = StubServer::new()
            .json("GET", "/health", 200, json!({}))
            .json(
                "POST",
                "/services/refresh",
                200,
                json!({
                    "services": [{
                        "name": "fs",
                        "port": 9001,
                        "discovered_at": "2024-05-01T12:00:00.123456"
                    }],
                    "total": 1,
                    "source": "docker"
                }),
            )
            .spawn()
            .await;
        let gw = gateway_with(&disco.base_url, RegistryStore::in_memory());

        let outcome = gw.discover(&no_scan()).await;

        assert_eq!(outcome.source, "docker");
        assert_eq!(outcome.discovered[0].url, "http://localhost:9001");
        assert_eq!(outcome.registered_total, 1);
    }

    #[tokio::test]
    async fn test_discover_empty_service_result_falls_back() {
        let disco = StubServer::new()
            .json("GET", "/health", 200, json!({}))
            .json("POST", "/services/refresh", 200, json!({"services": [], "source": "docker"}))
            .spawn()
            .await;
        let gw = gateway_with(&disco.base_url, RegistryStore::in_memory());

        let outcome = gw.discover(&no_scan()).await;

        assert_eq!(outcome.source, "local");
        assert_eq!(outcome.count, 0);
    }

    #[tokio::test]
    async fn test_discover_never_overwrites_curated() {
        let tool_svc = StubServer::new()
            .json("GET", "/health", 200, json!({}))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        let name = format!("127.0.0.1-{}", tool_svc.port);
        gw.registry()
            .register(ServiceDescriptor::new(&name, "http://elsewhere:1").with_description("curated"))
            .await
            .unwrap();

        let request = DiscoverRequest {
            scan_docker: false,
            scan_ports: vec![tool_svc.port],
            ..DiscoverRequest::default()
        };
        gw.discover(&request).await;

        let kept = gw.registry().get(&name).await.unwrap();
        assert_eq!(kept.endpoint, "http://elsewhere:1");
        assert_eq!(kept.description, "curated");
    }

    #[tokio::test]
    async fn test_discover_runs_container_pass() {
        struct OneContainer(u16);

        #[async_trait::async_trait]
        impl ContainerRuntime for OneContainer {
            async fn list_running(&self) -> Result<Vec<ContainerInfo>, ScanError> {
                Ok(vec![ContainerInfo {
                    id: "abcdef0123456789".into(),
                    name: "fs-mcp".into(),
                    labels: [("mcp.type".to_string(), "filesystem".to_string())].into(),
                    host_ports: vec![self.0],
                }])
            }
        }

        let tool_svc = StubServer::new()
            .json("GET", "/health", 200, json!({}))
            .spawn()
            .await;
        let probe = ProbeEngine::new().unwrap();
        let scanner = LocalScanner::new(probe.clone(), timeouts(), "127.0.0.1")
            .with_runtime(Arc::new(OneContainer(tool_svc.port)));
        let discovery = DiscoveryClient::new(dead_base_url().await, Duration::from_secs(1)).unwrap();
        let gw = Gateway::new(
            Arc::new(RegistryStore::in_memory()),
            discovery,
            scanner,
            probe,
            timeouts(),
        );
        let request = DiscoverRequest {
            scan_localhost: false,
            ..DiscoverRequest::default()
        };

        let outcome = gw.discover(&request).await;

        assert_eq!(outcome.count, 1);
        let registered = gw.registry().get("fs-mcp").await.unwrap();
        assert_eq!(registered.service_type, "filesystem");
        assert_eq!(registered.description, "Auto-discovered from docker");
    }

    #[tokio::test]
    async fn test_tool_cache_avoids_second_fetch() {
        let svc = StubServer::new()
            .json("GET", "/api/tools", 200, json!([{"name": "read_file", "category": "fs"}]))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        add(&gw, "fs", &svc.base_url).await;

        let first = gw.list_all_tools(false).await;
        let second = gw.list_all_tools(false).await;

        assert_eq!(svc.hit_count(), 1);
        assert_eq!(first.tools, second.tools);
        assert_eq!(
            serde_json::to_string(&first.tools).unwrap(),
            serde_json::to_string(&second.tools).unwrap()
        );
        assert_eq!(first.categorized["fs"].len(), 1);

        gw.list_all_tools(true).await;
        assert_eq!(svc.hit_count(), 2);
    }

    #[tokio::test]
    async fn test_list_all_tools_survives_slow_service() {
        let a = StubServer::new()
            .json("GET", "/api/tools", 200, json!({"tools": [{"name": "a1"}]}))
            .spawn()
            .await;
        let b = StubServer::new()
            .json("GET", "/tools", 200, json!({"data": [{"name": "b1"}, {"name": "b2"}]}))
            .spawn()
            .await;
        let slow = StubServer::new()
            .slow("GET", "/api/tools", Duration::from_secs(10), json!([{"name": "never"}]))
            .slow("GET", "/tools", Duration::from_secs(10), json!([]))
            .slow("GET", "/api/v1/tools", Duration::from_secs(10), json!([]))
            .slow("GET", "/mcp/tools", Duration::from_secs(10), json!([]))
            .slow("GET", "/.well-known/mcp.json", Duration::from_secs(10), json!([]))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        add(&gw, "a", &a.base_url).await;
        add(&gw, "b", &b.base_url).await;
        add(&gw, "c-slow", &slow.base_url).await;

        let listing = gw.list_all_tools(false).await;

        let mut names: Vec<_> = listing.tools.iter().map(|t| t.tool.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a1", "b1", "b2"]);
        assert_eq!(listing.servers_queried, 3);
        assert_eq!(listing.failed_servers, vec!["c-slow"]);
        assert!(!gw.registry().is_cache_fresh("c-slow").await);
    }

    #[tokio::test]
    async fn test_disabled_services_not_listed() {
        let svc = StubServer::new()
            .json("GET", "/api/tools", 200, json!([{"name": "x"}]))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        gw.registry()
            .register(ServiceDescriptor::new("off", &svc.base_url).disabled())
            .await
            .unwrap();

        let listing = gw.list_all_tools(false).await;

        assert_eq!(listing.count, 0);
        assert_eq!(listing.servers_queried, 0);
        assert_eq!(svc.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_list_server_tools_unknown() {
        let gw = offline_gateway().await;
        let err = gw.list_server_tools("nope", false).await.unwrap_err();
        assert!(matches!(err, GatewayError::ServerNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_server_tools_failure_is_empty_with_error() {
        let gw = offline_gateway().await;
        add(&gw, "gone", &dead_base_url().await).await;
        let tools = gw.list_server_tools("gone", false).await.unwrap();
        assert_eq!(tools.count, 0);
        assert!(tools.error.is_some());
    }

    #[tokio::test]
    async fn test_invoke_third_candidate() {
        let svc = StubServer::new()
            .json("POST", "/api/tools/echo", 200, json!({"echoed": "hi"}))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        add(&gw, "svc", &svc.base_url).await;

        let result = gw
            .invoke_tool(&InvokeRequest {
                server: "svc".into(),
                tool: "echo".into(),
                method: None,
                parameters: json!({"text": "hi"}),
            })
            .await;

        assert!(result.success, "{result:?}");
        assert_eq!(result.result, Some(json!({"echoed": "hi"})));
        assert_eq!(result.server, "svc");
        assert_eq!(result.tool, "echo");
        assert_eq!(
            svc.hit_lines(),
            vec![
                "POST /api/tools/echo/invoke",
                "POST /tools/echo/invoke",
                "POST /api/tools/echo",
            ]
        );
    }

    #[tokio::test]
    async fn test_invoke_terminal_status() {
        let svc = StubServer::new()
            .text("POST", "/api/tools/echo/invoke", 500, "exploded")
            .spawn()
            .await;
        let gw = offline_gateway().await;
        add(&gw, "svc", &svc.base_url).await;

        let result = gw
            .invoke_tool(&InvokeRequest {
                server: "svc".into(),
                tool: "echo".into(),
                method: None,
                parameters: json!({}),
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.status, Some(500));
        assert_eq!(result.error.as_deref(), Some("HTTP 500: exploded"));
        assert_eq!(svc.hit_count(), 1);
    }

    #[tokio::test]
    async fn test_invoke_exhausted() {
        let svc = StubServer::new().spawn().await;
        let gw = offline_gateway().await;
        add(&gw, "svc", &svc.base_url).await;

        let result = gw
            .invoke_tool(&InvokeRequest {
                server: "svc".into(),
                tool: "echo".into(),
                method: None,
                parameters: json!({}),
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Could not invoke tool echo on server svc"));
        assert_eq!(svc.hit_count(), 5);
    }

    #[tokio::test]
    async fn test_invoke_tool_name_stays_in_one_segment() {
        let svc = StubServer::new()
            .json("POST", "/api/tools/..%2Fadmin/invoke", 200, json!({"ok": true}))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        add(&gw, "svc", &svc.base_url).await;

        let result = gw
            .invoke_tool(&InvokeRequest {
                server: "svc".into(),
                tool: "../admin".into(),
                method: None,
                parameters: json!({}),
            })
            .await;

        assert!(result.success, "{result:?}");
        assert_eq!(svc.hit_lines(), vec!["POST /api/tools/..%2Fadmin/invoke"]);
    }

    #[tokio::test]
    async fn test_invoke_dot_tool_name_rejected() {
        let svc = StubServer::new().spawn().await;
        let gw = offline_gateway().await;
        add(&gw, "svc", &svc.base_url).await;

        for tool in [".", ".."] {
            let result = gw
                .invoke_tool(&InvokeRequest {
                    server: "svc".into(),
                    tool: tool.into(),
                    method: None,
                    parameters: json!({}),
                })
                .await;
            assert!(!result.success);
            assert!(result.error.unwrap().contains("cannot be"));
        }
        assert_eq!(svc.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_invoke_unknown_and_disabled_make_no_calls() {
        let svc = StubServer::new().spawn().await;
        let gw = offline_gateway().await;
        gw.registry()
            .register(ServiceDescriptor::new("off", &svc.base_url).disabled())
            .await
            .unwrap();

        let req = |server: &str| InvokeRequest {
            server: server.into(),
            tool: "echo".into(),
            method: None,
            parameters: json!({}),
        };
        let missing = gw.invoke_tool(&req("missing")).await;
        let disabled = gw.invoke_tool(&req("off")).await;

        assert_eq!(missing.error.as_deref(), Some("Server missing not found"));
        assert_eq!(disabled.error.as_deref(), Some("Server off is disabled"));
        assert_eq!(svc.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_health_records_probes() {
        let up = StubServer::new()
            .json("GET", "/health", 200, json!({}))
            .spawn()
            .await;
        let gw = offline_gateway().await;
        add(&gw, "up", &up.base_url).await;
        add(&gw, "down", &dead_base_url().await).await;

        let report = gw.health().await;

        assert!(report.healthy);
        assert!(!report.discovery_service.available);
        assert!(report.discovery_service.health.is_none());
        assert_eq!(report.local_registry.alive_count, 1);
        assert_eq!(report.local_registry.total_count, 2);
        assert!(report.local_registry.servers["up"].alive);
        assert_eq!(
            gw.registry().get("down").await.unwrap().status(),
            ServiceStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_health_unhealthy_when_nothing_answers() {
        let gw = offline_gateway().await;
        add(&gw, "down", &dead_base_url().await).await;
        assert!(!gw.health().await.healthy);
    }

    #[tokio::test]
    async fn test_prompt_context_and_openai_tools() {
        let svc = StubServer::new()
            .json(
                "GET",
                "/api/tools",
                200,
                json!([{"name": "read_file", "description": "Read a file",
                        "parameters": [{"name": "path", "type": "string", "required": true}]}]),
            )
            .spawn()
            .await;
        let gw = offline_gateway().await;
        add(&gw, "fs", &svc.base_url).await;

        assert!(gw.openai_tools().await.is_empty());

        let context = gw.build_prompt_context().await;
        assert!(context.contains("- **read_file** (fs): Read a file"));
        assert!(context.contains("  - `path` (string, required)"));

        let specs = gw.openai_tools().await;
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0]["function"]["name"], "mcp_read_file");
    }

    #[tokio::test]
    async fn test_prompt_context_empty_without_tools() {
        let gw = offline_gateway().await;
        assert_eq!(gw.build_prompt_context().await, "");
    }
}
