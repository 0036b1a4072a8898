//! Durable registry of tool service descriptors.
//!
//! One `RegistryStore` is opened at process start and shared (behind an
//! `Arc`) by every request. Descriptors and the tool cache live behind a
//! single async mutex; every mutation rewrites the JSON file while the lock
//! is held, so concurrent registrations cannot interleave partial writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::cache::ToolCache;
use super::catalog;
use super::errors::RegistryError;
use super::types::{
    AuthConfig, DescriptorOrigin, ServiceDescriptor, ServiceStatus, Tool,
};

// ─── Seeding ─────────────────────────────────────────────────────────────────

/// Default placeholder base URL for catalog-declared servers.
pub const DEFAULT_CATALOG_BASE_URL: &str = "http://localhost:11003";

/// Descriptors seeded on every startup unless already present.
pub fn default_descriptors() -> Vec<ServiceDescriptor> {
    vec![ServiceDescriptor::new("github-mcp", "http://localhost:11003")
        .with_description("GitHub MCP Server for repository operations")
        .with_service_type("github")
        .with_auth(AuthConfig::Bearer {
            token_env: "GITHUB_TOKEN".to_string(),
        })
        .with_origin(DescriptorOrigin::Default)]
}

/// What to seed into the registry when it is opened.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub defaults: Vec<ServiceDescriptor>,
    pub tool_catalog: Option<PathBuf>,
    pub catalog_base_url: String,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            defaults: default_descriptors(),
            tool_catalog: None,
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
        }
    }
}

impl SeedConfig {
    /// Seed nothing.
    pub fn none() -> Self {
        Self {
            defaults: Vec::new(),
            tool_catalog: None,
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
        }
    }
}

// ─── Persistent Format ──────────────────────────────────────────────────────

/// On-disk format for `mcp-registry.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRegistry {
    #[serde(default)]
    servers: BTreeMap<String, ServiceDescriptor>,
    #[serde(default, alias = "updated_at")]
    updated_at: Option<DateTime<Utc>>,
}

// ─── RegistryStore ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct RegistryState {
    services: BTreeMap<String, ServiceDescriptor>,
    cache: ToolCache,
}

/// Keyed store of service descriptors plus their cached tool catalogs.
#[derive(Debug)]
pub struct RegistryStore {
    state: Mutex<RegistryState>,
    /// `None` for in-memory stores (no disk I/O).
    path: Option<PathBuf>,
}

impl RegistryStore {
    /// Open the registry at `path`, load what is there, and apply seeds.
    ///
    /// A missing or corrupt file starts the registry empty (with a warning)
    /// rather than failing startup.
    pub fn open(path: impl Into<PathBuf>, seed: &SeedConfig) -> Self {
        let path = path.into();
        let mut services = match load_from_disk(&path) {
            Ok(services) => {
                tracing::info!(
                    count = services.len(),
                    path = %path.display(),
                    "loaded MCP registry"
                );
                services
            }
            Err(e) => {
                tracing::warn!(error = %e, "starting with an empty MCP registry");
                BTreeMap::new()
            }
        };

        let seeded = apply_seeds(&mut services, seed);
        if seeded > 0 {
            tracing::info!(seeded, "seeded default and catalog servers");
            log_persist_error(write_registry(&path, &services));
        }

        Self {
            state: Mutex::new(RegistryState {
                services,
                cache: ToolCache::new(),
            }),
            path: Some(path),
        }
    }

    /// A registry with no backing file and no seeds.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                services: BTreeMap::new(),
                cache: ToolCache::new(),
            }),
            path: None,
        }
    }

    /// Override the tool cache TTL (fresh stores only).
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.state.get_mut().cache = ToolCache::with_ttl(ttl);
        self
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush the registry one final time.
    pub async fn close(&self) {
        let state = self.state.lock().await;
        self.persist_logged(&state.services);
        tracing::info!(count = state.services.len(), "MCP registry closed");
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Register or update a descriptor (last write wins by name).
    ///
    /// Stamps `last_seen` and persists. Fails only if the endpoint is not a
    /// valid http(s) URL.
    pub async fn register(
        &self,
        mut descriptor: ServiceDescriptor,
    ) -> Result<ServiceDescriptor, RegistryError> {
        validate(&descriptor)?;
        descriptor.last_seen = Some(Utc::now());

        let mut state = self.state.lock().await;
        state
            .services
            .insert(descriptor.name.clone(), descriptor.clone());
        self.persist_logged(&state.services);

        tracing::info!(
            server = %descriptor.name,
            endpoint = %descriptor.endpoint,
            "registered MCP server"
        );
        Ok(descriptor)
    }

    /// Insert a descriptor found by discovery unless the name is taken.
    ///
    /// Only disabled catalog placeholders may be replaced. Returns `true`
    /// when the registry changed.
    pub async fn register_discovered(
        &self,
        mut descriptor: ServiceDescriptor,
    ) -> Result<bool, RegistryError> {
        validate(&descriptor)?;

        let mut state = self.state.lock().await;
        let replaceable = match state.services.get(&descriptor.name) {
            None => true,
            Some(existing) => existing.origin == DescriptorOrigin::Catalog,
        };
        if !replaceable {
            return Ok(false);
        }

        descriptor.origin = DescriptorOrigin::Discovered;
        descriptor.enabled = true;
        descriptor.last_seen = Some(Utc::now());
        tracing::info!(
            server = %descriptor.name,
            endpoint = %descriptor.endpoint,
            "auto-registered discovered MCP server"
        );
        state.services.insert(descriptor.name.clone(), descriptor);
        self.persist_logged(&state.services);
        Ok(true)
    }

    /// Remove a descriptor and its cached tools.
    pub async fn unregister(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.services.remove(name).is_none() {
            return false;
        }
        state.cache.remove(name);
        self.persist_logged(&state.services);
        tracing::info!(server = name, "unregistered MCP server");
        true
    }

    /// Record the outcome of a liveness probe.
    ///
    /// Returns the new status, or `None` if the name is unknown.
    pub async fn record_probe(&self, name: &str, alive: bool) -> Option<ServiceStatus> {
        let mut state = self.state.lock().await;
        let descriptor = state.services.get_mut(name)?;
        let status = ServiceStatus::from_alive(alive);
        descriptor.status = status;
        if alive {
            descriptor.last_seen = Some(Utc::now());
        }
        self.persist_logged(&state.services);
        Some(status)
    }

    /// Store a freshly fetched tool catalog.
    ///
    /// A successful fetch also marks the service healthy and seen.
    pub async fn update_tools(&self, name: &str, tools: Vec<Tool>) {
        let mut state = self.state.lock().await;
        state.cache.put(name, tools.clone());
        if let Some(descriptor) = state.services.get_mut(name) {
            descriptor.tool_catalog = tools;
            descriptor.status = ServiceStatus::Healthy;
            descriptor.last_seen = Some(Utc::now());
            self.persist_logged(&state.services);
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub async fn get(&self, name: &str) -> Option<ServiceDescriptor> {
        self.state.lock().await.services.get(name).cloned()
    }

    /// All descriptors, ordered by name.
    pub async fn list_all(&self) -> Vec<ServiceDescriptor> {
        self.state.lock().await.services.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.services.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cached tools for a service (possibly stale or empty).
    pub async fn cached_tools(&self, name: &str) -> Vec<Tool> {
        self.state.lock().await.cache.get(name)
    }

    pub async fn is_cache_fresh(&self, name: &str) -> bool {
        self.state.lock().await.cache.is_fresh(name)
    }

    pub async fn tool_count(&self, name: &str) -> usize {
        self.state.lock().await.cache.tool_count(name)
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    fn persist_logged(&self, services: &BTreeMap<String, ServiceDescriptor>) {
        if let Some(path) = self.path.as_deref() {
            log_persist_error(write_registry(path, services));
        }
    }
}

fn log_persist_error(result: Result<(), RegistryError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "registry write failed, in-memory state kept");
    }
}

/// Write the full registry (temp file + rename).
fn write_registry(
    path: &Path,
    services: &BTreeMap<String, ServiceDescriptor>,
) -> Result<(), RegistryError> {
    let fail = |reason: String| RegistryError::PersistFailed {
        path: path.display().to_string(),
        reason,
    };

    let persisted = PersistedRegistry {
        servers: services.clone(),
        updated_at: Some(Utc::now()),
    };
    let content = serde_json::to_string_pretty(&persisted).map_err(|e| fail(e.to_string()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content).map_err(|e| fail(e.to_string()))?;
    std::fs::rename(&tmp_path, path).map_err(|e| fail(e.to_string()))?;

    tracing::debug!(count = services.len(), path = %path.display(), "saved MCP registry");
    Ok(())
}

fn validate(descriptor: &ServiceDescriptor) -> Result<(), RegistryError> {
    descriptor
        .validate_endpoint()
        .map_err(|reason| RegistryError::InvalidEndpoint {
            name: descriptor.name.clone(),
            url: descriptor.endpoint.clone(),
            reason,
        })
}

fn load_from_disk(path: &Path) -> Result<BTreeMap<String, ServiceDescriptor>, RegistryError> {
    let fail = |reason: String| RegistryError::LoadFailed {
        path: path.display().to_string(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
    let persisted: PersistedRegistry =
        serde_json::from_str(&content).map_err(|e| fail(e.to_string()))?;

    // The map key is authoritative for the name.
    Ok(persisted
        .servers
        .into_iter()
        .map(|(name, mut descriptor)| {
            descriptor.name = name.clone();
            (name, descriptor)
        })
        .collect())
}

/// Insert defaults and catalog placeholders that are not already present.
fn apply_seeds(services: &mut BTreeMap<String, ServiceDescriptor>, seed: &SeedConfig) -> usize {
    let mut seeded = 0;
    for descriptor in &seed.defaults {
        if !services.contains_key(&descriptor.name) {
            services.insert(descriptor.name.clone(), descriptor.clone());
            seeded += 1;
        }
    }

    if let Some(catalog_path) = &seed.tool_catalog {
        match catalog::load_placeholders(catalog_path, &seed.catalog_base_url) {
            Ok(placeholders) => {
                for placeholder in placeholders {
                    if !services.contains_key(&placeholder.name) {
                        services.insert(placeholder.name.clone(), placeholder);
                        seeded += 1;
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "skipping tool catalog"),
        }
    }
    seeded
}

// ─── Tests ───────────────────────────────────────────────────────────────────
