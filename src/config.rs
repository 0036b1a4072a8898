//! Gateway configuration.
//!
//! Built from defaults, then an optional YAML file named by
//! `MCP_GATEWAY_CONFIG` (with `${VAR}` / `${VAR:-default}` interpolation),
//! then individual environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::discovery::scanner::DEFAULT_SCAN_HOST;
use crate::discovery::types::DEFAULT_SCAN_PORTS;
use crate::discovery::{DiscoverRequest, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_DISCOVERY_URL};
use crate::probe::ProbeTimeouts;
use crate::registry::{default_descriptors, SeedConfig, TOOL_CACHE_TTL};

pub const ENV_CONFIG_FILE: &str = "MCP_GATEWAY_CONFIG";
pub const ENV_DISCOVERY_URL: &str = "MCP_DISCOVERY_URL";
pub const ENV_DISCOVERY_TIMEOUT: &str = "MCP_DISCOVERY_TIMEOUT";
pub const ENV_REGISTRY_FILE: &str = "MCP_REGISTRY_FILE";
pub const ENV_TOOL_CATALOG: &str = "MCP_TOOL_CATALOG";
pub const ENV_BIND: &str = "MCP_GATEWAY_BIND";

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

const REGISTRY_FILE_NAME: &str = "mcp-registry.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse config {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP surface listens on.
    pub bind: String,
    pub discovery: DiscoverySettings,
    pub registry: RegistrySettings,
    pub scan: ScanSettings,
    pub timeouts: TimeoutSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub url: String,
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Registry file; defaults to `<data_dir>/mcp-registry.json`.
    pub file: Option<PathBuf>,
    /// Optional tool-catalog YAML whose MCP toolsets become placeholders.
    pub tool_catalog: Option<PathBuf>,
    pub catalog_base_url: String,
    /// Seed the built-in default services.
    pub seed_defaults: bool,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub host: String,
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub liveness_secs: f64,
    pub port_scan_secs: f64,
    pub health_secs: f64,
    pub catalog_secs: f64,
    pub invocation_secs: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            discovery: DiscoverySettings::default(),
            registry: RegistrySettings::default(),
            scan: ScanSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DISCOVERY_URL.to_string(),
            timeout_secs: DEFAULT_DISCOVERY_TIMEOUT.as_secs_f64(),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            file: None,
            tool_catalog: None,
            catalog_base_url: crate::registry::store::DEFAULT_CATALOG_BASE_URL.to_string(),
            seed_defaults: true,
            cache_ttl_secs: TOOL_CACHE_TTL.as_secs(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_SCAN_HOST.to_string(),
            ports: DEFAULT_SCAN_PORTS.to_vec(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let t = ProbeTimeouts::default();
        Self {
            liveness_secs: t.liveness.as_secs_f64(),
            port_scan_secs: t.port_scan.as_secs_f64(),
            health_secs: t.health.as_secs_f64(),
            catalog_secs: t.catalog.as_secs_f64(),
            invocation_secs: t.invocation.as_secs_f64(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl GatewayConfig {
    /// Defaults, then the `MCP_GATEWAY_CONFIG` file if set, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(ENV_CONFIG_FILE) {
            Ok(path) if !path.is_empty() => Self::load_file(&expand_home(&path))?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file after env-var interpolation.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&raw).map_err(|reason| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, String> {
        Self::from_yaml_with(raw, |key| std::env::var(key).ok())
    }

    /// [`Self::from_yaml`] with variables resolved through `lookup`.
    pub fn from_yaml_with<F>(raw: &str, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interpolated = interpolate(raw, &lookup);
        if interpolated.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(&interpolated).map_err(|e| e.to_string())?;
        expand_home_path(&mut config.registry.file);
        expand_home_path(&mut config.registry.tool_catalog);
        Ok(config)
    }

    /// Apply `MCP_*` overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_DISCOVERY_URL) {
            self.discovery.url = url;
        }
        if let Some(raw) = get(ENV_DISCOVERY_TIMEOUT) {
            self.discovery.timeout_secs =
                raw.trim()
                    .parse::<f64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: ENV_DISCOVERY_TIMEOUT.to_string(),
                        reason: e.to_string(),
                    })?;
        }
        if let Some(file) = get(ENV_REGISTRY_FILE) {
            self.registry.file = Some(expand_home(&file));
        }
        if let Some(catalog) = get(ENV_TOOL_CATALOG) {
            self.registry.tool_catalog = Some(expand_home(&catalog));
        }
        if let Some(bind) = get(ENV_BIND) {
            self.bind = bind;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discovery_timeout()?;
        self.probe_timeouts()?;
        if self.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                key: "bind".to_string(),
                reason: format!("'{}' is not a socket address", self.bind),
            });
        }
        Ok(())
    }

    // ─── Derived values ──────────────────────────────────────────────────────

    pub fn registry_file(&self) -> PathBuf {
        self.registry
            .file
            .clone()
            .unwrap_or_else(|| crate::data_dir().join(REGISTRY_FILE_NAME))
    }

    pub fn discovery_timeout(&self) -> Result<Duration, ConfigError> {
        secs("discovery.timeout_secs", self.discovery.timeout_secs)
    }

    pub fn probe_timeouts(&self) -> Result<ProbeTimeouts, ConfigError> {
        let t = &self.timeouts;
        Ok(ProbeTimeouts {
            liveness: secs("timeouts.liveness_secs", t.liveness_secs)?,
            port_scan: secs("timeouts.port_scan_secs", t.port_scan_secs)?,
            health: secs("timeouts.health_secs", t.health_secs)?,
            catalog: secs("timeouts.catalog_secs", t.catalog_secs)?,
            invocation: secs("timeouts.invocation_secs", t.invocation_secs)?,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.registry.cache_ttl_secs)
    }

    pub fn seed_config(&self) -> SeedConfig {
        SeedConfig {
            defaults: if self.registry.seed_defaults {
                default_descriptors()
            } else {
                Vec::new()
            },
            tool_catalog: self.registry.tool_catalog.clone(),
            catalog_base_url: self.registry.catalog_base_url.clone(),
        }
    }

    /// Discovery parameters used when a caller supplies none.
    pub fn default_discover_request(&self) -> DiscoverRequest {
        DiscoverRequest {
            scan_ports: self.scan.ports.clone(),
            ..DiscoverRequest::default()
        }
    }
}

fn secs(key: &str, value: f64) -> Result<Duration, ConfigError> {
    if value <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("must be positive, got {value}"),
        });
    }
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` and `${VAR:-fallback}`. An unset or empty variable
/// takes the fallback (or nothing); an unterminated `${` is kept verbatim.
fn interpolate<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, fallback),
            None => (expr, ""),
        };
        match lookup(name.trim()).filter(|v| !v.is_empty()) {
            Some(value) => out.push_str(&value),
            None => out.push_str(fallback),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Resolve `~` and `~/...` against the home directory. `~user` is left alone.
fn expand_home(path: &str) -> PathBuf {
    let home_relative = match path.strip_prefix('~') {
        Some("") => Some(""),
        Some(rest) => rest.strip_prefix('/'),
        None => None,
    };
    match (home_relative, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// [`expand_home`] for an already-parsed path field.
fn expand_home_path(path: &mut Option<PathBuf>) {
    if let Some(text) = path.as_ref().and_then(|p| p.to_str()).map(str::to_string) {
        *path = Some(expand_home(&text));
    }
}
