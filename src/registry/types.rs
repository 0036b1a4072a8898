//! Registry data model.
//!
//! Service descriptors, tool definitions, and the auth/status enums that are
//! persisted to `mcp-registry.json`. Descriptors only ever hold the *name* of
//! an environment variable for auth, never the secret itself.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Health status of a tool service, as last observed by a probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Starting,
    Healthy,
    Unhealthy,
    Stopped,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopped => "stopped",
        }
    }

    /// Status implied by a liveness probe.
    pub fn from_alive(alive: bool) -> Self {
        if alive {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// How to authenticate against a tool service.
///
/// Secrets are read from the named environment variable at call time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        #[serde(rename = "tokenEnv", alias = "token_env")]
        token_env: String,
    },
    ApiKey {
        #[serde(rename = "tokenEnv", alias = "token_env")]
        token_env: String,
    },
}

impl AuthConfig {
    /// Build from the loose `(authType, authTokenEnv)` pair used by the HTTP API.
    ///
    /// Unknown types, or a type without an env var name, fall back to `None`.
    pub fn from_parts(auth_type: Option<&str>, token_env: Option<&str>) -> Self {
        let Some(env) = token_env.filter(|e| !e.is_empty()) else {
            return Self::None;
        };
        match auth_type.map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("bearer") => Self::Bearer {
                token_env: env.to_string(),
            },
            Some("api_key") | Some("apikey") | Some("api-key") => Self::ApiKey {
                token_env: env.to_string(),
            },
            _ => Self::None,
        }
    }

    /// Resolve request headers from the environment.
    ///
    /// A missing or empty variable yields no header rather than an error.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::None => Vec::new(),
            Self::Bearer { token_env } => match read_secret(token_env) {
                Some(token) => vec![("Authorization", format!("Bearer {token}"))],
                None => Vec::new(),
            },
            Self::ApiKey { token_env } => match read_secret(token_env) {
                Some(token) => vec![("X-API-Key", token)],
                None => Vec::new(),
            },
        }
    }
}

fn read_secret(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

// ─── Tools ───────────────────────────────────────────────────────────────────

/// A single parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn default_param_type() -> String {
    "any".to_string()
}

/// A tool exposed by a tool service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(alias = "ref")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(
        default,
        alias = "inputSchema",
        alias = "input_schema",
        deserialize_with = "deserialize_parameters"
    )]
    pub parameters: Vec<ToolParameter>,
}

fn default_category() -> String {
    "general".to_string()
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: default_category(),
            parameters: Vec::new(),
        }
    }
}

/// Accepted shapes for a tool's parameter block.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterShape {
    List(Vec<ToolParameter>),
    Schema(ParameterSchema),
}

#[derive(Deserialize)]
struct ParameterSchema {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    required: Vec<String>,
}

impl ParameterSchema {
    fn into_parameters(self) -> Vec<ToolParameter> {
        let required = self.required;
        self.properties
            .into_iter()
            .map(|(name, prop)| ToolParameter {
                param_type: prop
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(String::from)
                    .unwrap_or_else(default_param_type),
                description: prop
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
                required: required.contains(&name),
                name,
            })
            .collect()
    }
}

fn deserialize_parameters<'de, D>(deserializer: D) -> Result<Vec<ToolParameter>, D::Error>
where
    D: Deserializer<'de>,
{
    let shape = Option::<ParameterShape>::deserialize(deserializer)?;
    Ok(match shape {
        Some(ParameterShape::List(params)) => params,
        Some(ParameterShape::Schema(schema)) => schema.into_parameters(),
        None => Vec::new(),
    })
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// Where a descriptor came from. Governs what discovery may overwrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorOrigin {
    #[default]
    Manual,
    Default,
    Catalog,
    Discovered,
}

/// The registry's record of one tool service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(alias = "url")]
    pub endpoint: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_service_type")]
    pub service_type: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub origin: DescriptorOrigin,
    #[serde(default)]
    pub(crate) status: ServiceStatus,
    #[serde(default)]
    pub(crate) last_seen: Option<DateTime<Utc>>,
    #[serde(default, alias = "tools")]
    pub tool_catalog: Vec<Tool>,
}

fn default_service_type() -> String {
    "unknown".to_string()
}

fn default_enabled() -> bool {
    true
}

impl ServiceDescriptor {
    /// A manually curated, enabled descriptor with unknown status.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            description: String::new(),
            service_type: default_service_type(),
            capabilities: BTreeSet::new(),
            auth: AuthConfig::None,
            enabled: true,
            origin: DescriptorOrigin::Manual,
            status: ServiceStatus::Unknown,
            last_seen: None,
            tool_catalog: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| !c.is_empty())
            .collect();
        self
    }

    pub fn with_origin(mut self, origin: DescriptorOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Check that `endpoint` is an absolute http(s) URL with a host.
    pub fn validate_endpoint(&self) -> Result<(), String> {
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| e.to_string())?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(format!("unsupported scheme '{other}'")),
        }
        if url.host_str().is_none() {
            return Err("missing host".to_string());
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
