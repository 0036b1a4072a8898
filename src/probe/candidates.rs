//! Candidate endpoint lists and per-use-case timeouts.
//!
//! Target servers do not agree on a URL layout, so each use case carries an
//! ordered list of paths. Order matters: the first path that succeeds wins.

use std::time::Duration;

/// Paths tried, in order, to decide whether a server is alive.
pub const LIVENESS_PATHS: &[&str] = &[
    "/health",
    "/api/health",
    "/healthz",
    "/",
    "/api/tools",
    "/tools",
];

/// Paths tried, in order, to fetch a server's tool catalog.
pub const CATALOG_PATHS: &[&str] = &[
    "/api/tools",
    "/tools",
    "/api/v1/tools",
    "/mcp/tools",
    "/.well-known/mcp.json",
];

/// Paths tried, in order, to invoke `tool`.
///
/// The tool name is percent-encoded as a single path segment.
pub fn invocation_paths(tool: &str) -> Vec<String> {
    let tool = encode_path_segment(tool);
    vec![
        format!("/api/tools/{tool}/invoke"),
        format!("/tools/{tool}/invoke"),
        format!("/api/tools/{tool}"),
        "/api/invoke".to_string(),
        "/invoke".to_string(),
    ]
}

pub fn liveness_paths() -> Vec<String> {
    LIVENESS_PATHS.iter().map(|p| p.to_string()).collect()
}

pub fn catalog_paths() -> Vec<String> {
    CATALOG_PATHS.iter().map(|p| p.to_string()).collect()
}

/// Percent-encode `segment` so `/`, `?`, `#` and `%` cannot leave it.
///
/// `.` and `..` cannot be made safe this way; callers reject them.
fn encode_path_segment(segment: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse("http://localhost/") else {
        return segment.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}

/// Whether `name` is a dot segment that URL normalization would collapse.
pub fn is_dot_segment(name: &str) -> bool {
    matches!(name, "." | "..")
}

/// Join a base URL and a candidate path without doubling slashes.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

/// Per-attempt timeouts for each probe use case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    /// Liveness check before registration and for container ports.
    pub liveness: Duration,
    /// Liveness check for a bare local port scan.
    pub port_scan: Duration,
    /// Liveness check during the aggregate health report.
    pub health: Duration,
    /// Tool catalog fetch.
    pub catalog: Duration,
    /// Tool invocation.
    pub invocation: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            liveness: Duration::from_secs(5),
            port_scan: Duration::from_secs(2),
            health: Duration::from_secs(3),
            catalog: Duration::from_secs(10),
            invocation: Duration::from_secs(60),
        }
    }
}
