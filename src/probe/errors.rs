//! Probe error types.

use thiserror::Error;

/// Errors surfaced by probe-backed operations (catalog fetch, invocation).
///
/// Liveness checks never error; a dead target is a normal negative result.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The shared HTTP client could not be constructed.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },

    /// A candidate answered with a non-404 failure status; no further
    /// candidates were tried.
    #[error("HTTP {status}: {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },

    /// Every candidate was tried without success.
    #[error("no candidate endpoint on {base_url} succeeded after {attempts} attempts{}",
        last_error.as_deref().map(|e| format!(" (last error: {e})")).unwrap_or_default())]
    Unreachable {
        base_url: String,
        attempts: usize,
        last_error: Option<String>,
    },
}

impl ProbeError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProbeError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
