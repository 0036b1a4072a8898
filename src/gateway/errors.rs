//! Gateway error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::probe::ProbeError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Server {name} not found")]
    ServerNotFound { name: String },

    #[error("Server {name} is disabled")]
    ServerDisabled { name: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
