//! Service discovery: the external discovery service and the local fallback
//! scanner.

pub mod client;
pub mod scanner;
pub mod types;

pub use client::{DiscoveryClient, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_DISCOVERY_URL};
pub use scanner::{ContainerInfo, ContainerRuntime, DockerRuntime, LocalScanner, ScanError, ScanOptions};
pub use types::{
    DiscoverRequest, DiscoveredService, DiscoveryHealth, DiscoveryResult, DiscoverySource,
    RemoteService, ServiceFilter,
};
