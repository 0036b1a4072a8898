//! Registry: durable record of known tool services.
//!
//! - `types`: service descriptors, tools, auth and status enums
//! - `cache`: per-service tool catalog cache with a 5 minute TTL
//! - `store`: the shared, lock-guarded, JSON-persisted registry
//! - `catalog`: placeholders declared in a static tool catalog
//! - `errors`: registry error types

pub mod cache;
pub mod catalog;
pub mod errors;
pub mod store;
pub mod types;

pub use cache::{ToolCache, TOOL_CACHE_TTL};
pub use errors::RegistryError;
pub use store::{default_descriptors, RegistryStore, SeedConfig};
pub use types::{
    AuthConfig, DescriptorOrigin, ServiceDescriptor, ServiceStatus, Tool, ToolParameter,
};
