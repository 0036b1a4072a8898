//! Gateway: the public operation set over discovery, registry and probing.
//!
//! - `service`: the [`Gateway`] itself
//! - `types`: request/response values
//! - `prompt`: tool summaries for LLM prompts and function calling
//! - `errors`: gateway error types

pub mod errors;
pub mod prompt;
pub mod service;
pub mod types;

pub use errors::GatewayError;
pub use service::Gateway;
pub use types::{
    DiscoveryOutcome, HealthReport, InvocationResult, InvokeRequest, OperationOutcome,
    RegisterServerRequest, ServerListing, ServerSelection, ServerTools, ServiceListing,
    ToolListing,
};
