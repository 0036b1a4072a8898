//! HTTP probing of tool services.
//!
//! Tool services do not share a URL layout, so every interaction (liveness,
//! catalog, invocation) tries an ordered list of candidate paths.

pub mod candidates;
pub mod engine;
pub mod errors;
pub mod parse;

pub use candidates::ProbeTimeouts;
pub use engine::{Acceptance, LivenessReport, ProbeBody, ProbeEngine, ProbeHit, ProbeOutcome, ProbeRequest};
pub use errors::ProbeError;
pub use parse::normalize_catalog;
