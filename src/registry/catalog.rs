//! Static tool catalog: declared tool servers that may not be running yet.
//!
//! The catalog is a YAML file with a `toolsets` list. Entries of
//! `type: mcp` with a `ref` become disabled placeholder descriptors that a
//! later discovery pass can bring to life.

use std::path::Path;

use serde::Deserialize;

use super::errors::RegistryError;
use super::types::{DescriptorOrigin, ServiceDescriptor};

#[derive(Debug, Deserialize)]
struct ToolCatalog {
    #[serde(default)]
    toolsets: Vec<ToolsetEntry>,
}

#[derive(Debug, Deserialize)]
struct ToolsetEntry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default)]
    description: String,
}

/// Read the catalog at `path` and build disabled placeholders.
///
/// A missing file is not an error and yields no placeholders.
pub fn load_placeholders(
    path: &Path,
    base_url: &str,
) -> Result<Vec<ServiceDescriptor>, RegistryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no tool catalog, skipping");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(RegistryError::CatalogFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    parse_placeholders(&content, base_url).map_err(|reason| RegistryError::CatalogFailed {
        path: path.display().to_string(),
        reason,
    })
}

fn parse_placeholders(content: &str, base_url: &str) -> Result<Vec<ServiceDescriptor>, String> {
    let catalog: ToolCatalog = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let base = base_url.trim_end_matches('/');

    Ok(catalog
        .toolsets
        .into_iter()
        .filter(|t| t.kind == "mcp")
        .filter_map(|t| {
            let reference = t.reference.filter(|r| !r.is_empty())?;
            Some(
                ServiceDescriptor::new(reference.clone(), format!("{base}/tools/{reference}"))
                    .with_description(t.description)
                    .with_origin(DescriptorOrigin::Catalog)
                    .disabled(),
            )
        })
        .collect())
}
