//! Service manifests.
//!
//! Every service directory holds a `shipyard.json` manifest. Unknown fields are
//! preserved when a manifest is rewritten for the deployment package.

use crate::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::Path;

/// Name of the manifest file marking a service directory.
pub const MANIFEST_FILE: &str = "shipyard.json";

/// Field changes applied to a staged manifest.
#[derive(Debug, Clone, Copy)]
pub struct ManifestRewrite<'a> {
    pub service_id: &'a str,
    pub image: Option<&'a str>,
    pub region: Option<&'a str>,
}

/// Parse manifest JSON into an object. An empty file is an empty manifest.
pub fn parse_manifest(content: &str) -> Result<Map<String, Value>, serde_json::Error> {
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(content)
}

/// Read the manifest in a service directory.
pub async fn read_manifest(service_dir: &Path) -> ConfigResult<Map<String, Value>> {
    let path = service_dir.join(MANIFEST_FILE);
    let content = tokio::fs::read_to_string(&path).await?;
    parse_manifest(&content).map_err(|source| ConfigError::Manifest {
        path: path.display().to_string(),
        source,
    })
}

/// The service ID declared by a manifest, if any.
pub fn manifest_service_id(manifest: &Map<String, Value>) -> Option<String> {
    manifest
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}

/// Apply a rewrite to manifest text, returning the new text.
pub fn rewrite_manifest(content: &str, rewrite: ManifestRewrite<'_>) -> ConfigResult<String> {
    let mut manifest = parse_manifest(content)?;

    manifest.insert(
        "id".to_string(),
        Value::String(rewrite.service_id.to_string()),
    );
    if let Some(image) = rewrite.image {
        manifest.insert("image".to_string(), Value::String(image.to_string()));
    }
    if let Some(region) = rewrite.region {
        manifest.insert("region".to_string(), Value::String(region.to_string()));
    }
    manifest.shift_remove("projectId");

    let mut out = serde_json::to_string_pretty(&Value::Object(manifest))?;
    out.push('\n');
    Ok(out)
}

/// Rewrite the manifest inside a staged service directory, if it has one.
pub async fn rewrite_manifest_file(
    service_dir: &Path,
    rewrite: ManifestRewrite<'_>,
) -> ConfigResult<()> {
    let path = service_dir.join(MANIFEST_FILE);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let rewritten = rewrite_manifest(&content, rewrite).map_err(|e| match e {
        ConfigError::Json(source) => ConfigError::Manifest {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;
    tokio::fs::write(&path, rewritten).await?;
    Ok(())
}
