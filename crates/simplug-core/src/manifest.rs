//! Plugin manifest schema and loading.
//!
//! A manifest is the self-describing capability declaration a plugin sends to
//! the registry and serves over `GetManifest`. Category-specific declarations
//! (component schemas, codec formats, transport configs) are kept as opaque
//! JSON and passed through untouched; full schema validation is done by the
//! registry.

use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Plugin category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginType {
    /// Simulates a real-world system and processes instance-scoped messages.
    Component,
    /// Encodes and decodes messages for a message format or library.
    MessageIcd,
    /// Implements a custom message transport.
    Transport,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Component => "component",
            PluginType::MessageIcd => "message-icd",
            PluginType::Transport => "transport",
        }
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability declaration for a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub plugin_type: PluginType,
    /// RPC endpoint the plugin is reachable on. Overwritten with the bound
    /// address right before registration.
    #[serde(default)]
    pub rpc_endpoint: String,
    /// Category-specific declarations, passed through as-is.
    #[serde(flatten)]
    pub declarations: serde_json::Map<String, serde_json::Value>,
}

impl PluginManifest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        plugin_type: PluginType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: None,
            plugin_type,
            rpc_endpoint: String::new(),
            declarations: serde_json::Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.rpc_endpoint = endpoint.into();
        self
    }

    /// Attach an opaque declaration (e.g. `componentSchemas`, `codecFormats`).
    pub fn with_declaration(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.declarations.insert(key.into(), value);
        self
    }

    /// Check the identity fields are present.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("id", &self.id), ("name", &self.name), ("version", &self.version)] {
            if value.trim().is_empty() {
                return Err(PluginError::InvalidManifest {
                    message: format!("{} must not be empty", field),
                });
            }
        }
        Ok(())
    }
}

/// Load and validate a manifest from a JSON file.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<PluginManifest> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).map_err(|e| PluginError::io_with_path(e, path))?;

    let manifest: PluginManifest =
        serde_json::from_str(&content).map_err(|e| PluginError::Json {
            message: format!("Failed to parse manifest from {}: {}", path.display(), e),
            source: Some(e),
        })?;

    manifest.validate()?;

    debug!(
        "Loaded manifest {} ({}) from {}",
        manifest.id,
        manifest.plugin_type,
        path.display()
    );
    Ok(manifest)
}
