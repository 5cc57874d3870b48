//! Centralized configuration for plugin registration and RPC.
//!
//! Constant holders for the registry HTTP API and the plugin RPC transport,
//! plus the per-process `RegistrationConfig`.

use crate::manifest::PluginManifest;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simulation API (registry) endpoints and defaults.
pub struct RegistryConfig;

impl RegistryConfig {
    pub const DEFAULT_API_HOST: &'static str = "localhost";
    pub const DEFAULT_API_PORT: u16 = 8080;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const SCHEME: &'static str = "http";
    pub const REGISTER_PATH: &'static str = "/api/v1/plugins/register";
    pub const UNREGISTER_PATH_PREFIX: &'static str = "/api/v1/plugins/";
    pub const HEALTH_PATH: &'static str = "/health";
    pub const USER_AGENT: &'static str = "simplug/0.3";
}

/// Plugin RPC transport limits.
pub struct RpcConfig;

impl RpcConfig {
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const MAX_CONNECTIONS: usize = 64;
    pub const JSONRPC_VERSION: &'static str = "2.0";
}

/// Configuration for registering one plugin process with the simulation API.
///
/// Unset connection fields are filled with [`RegistryConfig`] defaults when the
/// config is handed to a `RegistrationClient`. `plugin_id` starts empty and is
/// populated by a successful registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationConfig {
    #[serde(default)]
    pub api_host: Option<String>,
    #[serde(default)]
    pub api_port: Option<u16>,
    /// Client-wide HTTP timeout.
    #[serde(default, with = "duration_millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub plugin_id: Option<String>,
    #[serde(default)]
    pub manifest: Option<PluginManifest>,
    /// Address the plugin's RPC server is actually bound to.
    #[serde(default)]
    pub rpc_address: Option<String>,
}

impl RegistrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = Some(port);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_manifest(mut self, manifest: PluginManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn with_rpc_address(mut self, address: impl Into<String>) -> Self {
        self.rpc_address = Some(address.into());
        self
    }

    /// Fill unset or empty connection fields with defaults.
    pub(crate) fn apply_defaults(&mut self) {
        if self.api_host.as_deref().map_or(true, str::is_empty) {
            self.api_host = Some(RegistryConfig::DEFAULT_API_HOST.to_string());
        }
        if self.api_port.map_or(true, |port| port == 0) {
            self.api_port = Some(RegistryConfig::DEFAULT_API_PORT);
        }
        if self.timeout.map_or(true, |t| t.is_zero()) {
            self.timeout = Some(RegistryConfig::DEFAULT_TIMEOUT);
        }
    }
}

/// Serialize `Option<Duration>` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_defaults_fills_unset_fields() {
        let mut config = RegistrationConfig::new();
        config.apply_defaults();

        assert_eq!(config.api_host.as_deref(), Some("localhost"));
        assert_eq!(config.api_port, Some(8080));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.plugin_id.is_none());
    }

    #[test]
    fn test_apply_defaults_keeps_explicit_values() {
        let mut config = RegistrationConfig::new()
            .with_api_host("sim-api")
            .with_api_port(9000)
            .with_timeout(Duration::from_secs(2));
        config.apply_defaults();

        assert_eq!(config.api_host.as_deref(), Some("sim-api"));
        assert_eq!(config.api_port, Some(9000));
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_config_from_json() {
        let config: RegistrationConfig = serde_json::from_str(
            r#"{"apiHost": "registry.local", "apiPort": 8181, "timeout": 1500, "rpcAddress": "10.0.0.4:50051"}"#,
        )
        .unwrap();

        assert_eq!(config.api_host.as_deref(), Some("registry.local"));
        assert_eq!(config.api_port, Some(8181));
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.rpc_address.as_deref(), Some("10.0.0.4:50051"));
        assert!(config.manifest.is_none());
    }
}
