//! Registration of a plugin process with the simulation API.
//!
//! The handshake is: probe `/health`, then POST the manifest to the register
//! endpoint. `register_with_retries` repeats that pair with a linear backoff
//! until the registry accepts the plugin or the attempts run out. The
//! registry-assigned plugin id is kept so the plugin can unregister at
//! shutdown.

use crate::config::{RegistrationConfig, RegistryConfig};
use crate::error::{AttemptStage, PluginError, Result};
use crate::manifest::PluginManifest;
use crate::retry::RetryConfig;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body of a registration request.
#[derive(Debug, Serialize)]
pub struct RegistrationRequest<'a> {
    pub manifest: &'a PluginManifest,
}

/// Registry answer to a registration request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub plugin_id: String,
    #[serde(default)]
    pub timestamp: String,
}

/// HTTP client for the registry side of the plugin lifecycle.
///
/// Owns its [`RegistrationConfig`]; the manifest endpoint and the assigned
/// plugin id are only mutated through `&mut self`.
#[derive(Debug)]
pub struct RegistrationClient {
    config: RegistrationConfig,
    http: Client,
    base_url: String,
}

impl RegistrationClient {
    /// Create a client, filling unset host, port and timeout with defaults.
    pub fn new(mut config: RegistrationConfig) -> Result<Self> {
        config.apply_defaults();

        let host = config
            .api_host
            .as_deref()
            .unwrap_or(RegistryConfig::DEFAULT_API_HOST);
        let port = config.api_port.unwrap_or(RegistryConfig::DEFAULT_API_PORT);
        let timeout = config.timeout.unwrap_or(RegistryConfig::DEFAULT_TIMEOUT);

        let base_url = format!("{}://{}:{}", RegistryConfig::SCHEME, host, port);
        url::Url::parse(&base_url).map_err(|e| PluginError::Config {
            message: format!("Invalid registry address {}: {}", base_url, e),
        })?;

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(RegistryConfig::USER_AGENT)
            .build()
            .map_err(|e| PluginError::Http {
                operation: "client setup",
                source: e,
            })?;

        debug!("Registration client targeting {} (timeout {:?})", base_url, timeout);

        Ok(Self {
            config,
            http,
            base_url,
        })
    }

    /// Base URL of the registry, `scheme://host:port`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Plugin id assigned by the last successful registration.
    pub fn plugin_id(&self) -> Option<&str> {
        self.config.plugin_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn manifest(&self) -> Option<&PluginManifest> {
        self.config.manifest.as_ref()
    }

    /// Register the plugin once.
    ///
    /// Succeeds only when the registry answers 200/201 and the body reports
    /// `success: true`. The returned plugin id is stored for unregistration.
    pub async fn register_plugin(&mut self) -> Result<RegistrationResponse> {
        let rpc_address = self
            .config
            .rpc_address
            .clone()
            .filter(|addr| !addr.is_empty());

        let manifest = self
            .config
            .manifest
            .as_mut()
            .ok_or(PluginError::MissingManifest)?;

        if let Some(addr) = rpc_address {
            manifest.rpc_endpoint = addr;
        }

        let url = format!("{}{}", self.base_url, RegistryConfig::REGISTER_PATH);
        debug!("Registering plugin {} at {}", manifest.id, url);

        let response = self
            .http
            .post(&url)
            .json(&RegistrationRequest { manifest })
            .send()
            .await
            .map_err(|e| PluginError::Http {
                operation: "registration",
                source: e,
            })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(PluginError::Status {
                operation: "registration",
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| PluginError::Http {
            operation: "registration",
            source: e,
        })?;
        let reg: RegistrationResponse =
            serde_json::from_slice(&body).map_err(|e| PluginError::Decode {
                context: "registration response",
                source: e,
            })?;

        if !reg.success {
            return Err(PluginError::Rejected {
                message: reg.message,
            });
        }

        info!("Plugin registered with id {}", reg.plugin_id);
        self.config.plugin_id = Some(reg.plugin_id.clone());
        Ok(reg)
    }

    /// Remove the plugin from the registry.
    ///
    /// Requires the id from a prior successful registration.
    pub async fn unregister_plugin(&mut self) -> Result<()> {
        let plugin_id = self
            .plugin_id()
            .ok_or(PluginError::MissingPluginId)?
            .to_string();

        let url = format!(
            "{}{}{}",
            self.base_url,
            RegistryConfig::UNREGISTER_PATH_PREFIX,
            plugin_id
        );

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| PluginError::Http {
                operation: "unregistration",
                source: e,
            })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(PluginError::Status {
                operation: "unregistration",
                status: status.as_u16(),
            });
        }

        info!("Plugin {} unregistered", plugin_id);
        self.config.plugin_id = None;
        Ok(())
    }

    /// Probe the registry's health endpoint. Only 200 counts as healthy.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, RegistryConfig::HEALTH_PATH);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PluginError::Http {
                operation: "health check",
                source: e,
            })?;

        if response.status() != StatusCode::OK {
            return Err(PluginError::Status {
                operation: "API health check",
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }

    /// Register with up to `max_retries` attempts.
    ///
    /// Each attempt probes health first and skips registration when the
    /// registry is unhealthy. Attempt `n` is followed by a sleep of
    /// `n * base_delay`; there is no sleep after the final attempt.
    pub async fn register_with_retries(
        &mut self,
        max_retries: u32,
        base_delay: Duration,
    ) -> Result<RegistrationResponse> {
        self.register_with_policy(&RetryConfig::new(max_retries, base_delay))
            .await
    }

    /// Same as [`register_with_retries`](Self::register_with_retries), driven
    /// by a [`RetryConfig`].
    pub async fn register_with_policy(
        &mut self,
        policy: &RetryConfig,
    ) -> Result<RegistrationResponse> {
        if policy.max_attempts == 0 {
            return Err(PluginError::Config {
                message: "max_retries must be at least 1".to_string(),
            });
        }

        for attempt in 1..=policy.max_attempts {
            let err = match self.health_check().await {
                Err(e) => PluginError::Attempt {
                    stage: AttemptStage::HealthCheck,
                    source: Box::new(e),
                },
                Ok(()) => match self.register_plugin().await {
                    Ok(response) => {
                        if attempt > 1 {
                            debug!("Registration succeeded after {} attempts", attempt);
                        }
                        return Ok(response);
                    }
                    Err(e) => PluginError::Attempt {
                        stage: AttemptStage::Register,
                        source: Box::new(e),
                    },
                },
            };

            if policy.has_next(attempt) {
                let delay = policy.calculate_delay(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, policy.max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
            } else {
                warn!(
                    "All {} registration attempts exhausted. Last error: {}",
                    policy.max_attempts, err
                );
                return Err(PluginError::RetriesExhausted {
                    attempts: policy.max_attempts,
                    source: Box::new(err),
                });
            }
        }

        unreachable!("Retry loop should have returned")
    }
}
