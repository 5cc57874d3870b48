//! Simplug Core - registration and RPC plumbing for NeuroSim simulation plugins.
//!
//! A plugin process starts its RPC server, then announces itself to the
//! simulation API with a [`RegistrationClient`]. The API and peer plugins
//! reach the plugin back through a [`PluginServiceClient`].
//!
//! # Example
//!
//! ```rust,ignore
//! use simplug_core::{PluginManifest, PluginType, RegistrationClient, RegistrationConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> simplug_core::Result<()> {
//!     let manifest = PluginManifest::new("radar", "Radar Model", "0.1.0", PluginType::Component);
//!     let config = RegistrationConfig::new()
//!         .with_manifest(manifest)
//!         .with_rpc_address("10.0.0.4:50051");
//!
//!     let mut client = RegistrationClient::new(config)?;
//!     client.register_with_retries(5, Duration::from_secs(1)).await?;
//!
//!     // ... serve until shutdown ...
//!
//!     client.unregister_plugin().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod manifest;
pub mod payload;
pub mod registration;
pub mod retry;
pub mod rpc;

pub use config::{RegistrationConfig, RegistryConfig, RpcConfig};
pub use error::{AttemptStage, PluginError, Result};
pub use manifest::{load_manifest, PluginManifest, PluginType};
pub use payload::{from_wire_struct, to_wire_struct, PayloadMap, PayloadValue, WireStruct, WireValue};
pub use registration::{RegistrationClient, RegistrationResponse};
pub use retry::RetryConfig;
pub use rpc::{CallContext, CancellationToken, PluginServer, PluginService, PluginServiceClient};
