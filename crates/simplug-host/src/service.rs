//! Plugin service served by the host process.
//!
//! Serves the loaded manifest. Message-ICD plugins additionally get a JSON
//! codec so the platform can round-trip payloads without a custom binary.

use simplug_core::rpc::{
    DecodeMessageRequest, DecodeMessageResponse, EncodeMessageRequest, EncodeMessageResponse,
    HealthCheckRequest, HealthCheckResponse, PluginService, ServingStatus,
};
use simplug_core::{
    from_wire_struct, to_wire_struct, PayloadMap, PayloadValue, PluginError, PluginManifest,
    PluginType, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub const JSON_FORMAT: &str = "json";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub struct HostService {
    manifest: PluginManifest,
    serving: AtomicBool,
}

impl HostService {
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            serving: AtomicBool::new(true),
        }
    }

    /// Report `NOT_SERVING` from now on. Used while draining on shutdown.
    pub fn stop_serving(&self) {
        self.serving.store(false, Ordering::SeqCst);
    }

    fn require_codec(&self, method: &str) -> Result<()> {
        if self.manifest.plugin_type != PluginType::MessageIcd {
            return Err(PluginError::Unimplemented {
                method: method.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PluginService for HostService {
    async fn health_check(&self, request: HealthCheckRequest) -> Result<HealthCheckResponse> {
        let status = if !request.service.is_empty() && request.service != self.manifest.id {
            ServingStatus::ServiceUnknown
        } else if self.serving.load(Ordering::SeqCst) {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        };
        Ok(HealthCheckResponse { status })
    }

    async fn get_manifest(&self) -> Result<PluginManifest> {
        Ok(self.manifest.clone())
    }

    async fn encode_message(&self, request: EncodeMessageRequest) -> Result<EncodeMessageResponse> {
        self.require_codec("EncodeMessage")?;
        if !request.format.eq_ignore_ascii_case(JSON_FORMAT) {
            return Err(PluginError::UnsupportedFormat {
                format: request.format,
            });
        }

        let payload = PayloadValue::Map(from_wire_struct(&request.payload));
        let encoded_payload = serde_json::to_vec(&payload.to_json())?;
        debug!(
            "Encoded {} as {} bytes of JSON",
            request.message_type,
            encoded_payload.len()
        );

        Ok(EncodeMessageResponse {
            encoded_payload,
            content_type: JSON_CONTENT_TYPE.to_string(),
        })
    }

    async fn decode_message(&self, request: DecodeMessageRequest) -> Result<DecodeMessageResponse> {
        self.require_codec("DecodeMessage")?;
        if !request.content_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
            return Err(PluginError::UnsupportedFormat {
                format: request.content_type,
            });
        }

        let value: serde_json::Value =
            serde_json::from_slice(&request.encoded_payload).map_err(|e| PluginError::Json {
                message: format!("{} payload is not valid JSON", request.message_type),
                source: Some(e),
            })?;

        let payload: PayloadMap = match PayloadValue::from_json(value) {
            PayloadValue::Map(fields) => fields,
            _ => {
                return Err(PluginError::InvalidPayload {
                    path: String::new(),
                    message: format!("{} payload must be a JSON object", request.message_type),
                })
            }
        };

        Ok(DecodeMessageResponse {
            payload: to_wire_struct(&payload)?,
        })
    }
}
