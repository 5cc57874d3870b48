//! Plugin RPC protocol types and framing.
//!
//! Wire format: 4-byte big-endian length prefix followed by a UTF-8 JSON-RPC
//! 2.0 payload.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Method names and request/response bodies form the plugin service
//! contract shared by `PluginServiceClient` and `PluginServer`.

use crate::config::RpcConfig;
use crate::error::{PluginError, Result};
use crate::manifest::PluginManifest;
use crate::payload::{from_wire_struct, PayloadMap, WireStruct};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// RPC method names.
pub mod methods {
    pub const HEALTH_CHECK: &str = "HealthCheck";
    pub const GET_MANIFEST: &str = "GetManifest";
    pub const PROCESS_MESSAGE: &str = "ProcessMessage";
    pub const ENCODE_MESSAGE: &str = "EncodeMessage";
    pub const DECODE_MESSAGE: &str = "DecodeMessage";
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(serde_json::Value::Number(id.into())),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    pub id: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: RpcConfig::JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Serving state reported by `HealthCheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
    ServiceUnknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    /// Sub-service to check; empty means the plugin as a whole.
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetManifestRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetManifestResponse {
    pub manifest: PluginManifest,
}

/// A simulation message exchanged between the platform and plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimMessage {
    pub id: String,
    pub message_type: String,
    #[serde(default)]
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: WireStruct,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SimMessage {
    /// New message with a random id, stamped now.
    pub fn new(message_type: impl Into<String>, source_id: impl Into<String>, payload: WireStruct) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type: message_type.into(),
            source_id: source_id.into(),
            timestamp: Utc::now(),
            payload,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMessageRequest {
    pub instance_id: String,
    pub message: SimMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMessageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_messages: Vec<SimMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeMessageRequest {
    pub message_type: String,
    pub format: String,
    #[serde(default)]
    pub payload: WireStruct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeMessageResponse {
    pub encoded_payload: Vec<u8>,
    #[serde(default)]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeMessageRequest {
    pub message_type: String,
    pub content_type: String,
    pub encoded_payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeMessageResponse {
    #[serde(default)]
    pub payload: WireStruct,
}

impl DecodeMessageResponse {
    /// Decoded payload as a caller-facing map.
    pub fn payload_map(&self) -> PayloadMap {
        from_wire_struct(&self.payload)
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > RpcConfig::MAX_MESSAGE_SIZE {
        return Err(PluginError::Other(format!(
            "RPC message size {} exceeds maximum {}",
            len,
            RpcConfig::MAX_MESSAGE_SIZE
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > RpcConfig::MAX_MESSAGE_SIZE {
        return Err(PluginError::Other(format!(
            "RPC message size {} exceeds maximum {}",
            payload.len(),
            RpcConfig::MAX_MESSAGE_SIZE
        )));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::WireValue;

    #[test]
    fn test_rpc_request_shape() {
        let req = RpcRequest::new(methods::GET_MANIFEST, serde_json::json!({}), 1);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "GetManifest");
        assert_eq!(json["id"], 1);
    }

    #[test]
    fn test_rpc_response_error_omits_result() {
        let resp = RpcResponse::error(
            Some(serde_json::Value::Number(1.into())),
            -32601,
            "Unimplemented: EncodeMessage".to_string(),
        );
        let json = serde_json::to_string(&resp).unwrap();

        assert!(!json.contains("\"result\""));
        assert!(json.contains("-32601"));
    }

    #[test]
    fn test_serving_status_wire_names() {
        let resp = HealthCheckResponse {
            status: ServingStatus::NotServing,
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            serde_json::json!({"status": "NOT_SERVING"})
        );
    }

    #[test]
    fn test_process_message_request_field_names() {
        let mut payload = WireStruct::default();
        payload
            .fields
            .insert("range".into(), WireValue::NumberValue(1500.0));
        let message = SimMessage::new("track.update", "radar-1", payload).with_metadata("seq", "4");

        let req = ProcessMessageRequest {
            instance_id: "fighter-7".into(),
            message,
        };
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["instanceId"], "fighter-7");
        assert_eq!(json["message"]["messageType"], "track.update");
        assert_eq!(json["message"]["sourceId"], "radar-1");
        assert_eq!(json["message"]["metadata"]["seq"], "4");
        assert_eq!(
            json["message"]["payload"]["fields"]["range"]["numberValue"],
            1500.0
        );
    }

    #[tokio::test]
    async fn test_frame_read_write() {
        let payload = b"{\"jsonrpc\":\"2.0\"}";
        let mut buf = Vec::new();

        write_frame(&mut buf, payload).await.unwrap();
        assert_eq!(&buf[..4], &(payload.len() as u32).to_be_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_frame(&mut cursor).await.unwrap();
        assert_eq!(read_back, Some(payload.to_vec()));
    }

    #[tokio::test]
    async fn test_frame_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_frame_read_oversized_returns_error() {
        let huge_len: u32 = (RpcConfig::MAX_MESSAGE_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_frame(&mut cursor).await;
        assert!(result.is_err());
    }
}
