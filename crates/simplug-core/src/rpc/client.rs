//! Typed RPC client for one remote plugin.
//!
//! `PluginServiceClient` owns at most one TCP connection to one plugin
//! endpoint. The connection is dialed lazily on the first call, so
//! constructing a client never touches the network. Every call takes a
//! [`CallContext`] and honors its cancellation and deadline; no other
//! timeout is applied and nothing is retried.
//!
//! Methods take `&mut self`: a client serves one caller at a time. Use one
//! client per concurrent caller.

use super::context::CallContext;
use super::protocol::{
    methods, read_frame, write_frame, DecodeMessageRequest, DecodeMessageResponse,
    EncodeMessageRequest, EncodeMessageResponse, GetManifestRequest, GetManifestResponse,
    HealthCheckRequest, HealthCheckResponse, ProcessMessageRequest, ProcessMessageResponse,
    RpcRequest, RpcResponse, SimMessage,
};
use crate::error::{PluginError, Result};
use crate::manifest::PluginManifest;
use crate::payload::{to_wire_struct, PayloadMap};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug)]
enum Connection {
    Idle,
    Connected(TcpStream),
    Closed,
}

/// RPC client for a single remote plugin endpoint.
#[derive(Debug)]
pub struct PluginServiceClient {
    endpoint: String,
    /// `host:port` passed to the dialer.
    target: String,
    conn: Connection,
    next_id: u64,
}

impl PluginServiceClient {
    /// Create a client for `endpoint` (`host:port` or `tcp://host:port`).
    ///
    /// Fails only if the endpoint cannot be parsed into a dialable target.
    pub fn new(endpoint: &str) -> Result<Self> {
        let target = parse_endpoint(endpoint)?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            target,
            conn: Connection::Idle,
            next_id: 1,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.conn, Connection::Connected(_))
    }

    /// Release the connection. Safe to call repeatedly or before any call.
    pub fn close(&mut self) {
        if let Connection::Connected(_) = std::mem::replace(&mut self.conn, Connection::Closed) {
            debug!("Closed plugin connection to {}", self.endpoint);
        }
    }

    /// Health of the remote plugin, or of one of its named sub-services.
    pub async fn health_check(
        &mut self,
        ctx: &CallContext,
        service: &str,
    ) -> Result<HealthCheckResponse> {
        let req = HealthCheckRequest {
            service: service.to_string(),
        };
        self.call(ctx, methods::HEALTH_CHECK, &req).await
    }

    /// The remote plugin's current manifest.
    pub async fn get_manifest(&mut self, ctx: &CallContext) -> Result<PluginManifest> {
        let resp: GetManifestResponse = self
            .call(ctx, methods::GET_MANIFEST, &GetManifestRequest {})
            .await?;
        Ok(resp.manifest)
    }

    /// Deliver a message to one instance of a component plugin.
    pub async fn process_message(
        &mut self,
        ctx: &CallContext,
        instance_id: &str,
        message: SimMessage,
    ) -> Result<ProcessMessageResponse> {
        let req = ProcessMessageRequest {
            instance_id: instance_id.to_string(),
            message,
        };
        self.call(ctx, methods::PROCESS_MESSAGE, &req).await
    }

    /// Ask a message-ICD plugin to encode `payload` into `format`.
    ///
    /// The payload is converted to its wire struct before anything is sent;
    /// an unrepresentable payload fails without a network call.
    pub async fn encode_message(
        &mut self,
        ctx: &CallContext,
        message_type: &str,
        format: &str,
        payload: &PayloadMap,
    ) -> Result<EncodeMessageResponse> {
        let req = EncodeMessageRequest {
            message_type: message_type.to_string(),
            format: format.to_string(),
            payload: to_wire_struct(payload)?,
        };
        self.call(ctx, methods::ENCODE_MESSAGE, &req).await
    }

    /// Ask a message-ICD plugin to decode `encoded_payload`.
    pub async fn decode_message(
        &mut self,
        ctx: &CallContext,
        message_type: &str,
        content_type: &str,
        encoded_payload: &[u8],
    ) -> Result<DecodeMessageResponse> {
        let req = DecodeMessageRequest {
            message_type: message_type.to_string(),
            content_type: content_type.to_string(),
            encoded_payload: encoded_payload.to_vec(),
        };
        self.call(ctx, methods::DECODE_MESSAGE, &req).await
    }

    async fn call<Req, Resp>(&mut self, ctx: &CallContext, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        if matches!(self.conn, Connection::Closed) {
            return Err(PluginError::ConnectionClosed);
        }

        let id = self.next_id;
        self.next_id += 1;
        let request_bytes = serde_json::to_vec(&RpcRequest::new(method, serde_json::to_value(req)?, id))?;

        let exchanged = ctx
            .run(exchange(&mut self.conn, &self.target, &self.endpoint, &request_bytes))
            .await;

        let response_bytes = match exchanged {
            Ok(bytes) => bytes,
            Err(e) => {
                // A half-finished exchange leaves the stream unusable.
                if let Connection::Connected(_) = self.conn {
                    self.conn = Connection::Idle;
                }
                return Err(e);
            }
        };

        let response: RpcResponse =
            serde_json::from_slice(&response_bytes).map_err(|e| PluginError::Decode {
                context: "RPC response",
                source: e,
            })?;

        if let Some(err) = response.error {
            return Err(PluginError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = response.result.ok_or_else(|| PluginError::Rpc {
            code: -32603,
            message: format!("{} response missing result", method),
        })?;

        serde_json::from_value(result).map_err(|e| PluginError::Decode {
            context: "RPC result",
            source: e,
        })
    }
}

/// Send one request frame and read one response frame, dialing first if needed.
async fn exchange(
    conn: &mut Connection,
    target: &str,
    endpoint: &str,
    request: &[u8],
) -> Result<Vec<u8>> {
    if let Connection::Idle = conn {
        let stream = TcpStream::connect(target)
            .await
            .map_err(|e| PluginError::Transport {
                endpoint: endpoint.to_string(),
                message: format!("failed to connect to plugin: {}", e),
                source: Some(e),
            })?;
        debug!("Connected to plugin at {}", endpoint);
        *conn = Connection::Connected(stream);
    }

    let Connection::Connected(stream) = conn else {
        return Err(PluginError::ConnectionClosed);
    };
    let (mut reader, mut writer) = stream.split();

    write_frame(&mut writer, request)
        .await
        .map_err(|e| transport_error(endpoint, "failed to send request", e))?;

    read_frame(&mut reader)
        .await
        .map_err(|e| transport_error(endpoint, "failed to read response", e))?
        .ok_or_else(|| PluginError::Transport {
            endpoint: endpoint.to_string(),
            message: "connection closed by plugin".to_string(),
            source: None,
        })
}

fn transport_error(endpoint: &str, what: &str, err: PluginError) -> PluginError {
    match err {
        PluginError::Io { source, message, .. } => PluginError::Transport {
            endpoint: endpoint.to_string(),
            message: format!("{}: {}", what, message),
            source,
        },
        other => PluginError::Transport {
            endpoint: endpoint.to_string(),
            message: format!("{}: {}", what, other),
            source: None,
        },
    }
}

/// Turn `host:port` or `tcp://host:port` into a dialable `host:port`.
fn parse_endpoint(endpoint: &str) -> Result<String> {
    let invalid = |message: &str| PluginError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    };

    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(invalid("endpoint is empty"));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("tcp://{}", trimmed)
    };

    let url = url::Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "tcp" {
        return Err(invalid("only tcp:// endpoints are supported"));
    }
    if !matches!(url.path(), "" | "/") || url.query().is_some() {
        return Err(invalid("endpoint must not carry a path or query"));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host"))?;
    let port = url.port().ok_or_else(|| invalid("missing port"))?;

    Ok(format!("{}:{}", host, port))
}
