//! Plugin-side RPC server.
//!
//! A plugin process implements [`PluginService`] and starts a
//! [`PluginServer`] on the address it will advertise in its manifest. Each
//! connection is handled in its own task; requests on one connection are
//! answered in order.

use super::protocol::{
    methods, read_frame, write_frame, DecodeMessageRequest, DecodeMessageResponse,
    EncodeMessageRequest, EncodeMessageResponse, HealthCheckRequest, HealthCheckResponse,
    ProcessMessageRequest, ProcessMessageResponse, RpcRequest, RpcResponse, ServingStatus,
};
use crate::config::RpcConfig;
use crate::error::{PluginError, Result};
use crate::manifest::PluginManifest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Operations a plugin exposes over RPC.
///
/// Only `get_manifest` is required. The message operations default to
/// `Unimplemented` so a plugin only overrides what its category supports.
#[async_trait::async_trait]
pub trait PluginService: Send + Sync + 'static {
    async fn health_check(&self, _request: HealthCheckRequest) -> Result<HealthCheckResponse> {
        Ok(HealthCheckResponse {
            status: ServingStatus::Serving,
        })
    }

    async fn get_manifest(&self) -> Result<PluginManifest>;

    async fn process_message(
        &self,
        _request: ProcessMessageRequest,
    ) -> Result<ProcessMessageResponse> {
        Err(PluginError::Unimplemented {
            method: methods::PROCESS_MESSAGE.to_string(),
        })
    }

    async fn encode_message(&self, _request: EncodeMessageRequest) -> Result<EncodeMessageResponse> {
        Err(PluginError::Unimplemented {
            method: methods::ENCODE_MESSAGE.to_string(),
        })
    }

    async fn decode_message(&self, _request: DecodeMessageRequest) -> Result<DecodeMessageResponse> {
        Err(PluginError::Unimplemented {
            method: methods::DECODE_MESSAGE.to_string(),
        })
    }
}

/// Handle to a running plugin server. Dropping shuts down the server.
pub struct PluginServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl PluginServerHandle {
    /// Address the server is bound to (the real port when started on port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and close the active ones.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for PluginServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// TCP server exposing a [`PluginService`].
pub struct PluginServer;

impl PluginServer {
    /// Bind `addr` and serve `service` in background tasks.
    pub async fn start<S: PluginService>(addr: &str, service: Arc<S>) -> Result<PluginServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!("Plugin RPC server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            service,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections,
        ));

        Ok(PluginServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop<S: PluginService>(
        listener: TcpListener,
        service: Arc<S>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Plugin RPC server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= RpcConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting RPC connection from {}: at max capacity ({})",
                                    peer_addr,
                                    RpcConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let service = service.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("RPC connection from {}", peer_addr);
                                if let Err(e) = Self::handle_connection(stream, &*service, &mut conn_shutdown).await {
                                    debug!("RPC connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("RPC accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection<S: PluginService>(
        mut stream: TcpStream,
        service: &S,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()),
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(());
                }
            };

            let response = Self::process_request(&frame, service).await;

            let response_bytes = serde_json::to_vec(&response)?;
            write_frame(&mut writer, &response_bytes).await?;
        }
    }

    async fn process_request<S: PluginService>(frame: &[u8], service: &S) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_slice(frame) {
            Ok(req) => req,
            Err(e) => {
                return RpcResponse::error(None, -32700, format!("Parse error: {}", e));
            }
        };

        if request.jsonrpc != RpcConfig::JSONRPC_VERSION {
            return RpcResponse::error(
                request.id,
                -32600,
                "Invalid Request: expected jsonrpc 2.0".to_string(),
            );
        }

        let params = request
            .params
            .unwrap_or(serde_json::Value::Object(Default::default()));

        match Self::dispatch(service, &request.method, params).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(e) => {
                debug!("{} failed: {}", request.method, e);
                RpcResponse::error(request.id, e.to_rpc_error_code(), e.to_string())
            }
        }
    }

    async fn dispatch<S: PluginService>(
        service: &S,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match method {
            methods::HEALTH_CHECK => to_result(service.health_check(parse_params(params)?).await?),
            methods::GET_MANIFEST => {
                let manifest = service.get_manifest().await?;
                Ok(serde_json::json!({ "manifest": manifest }))
            }
            methods::PROCESS_MESSAGE => {
                to_result(service.process_message(parse_params(params)?).await?)
            }
            methods::ENCODE_MESSAGE => {
                to_result(service.encode_message(parse_params(params)?).await?)
            }
            methods::DECODE_MESSAGE => {
                to_result(service.decode_message(parse_params(params)?).await?)
            }
            other => Err(PluginError::Unimplemented {
                method: other.to_string(),
            }),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: serde_json::Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| PluginError::Json {
        message: format!("Invalid params: {}", e),
        source: Some(e),
    })
}

fn to_result<T: Serialize>(value: T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
