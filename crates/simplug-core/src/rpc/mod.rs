//! Plugin-to-plugin RPC.
//!
//! Length-prefixed JSON-RPC 2.0 over TCP.
//!
//! # Architecture
//!
//! - **Client**: `PluginServiceClient`, one lazily dialed connection per remote plugin
//! - **Server**: `PluginServer`, serves a `PluginService` implementation
//! - **Protocol**: framing, method names and typed request/response bodies
//! - **Context**: cancellation and deadlines forwarded with every call

pub mod client;
pub mod context;
pub mod protocol;
pub mod server;

pub use client::PluginServiceClient;
pub use context::{CallContext, CancellationToken};
pub use protocol::{
    DecodeMessageRequest, DecodeMessageResponse, EncodeMessageRequest, EncodeMessageResponse,
    HealthCheckRequest, HealthCheckResponse, ProcessMessageRequest, ProcessMessageResponse,
    ServingStatus, SimMessage,
};
pub use server::{PluginServer, PluginServerHandle, PluginService};
