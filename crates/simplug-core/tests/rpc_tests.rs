//! End-to-end tests for `PluginServer` and `PluginServiceClient` over TCP.

use simplug_core::rpc::{
    DecodeMessageRequest, DecodeMessageResponse, EncodeMessageRequest, EncodeMessageResponse,
    PluginServerHandle, ProcessMessageRequest, ProcessMessageResponse, ServingStatus, SimMessage,
};
use simplug_core::{
    from_wire_struct, to_wire_struct, CallContext, CancellationToken, PayloadMap, PayloadValue,
    PluginError, PluginManifest, PluginServer, PluginService, PluginServiceClient, PluginType,
    Result,
};
use std::sync::Arc;
use std::time::Duration;

const SLOW_INSTANCE: &str = "slow-instance";

/// Component + codec plugin used to exercise every operation.
struct TestPlugin;

#[async_trait::async_trait]
impl PluginService for TestPlugin {
    async fn get_manifest(&self) -> Result<PluginManifest> {
        Ok(
            PluginManifest::new("test-plugin", "Test Plugin", "1.0.0", PluginType::Component)
                .with_description("Echoes messages back")
                .with_rpc_endpoint("127.0.0.1:0"),
        )
    }

    async fn process_message(
        &self,
        request: ProcessMessageRequest,
    ) -> Result<ProcessMessageResponse> {
        match request.instance_id.as_str() {
            SLOW_INSTANCE => {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            "fighter-1" | "fighter-2" => {}
            other => {
                return Err(PluginError::UnknownInstance {
                    instance_id: other.to_string(),
                })
            }
        }

        let reply = SimMessage::new(
            format!("{}.ack", request.message.message_type),
            request.instance_id,
            request.message.payload,
        );
        Ok(ProcessMessageResponse {
            success: true,
            error_message: None,
            output_messages: vec![reply],
        })
    }

    async fn encode_message(&self, request: EncodeMessageRequest) -> Result<EncodeMessageResponse> {
        if request.format != "json" {
            return Err(PluginError::UnsupportedFormat {
                format: request.format,
            });
        }
        let payload = PayloadValue::Map(from_wire_struct(&request.payload));
        Ok(EncodeMessageResponse {
            encoded_payload: serde_json::to_vec(&payload.to_json())?,
            content_type: "application/json".to_string(),
        })
    }

    async fn decode_message(&self, request: DecodeMessageRequest) -> Result<DecodeMessageResponse> {
        let value: serde_json::Value = serde_json::from_slice(&request.encoded_payload)?;
        let PayloadValue::Map(fields) = PayloadValue::from_json(value) else {
            return Err(PluginError::Other("payload must be an object".into()));
        };
        Ok(DecodeMessageResponse {
            payload: to_wire_struct(&fields)?,
        })
    }
}

/// Plugin that only serves its manifest.
struct ManifestOnly;

#[async_trait::async_trait]
impl PluginService for ManifestOnly {
    async fn get_manifest(&self) -> Result<PluginManifest> {
        Ok(PluginManifest::new("bare", "Bare", "0.0.1", PluginType::Transport))
    }
}

async fn start_plugin() -> (PluginServerHandle, PluginServiceClient) {
    let handle = PluginServer::start("127.0.0.1:0", Arc::new(TestPlugin))
        .await
        .unwrap();
    let client = PluginServiceClient::new(&handle.addr().to_string()).unwrap();
    (handle, client)
}

fn track_payload() -> PayloadMap {
    let mut position = PayloadMap::new();
    position.insert("lat".into(), 36.1.into());
    position.insert("lon".into(), (-115.2).into());

    let mut payload = PayloadMap::new();
    payload.insert("callsign".into(), "VIPER".into());
    payload.insert("airborne".into(), true.into());
    payload.insert("position".into(), position.into());
    payload.insert(
        "waypoints".into(),
        vec![PayloadValue::from(1.0), PayloadValue::from(2.5)].into(),
    );
    payload.insert("squawk".into(), PayloadValue::Null);
    payload
}

#[tokio::test]
async fn test_health_and_manifest() {
    let (_handle, mut client) = start_plugin().await;
    let ctx = CallContext::with_timeout(Duration::from_secs(5));

    let health = client.health_check(&ctx, "").await.unwrap();
    assert_eq!(health.status, ServingStatus::Serving);
    assert!(client.is_connected());

    let manifest = client.get_manifest(&ctx).await.unwrap();
    assert_eq!(manifest.id, "test-plugin");
    assert_eq!(manifest.plugin_type, PluginType::Component);
    assert_eq!(manifest.description.as_deref(), Some("Echoes messages back"));
}

#[tokio::test]
async fn test_tcp_scheme_endpoint() {
    let handle = PluginServer::start("127.0.0.1:0", Arc::new(ManifestOnly))
        .await
        .unwrap();
    let mut client = PluginServiceClient::new(&format!("tcp://{}", handle.addr())).unwrap();

    let manifest = client.get_manifest(&CallContext::background()).await.unwrap();
    assert_eq!(manifest.id, "bare");
}

#[tokio::test]
async fn test_process_message_round_trip() {
    let (_handle, mut client) = start_plugin().await;
    let ctx = CallContext::background();

    let message = SimMessage::new("track.update", "radar-1", to_wire_struct(&track_payload()).unwrap())
        .with_metadata("seq", "17");

    let resp = client
        .process_message(&ctx, "fighter-1", message)
        .await
        .unwrap();

    assert!(resp.success);
    assert_eq!(resp.output_messages.len(), 1);
    let reply = &resp.output_messages[0];
    assert_eq!(reply.message_type, "track.update.ack");
    assert_eq!(reply.source_id, "fighter-1");
    assert_eq!(from_wire_struct(&reply.payload), track_payload());
}

#[tokio::test]
async fn test_service_error_surfaces_as_rpc_error() {
    let (_handle, mut client) = start_plugin().await;
    let ctx = CallContext::background();

    let message = SimMessage::new("track.update", "radar-1", Default::default());
    let err = client
        .process_message(&ctx, "nobody", message)
        .await
        .unwrap_err();

    match err {
        PluginError::Rpc { code, message } => {
            assert_eq!(code, -32001);
            assert!(message.contains("nobody"));
        }
        other => panic!("Expected Rpc error, got: {:?}", other),
    }

    // The connection survives an application-level error.
    assert!(client.is_connected());
    client.health_check(&ctx, "").await.unwrap();
}

#[tokio::test]
async fn test_encode_decode_round_trip() {
    let (_handle, mut client) = start_plugin().await;
    let ctx = CallContext::with_timeout(Duration::from_secs(5));

    let encoded = client
        .encode_message(&ctx, "track", "json", &track_payload())
        .await
        .unwrap();
    assert_eq!(encoded.content_type, "application/json");

    let body: serde_json::Value = serde_json::from_slice(&encoded.encoded_payload).unwrap();
    assert_eq!(body["callsign"], "VIPER");
    assert!(body["squawk"].is_null());

    let decoded = client
        .decode_message(&ctx, "track", &encoded.content_type, &encoded.encoded_payload)
        .await
        .unwrap();
    assert_eq!(decoded.payload_map(), track_payload());
}

#[tokio::test]
async fn test_unsupported_operation_is_unimplemented() {
    let handle = PluginServer::start("127.0.0.1:0", Arc::new(ManifestOnly))
        .await
        .unwrap();
    let mut client = PluginServiceClient::new(&handle.addr().to_string()).unwrap();

    let err = client
        .encode_message(&CallContext::background(), "track", "json", &PayloadMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PluginError::Rpc { code: -32601, .. }));
}

#[tokio::test]
async fn test_deadline_interrupts_call_and_next_call_redials() {
    let (_handle, mut client) = start_plugin().await;
    let message = SimMessage::new("track.update", "radar-1", Default::default());

    let err = client
        .process_message(
            &CallContext::with_timeout(Duration::from_millis(100)),
            SLOW_INSTANCE,
            message,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PluginError::DeadlineExceeded));
    assert!(!client.is_connected());

    let health = client
        .health_check(&CallContext::with_timeout(Duration::from_secs(5)), "")
        .await
        .unwrap();
    assert_eq!(health.status, ServingStatus::Serving);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_cancellation_interrupts_call() {
    let (_handle, mut client) = start_plugin().await;
    let token = CancellationToken::new();
    let ctx = CallContext::background().with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let message = SimMessage::new("track.update", "radar-1", Default::default());
    let err = client
        .process_message(&ctx, SLOW_INSTANCE, message)
        .await
        .unwrap_err();

    assert!(matches!(err, PluginError::Cancelled));
}

#[tokio::test]
async fn test_already_expired_context_fails_without_dialing() {
    let (_handle, mut client) = start_plugin().await;
    let token = CancellationToken::new();
    token.cancel();

    let err = client
        .get_manifest(&CallContext::background().with_cancellation(token))
        .await
        .unwrap_err();

    assert!(matches!(err, PluginError::Cancelled));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_close_releases_connection() {
    let (_handle, mut client) = start_plugin().await;
    let ctx = CallContext::background();

    client.health_check(&ctx, "").await.unwrap();
    assert!(client.is_connected());

    client.close();
    client.close();
    assert!(!client.is_connected());

    let err = client.get_manifest(&ctx).await.unwrap_err();
    assert!(matches!(err, PluginError::ConnectionClosed));
}

#[tokio::test]
async fn test_reconnects_after_server_restart() {
    let (mut handle, mut client) = start_plugin().await;
    let addr = handle.addr();
    let ctx = CallContext::with_timeout(Duration::from_secs(5));

    client.health_check(&ctx, "").await.unwrap();

    handle.shutdown();
    drop(handle);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The old connection is gone; the failure is reported, not retried.
    let err = client.health_check(&ctx, "").await.unwrap_err();
    assert!(matches!(err, PluginError::Transport { .. }), "got {:?}", err);
    assert!(!client.is_connected());

    let _restarted = PluginServer::start(&addr.to_string(), Arc::new(TestPlugin))
        .await
        .unwrap();

    let health = client.health_check(&ctx, "").await.unwrap();
    assert_eq!(health.status, ServingStatus::Serving);
}
