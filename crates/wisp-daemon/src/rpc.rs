//! JSON-RPC control surface over a Unix socket.
//!
//! Listens on `$WISP_DATA_DIR/daemon.sock`, accepts line-delimited JSON-RPC
//! requests, and dispatches them to the service facade. This is the seam a
//! UI or CLI talks to; the daemon itself never depends on it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use wisp_measure::MeasureError;

use crate::service::WispService;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    // Domain errors

    /// Node not found (-32020).
    pub fn node_not_found(node_id: &str) -> Self {
        Self {
            code: -32020,
            message: "NODE_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"node_id": node_id})),
        }
    }

    /// Node inactive (-32021).
    pub fn node_inactive(node_id: &str) -> Self {
        Self {
            code: -32021,
            message: "NODE_INACTIVE".to_string(),
            data: Some(serde_json::json!({"node_id": node_id})),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    service: Arc<WispService>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(service: Arc<WispService>, socket_path: PathBuf) -> Self {
        Self {
            service,
            socket_path,
        }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(service, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    service: Arc<WispService>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(service.clone(), request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

#[derive(Deserialize)]
struct NodeOwnerParams {
    node_id: String,
    owner_id: String,
}

#[derive(Deserialize)]
struct NodeParams {
    node_id: String,
}

#[derive(Deserialize)]
struct NodeActiveParams {
    node_id: String,
    active: bool,
}

#[derive(Deserialize)]
struct UserParams {
    user_id: String,
}

#[derive(Deserialize)]
struct PayoutAddressParams {
    user_id: String,
    address: String,
}

fn parse<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
) -> Result<T, RpcError> {
    serde_json::from_value(params.clone()).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Map a measurement rejection onto its RPC error code.
fn measure_error(err: anyhow::Error) -> RpcError {
    match err.downcast_ref::<MeasureError>() {
        Some(MeasureError::NodeNotFound(node_id)) => RpcError::node_not_found(node_id),
        Some(MeasureError::NodeInactive(node_id)) => RpcError::node_inactive(node_id),
        _ => RpcError::internal_error(&err.to_string()),
    }
}

/// Dispatch a JSON-RPC request to the service facade.
pub async fn dispatch_request(service: Arc<WispService>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        "register_node" => match parse::<NodeOwnerParams>(&request.params) {
            Ok(p) => service
                .register_node(&p.node_id, &p.owner_id)
                .await
                .map_err(|e| RpcError::internal_error(&e.to_string()))
                .and_then(|node| to_json(&node)),
            Err(e) => Err(e),
        },
        "set_node_active" => match parse::<NodeActiveParams>(&request.params) {
            Ok(p) => service
                .set_node_active(&p.node_id, p.active)
                .await
                .map_err(measure_error)
                .and_then(|node| to_json(&node)),
            Err(e) => Err(e),
        },
        "set_payout_address" => match parse::<PayoutAddressParams>(&request.params) {
            Ok(p) => service
                .set_payout_address(&p.user_id, &p.address)
                .await
                .map_err(|e| RpcError::internal_error(&e.to_string()))
                .map(|()| serde_json::json!({"user_id": p.user_id, "address": p.address})),
            Err(e) => Err(e),
        },
        "measure_node" => match parse::<NodeParams>(&request.params) {
            Ok(p) => service
                .measure_once(&p.node_id)
                .await
                .map_err(measure_error)
                .and_then(|proof| to_json(&proof)),
            Err(e) => Err(e),
        },
        "get_network_stats" => service
            .network_stats()
            .await
            .map_err(|e| RpcError::internal_error(&e.to_string()))
            .and_then(|stats| to_json(&stats)),
        "get_user_points" => match parse::<UserParams>(&request.params) {
            Ok(p) => service
                .user_points(&p.user_id)
                .await
                .map_err(|e| RpcError::internal_error(&e.to_string()))
                .and_then(|snapshot| to_json(&snapshot)),
            Err(e) => Err(e),
        },
        "trigger_distribution" => {
            let report = service.trigger_distribution().await;
            to_json(&report)
        }
        "get_distribution_stats" => service
            .distribution_stats()
            .await
            .map_err(|e| RpcError::internal_error(&e.to_string()))
            .and_then(|stats| to_json(&stats)),
        "start_scheduler" => {
            service.start_scheduler();
            Ok(serde_json::json!({"running": true}))
        }
        "stop_scheduler" => {
            service.stop_scheduler().await;
            Ok(serde_json::json!({"running": false}))
        }
        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
