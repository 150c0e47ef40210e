// render.rs - Outbound call asking the render service for the next generation

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{BoardCodec, CodecError};
use crate::config::ServiceConfig;
use crate::grid::Board;

/// ABCI query path that renders a realm at a given path argument.
pub const RENDER_QUERY_PATH: &str = "vm/qrender";

/// Why an advance produced no board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("render service unreachable: {0}")]
    Transport(String),
    #[error("render service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("render service reported an error: {0}")]
    Service(String),
    #[error("malformed render response: {0}")]
    MalformedResponse(String),
    #[error("malformed board from render service: {0}")]
    MalformedBoard(#[from] CodecError),
}

impl RenderError {
    /// The call never completed: refused connection, timeout, broken stream.
    pub fn is_transport(&self) -> bool {
        matches!(self, RenderError::Transport(_))
    }

    pub fn is_malformed_board(&self) -> bool {
        matches!(self, RenderError::MalformedBoard(_))
    }
}

/// Computes the next generation of a board.
///
/// Implementations hold no session state; the session controller owns
/// everything the result is applied to.
pub trait RenderGateway: Send + Sync + 'static {
    fn advance(&self, board: &Board) -> impl Future<Output = Result<Board, RenderError>> + Send;
}

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (&'static str, String),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<AbciQueryResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AbciQueryResult {
    response: AbciResponse,
}

#[derive(Debug, Deserialize)]
struct AbciResponse {
    #[serde(rename = "ResponseBase")]
    base: ResponseBase,
}

#[derive(Debug, Deserialize)]
struct ResponseBase {
    #[serde(rename = "Error", default)]
    error: Option<Value>,
    #[serde(rename = "Data", default)]
    data: Option<String>,
    #[serde(rename = "Log", default)]
    log: String,
}

pub(crate) fn build_request(id: u64, realm_path: &str, encoded_board: &str) -> RpcRequest {
    let query = format!("{realm_path}:{encoded_board}");
    RpcRequest {
        jsonrpc: "2.0",
        id,
        method: "abci_query",
        params: (RENDER_QUERY_PATH, BASE64.encode(query)),
    }
}

/// Extracts the rendered text from a JSON-RPC `abci_query` response body.
pub(crate) fn parse_render_response(body: &str) -> Result<String, RenderError> {
    let response: RpcResponse = serde_json::from_str(body)
        .map_err(|err| RenderError::MalformedResponse(format!("invalid JSON-RPC body: {err}")))?;

    if let Some(error) = response.error {
        let detail = match error.data {
            Some(Value::String(data)) if !data.is_empty() => format!(" ({data})"),
            Some(Value::Null) | None => String::new(),
            Some(other) => format!(" ({other})"),
        };
        return Err(RenderError::Service(format!(
            "rpc error {}: {}{detail}",
            error.code, error.message
        )));
    }

    let base = response
        .result
        .ok_or_else(|| RenderError::MalformedResponse("missing result".to_string()))?
        .response
        .base;

    if base.error.as_ref().is_some_and(|error| !error.is_null()) {
        let message = if base.log.trim().is_empty() {
            base.error.map(|error| error.to_string()).unwrap_or_default()
        } else {
            base.log.trim().to_string()
        };
        return Err(RenderError::Service(message));
    }

    let data = base
        .data
        .ok_or_else(|| RenderError::MalformedResponse("response carries no data".to_string()))?;
    let bytes = BASE64
        .decode(data.as_bytes())
        .map_err(|err| RenderError::MalformedResponse(format!("data is not base64: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| RenderError::MalformedResponse(format!("data is not UTF-8: {err}")))
}

/// Gateway that renders through a Gno realm over Tendermint JSON-RPC.
#[derive(Debug)]
pub struct GnoRenderGateway {
    client: Client,
    endpoint: String,
    realm_path: String,
    codec: BoardCodec,
    next_id: AtomicU64,
}

impl GnoRenderGateway {
    pub fn new(config: &ServiceConfig) -> Result<Self, RenderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| RenderError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ServiceConfig) -> Self {
        Self {
            client,
            endpoint: config.remote_rpc.clone(),
            realm_path: config.realm_path.clone(),
            codec: BoardCodec::default(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn realm_path(&self) -> &str {
        &self.realm_path
    }

    async fn render(&self, encoded: &str) -> Result<String, RenderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = build_request(id, &self.realm_path, encoded);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| RenderError::Transport(describe_transport(&err)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RenderError::Transport(describe_transport(&err)))?;

        if !status.is_success() {
            return Err(RenderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(id, bytes = body.len(), "render response received");
        parse_render_response(&body)
    }
}

impl RenderGateway for GnoRenderGateway {
    async fn advance(&self, board: &Board) -> Result<Board, RenderError> {
        let encoded = self.codec.encode(board);
        let result = self.render(&encoded).await.and_then(|text| {
            self.codec
                .decode_lenient(&text, Some(board.dimensions()))
                .map_err(RenderError::from)
        });
        if let Err(err) = &result {
            warn!(endpoint = %self.endpoint, realm = %self.realm_path, error = %err, "advance failed");
        }
        result
    }
}

fn describe_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
