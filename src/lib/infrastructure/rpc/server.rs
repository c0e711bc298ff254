use super::types::{CallToolParams, JSONRPC_VERSION, RpcRequest, RpcResponse};
use crate::application::dispatch::Dispatcher;
use crate::domain::{CanonicalError, ToolInvocation, ToolOutcome};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "joblet-mcp";

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("MCP transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves MCP over stdin/stdout until the client closes stdin.
pub async fn serve_stdio(dispatcher: Arc<Dispatcher>) -> Result<(), ServeError> {
    serve(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Reads newline-delimited JSON-RPC from `reader` and answers on `writer`.
///
/// Each `tools/call` runs on its own task, so a slow job never blocks the
/// rest. Responses are serialised through a single writer task.
pub async fn serve<R, W>(dispatcher: Arc<Dispatcher>, reader: R, writer: W) -> Result<(), ServeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<RpcResponse>();
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let mut calls = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();

    info!(tools = dispatcher.list_tools().len(), "MCP server ready on stdio");

    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };
        while calls.try_join_next().is_some() {}

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<RpcRequest>(trimmed) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "Received malformed JSON-RPC message");
                let _ = tx.send(RpcResponse::parse_error(format!("Parse error: {err}")));
                continue;
            }
        };

        if let Some(response) = handle_request(&dispatcher, request, &tx, &mut calls) {
            let _ = tx.send(response);
        }
    };

    debug!(in_flight = calls.len(), "stdin closed; draining tool calls");
    while let Some(joined) = calls.join_next().await {
        if let Err(err) = joined {
            error!(%err, "Tool call task failed");
        }
    }
    drop(tx);

    match writer_task.await {
        Ok(result) => result?,
        Err(err) => error!(%err, "MCP writer task failed"),
    }
    read_result?;
    info!("MCP server stopped");
    Ok(())
}

fn handle_request(
    dispatcher: &Arc<Dispatcher>,
    request: RpcRequest,
    tx: &mpsc::UnboundedSender<RpcResponse>,
    calls: &mut JoinSet<()>,
) -> Option<RpcResponse> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Some(RpcResponse::invalid_request(
            request.id,
            "Unsupported jsonrpc version (expected 2.0)",
        ));
    }
    if request.is_notification() {
        debug!(method = %request.method, "Received notification");
        return None;
    }

    debug!(method = %request.method, "Received JSON-RPC request");
    let id = request.id;
    match request.method.as_str() {
        "initialize" => Some(RpcResponse::success(id, initialize_result(request.params.as_ref()))),
        "ping" => Some(RpcResponse::success(id, json!({}))),
        "tools/list" => {
            let tools: Vec<Value> = dispatcher
                .list_tools()
                .into_iter()
                .map(|spec| spec.to_json())
                .collect();
            Some(RpcResponse::success(id, json!({ "tools": tools })))
        }
        "tools/call" => {
            let params = match parse_call(request.params) {
                Ok(params) => params,
                Err(message) => return Some(RpcResponse::invalid_params(id, message)),
            };
            let arguments = params.arguments.unwrap_or(Value::Null);
            let Some(invocation) = ToolInvocation::from_value(params.name, arguments) else {
                let err = CanonicalError::validation("tool arguments must be a JSON object");
                return Some(RpcResponse::success(id, tool_result(Err(err))));
            };
            let dispatcher = Arc::clone(dispatcher);
            let tx = tx.clone();
            calls.spawn(async move {
                let outcome = dispatcher.invoke(invocation).await;
                let _ = tx.send(RpcResponse::success(id, tool_result(outcome)));
            });
            None
        }
        other => {
            warn!(method = other, "Unknown JSON-RPC method");
            Some(RpcResponse::method_not_found(id, other))
        }
    }
}

fn parse_call(params: Option<Value>) -> Result<CallToolParams, String> {
    let params = params.ok_or_else(|| "tools/call requires params with a tool name".to_string())?;
    serde_json::from_value(params).map_err(|err| format!("invalid tools/call params: {err}"))
}

fn initialize_result(params: Option<&Value>) -> Value {
    let requested = params
        .and_then(|params| params.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": requested,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Tool failures are results with `isError`, not JSON-RPC errors.
pub fn tool_result(outcome: ToolOutcome) -> Value {
    match outcome {
        Ok(result) => {
            let text = result.text();
            let structured = match result.data {
                Value::Object(_) => result.data,
                other => json!({ "result": other }),
            };
            json!({
                "content": [{ "type": "text", "text": text }],
                "structuredContent": structured,
                "isError": false,
            })
        }
        Err(err) => json!({
            "content": [{ "type": "text", "text": err.to_string() }],
            "structuredContent": err.to_payload(),
            "isError": true,
        }),
    }
}

async fn write_responses<W>(
    writer: W,
    mut rx: mpsc::UnboundedReceiver<RpcResponse>,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    while let Some(response) = rx.recv().await {
        let mut encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(%err, "Failed to encode JSON-RPC response");
                continue;
            }
        };
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
