// In-memory stand-in for a joblet node speaking line-delimited JSON-RPC.
#![allow(dead_code)]

use async_trait::async_trait;
use joblet_mcp::config::ConfigDocument;
use joblet_mcp::native::{BoxedStream, Connector, NativeBackend, RpcError};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

pub const ENDPOINT: &str = "fake-joblet:50051";

pub const CONFIG: &str = r#"
nodes:
  default:
    address: "fake-joblet:50051"
  backup:
    address: "backup-joblet:50051"
"#;

/// Hands the server half of every new connection to the test.
pub struct DuplexConnector {
    connects: AtomicUsize,
    servers: mpsc::UnboundedSender<FakeServer>,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServer>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            connects: AtomicUsize::new(0),
            servers,
        });
        (connector, accepted)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self) -> Result<BoxedStream, RpcError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.servers
            .send(FakeServer::new(server))
            .map_err(|_| RpcError::Connect {
                endpoint: ENDPOINT.to_string(),
                message: "fake server gone".to_string(),
            })?;
        Ok(Box::new(client))
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }
}

pub struct FakeServer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeServer {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Next message from the client, or `None` once it hangs up.
    pub async fn recv(&mut self) -> Option<Value> {
        let line = self.lines.next_line().await.expect("read from client")?;
        Some(serde_json::from_str(&line).expect("client sent valid JSON"))
    }

    pub async fn expect_request(&mut self, method: &str) -> Value {
        let request = self.recv().await.expect("client request");
        assert_eq!(request["method"], json!(method), "unexpected request {request}");
        request
    }

    pub async fn send(&mut self, message: Value) {
        let mut encoded = message.to_string();
        encoded.push('\n');
        self.writer
            .write_all(encoded.as_bytes())
            .await
            .expect("write to client");
        self.writer.flush().await.expect("flush to client");
    }

    pub async fn reply(&mut self, request: &Value, result: Value) {
        self.send(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
            .await;
    }

    pub async fn reply_error(&mut self, request: &Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": message },
        }))
        .await;
    }

    pub async fn log_line(&mut self, request: &Value, line: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "job.logs.line",
            "params": { "request": request["id"], "line": line },
        }))
        .await;
    }
}

pub fn document() -> ConfigDocument {
    ConfigDocument::from_yaml_str(Path::new("rnx-config.yml"), CONFIG).expect("valid config")
}

pub fn native_backend(connector: Arc<DuplexConnector>) -> NativeBackend {
    NativeBackend::with_connector(
        connector,
        document(),
        "default".to_string(),
        Duration::from_secs(5),
    )
}
