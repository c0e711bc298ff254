// MCP server tests - full round trips from an MCP client to a fake joblet
//
// The server runs over an in-memory duplex pipe and dispatches to the native
// backend, which in turn talks to the fake joblet transport.

#[path = "../support/fake_joblet.rs"]
mod fake_joblet;

use fake_joblet::{DuplexConnector, native_backend};
use joblet_mcp::Dispatcher;
use joblet_mcp::rpc::serve;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

const JOB_UUID: &str = "aaaa1111-0000-4000-8000-000000000001";

struct McpClient {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
    server: JoinHandle<()>,
}

impl McpClient {
    fn start(connector: Arc<DuplexConnector>) -> Self {
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::new(native_backend(connector))).expect("catalogue builds"),
        );
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = tokio::spawn(async move {
            serve(dispatcher, server_read, server_write)
                .await
                .expect("server exits cleanly");
        });
        let (client_read, writer) = tokio::io::split(client_io);
        Self {
            lines: BufReader::new(client_read).lines(),
            writer,
            server,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut encoded = message.to_string();
        encoded.push('\n');
        self.writer.write_all(encoded.as_bytes()).await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("response in time")
            .expect("read")
            .expect("server still open");
        serde_json::from_str(&line).expect("valid JSON response")
    }

    async fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
        let response = self.recv().await;
        assert_eq!(response["id"], json!(id));
        response
    }

    async fn call_tool(&mut self, id: u64, name: &str, arguments: Value) -> Value {
        let response = self
            .request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
            .await;
        response["result"].clone()
    }

    async fn close(mut self) {
        self.writer.shutdown().await.expect("shutdown");
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server stops after EOF")
            .expect("server task");
    }
}

#[tokio::test]
async fn handshake_and_tool_listing() {
    let (connector, _accepted) = DuplexConnector::new();
    let mut client = McpClient::start(connector.clone());

    let init = client
        .request(1, "initialize", json!({ "protocolVersion": "2024-11-05", "capabilities": {} }))
        .await;
    assert_eq!(init["result"]["serverInfo"]["name"], json!("joblet-mcp"));
    assert!(init["result"]["capabilities"]["tools"].is_object());

    client
        .send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await;

    let listed = client.request(2, "tools/list", json!({})).await;
    let tools = listed["result"]["tools"].as_array().expect("tools array");
    assert_eq!(tools.len(), 23);
    let run = tools
        .iter()
        .find(|tool| tool["name"] == json!("joblet_run_job"))
        .expect("run tool");
    assert_eq!(run["inputSchema"]["type"], json!("object"));
    assert_eq!(run["inputSchema"]["required"], json!(["command"]));

    let pong = client.request(3, "ping", json!({})).await;
    assert_eq!(pong["result"], json!({}));

    client.close().await;
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn tool_call_reaches_joblet_with_resolved_prefix() {
    let (connector, mut accepted) = DuplexConnector::new();
    let joblet = tokio::spawn(async move {
        let mut server = accepted.recv().await.expect("joblet connection");
        let listing = server.expect_request("job.list").await;
        server
            .reply(
                &listing,
                json!([
                    { "uuid": JOB_UUID, "name": "train", "status": "RUNNING" },
                    { "uuid": "bbbb2222-0000-4000-8000-000000000002", "status": "COMPLETED" },
                ]),
            )
            .await;
        let stop = server.expect_request("job.stop").await;
        assert_eq!(stop["params"]["uuid"], json!(JOB_UUID));
        server.reply(&stop, json!({})).await;
        server
    });
    let mut client = McpClient::start(connector);

    let result = client
        .call_tool(1, "joblet_stop_job", json!({ "job_uuid": "aaaa" }))
        .await;
    assert_eq!(result["isError"], json!(false));
    assert_eq!(result["structuredContent"]["job_uuid"], json!(JOB_UUID));
    assert_eq!(result["structuredContent"]["action"], json!("stopped"));

    client.close().await;
    drop(joblet.await.expect("joblet task"));
}

#[tokio::test]
async fn failures_are_tool_results_not_protocol_errors() {
    let (connector, _accepted) = DuplexConnector::new();
    let mut client = McpClient::start(connector);

    let unknown = client.call_tool(1, "joblet_reboot_cluster", json!({})).await;
    assert_eq!(unknown["isError"], json!(true));
    assert_eq!(
        unknown["structuredContent"]["error"]["kind"],
        json!("UnknownTool")
    );

    let invalid = client
        .call_tool(2, "joblet_create_volume", json!({ "name": "cache", "size": 5 }))
        .await;
    assert_eq!(invalid["isError"], json!(true));
    assert_eq!(
        invalid["structuredContent"]["error"]["kind"],
        json!("ValidationError")
    );

    let missing_name = client.request(3, "tools/call", json!({ "arguments": {} })).await;
    assert_eq!(missing_name["error"]["code"], json!(-32602));

    let unsupported = client.request(4, "resources/list", json!({})).await;
    assert_eq!(unsupported["error"]["code"], json!(-32601));

    client.close().await;
}

#[tokio::test]
async fn malformed_json_gets_parse_error() {
    let (connector, _accepted) = DuplexConnector::new();
    let mut client = McpClient::start(connector);

    client.writer.write_all(b"{not json\n").await.expect("write");
    let response = client.recv().await;
    assert_eq!(response["error"]["code"], json!(-32700));
    assert_eq!(response["id"], Value::Null);

    client.close().await;
}
