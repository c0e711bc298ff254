// Native backend tests - multiplexed JSON-RPC over an in-memory transport
//
// Covers lazy connection, response correlation, remote error mapping,
// log streaming with cancellation and reconnection after a dropped session.

#[path = "../support/fake_joblet.rs"]
mod fake_joblet;

use fake_joblet::{DuplexConnector, native_backend};
use joblet_mcp::application::backend::JobBackend;
use joblet_mcp::domain::{ErrorKind, WorkflowRequest};
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

const JOB_A: &str = "aaaaaaaa-0000-4000-8000-000000000001";
const JOB_B: &str = "bbbbbbbb-0000-4000-8000-000000000002";

#[tokio::test]
async fn connects_lazily_and_reuses_session() {
    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector.clone());
    assert_eq!(connector.connects(), 0);

    let server = tokio::spawn(async move {
        let mut server = accepted.recv().await.expect("connection");
        for _ in 0..2 {
            let request = server.expect_request("job.list").await;
            server
                .reply(&request, json!({ "jobs": [{ "uuid": JOB_A, "status": "COMPLETED" }] }))
                .await;
        }
        server
    });

    let first = backend.list_jobs().await.expect("first list");
    let second = backend.list_jobs().await.expect("second list");
    assert_eq!(first, second);
    assert_eq!(first.data["count"], json!(1));
    assert_eq!(connector.connects(), 1);
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn correlates_out_of_order_responses() {
    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector);

    let server = tokio::spawn(async move {
        let mut server = accepted.recv().await.expect("connection");
        let first = server.expect_request("job.status").await;
        let second = server.expect_request("job.status").await;
        for request in [&second, &first] {
            let uuid = request["params"]["uuid"].clone();
            server
                .reply(request, json!({ "uuid": uuid, "status": "RUNNING" }))
                .await;
        }
        server
    });

    let (a, b) = tokio::join!(backend.job_status(JOB_A), backend.job_status(JOB_B));
    assert_eq!(a.expect("status a").data["uuid"], json!(JOB_A));
    assert_eq!(b.expect("status b").data["uuid"], json!(JOB_B));
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn remote_errors_map_to_canonical_kinds() {
    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector);

    let server = tokio::spawn(async move {
        let mut server = accepted.recv().await.expect("connection");
        let request = server.expect_request("volume.remove").await;
        server
            .reply_error(&request, -32004, "volume 'scratch' not found")
            .await;
        let request = server.expect_request("network.create").await;
        server
            .reply_error(&request, -32009, "network 'lab' already exists")
            .await;
        server
    });

    let err = backend.remove_volume("scratch").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.message.contains("scratch"));

    let request = joblet_mcp::domain::CreateNetworkRequest {
        name: "lab".into(),
        cidr: "10.10.0.0/24".into(),
    };
    let err = backend.create_network(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn streams_log_lines_until_final_response() {
    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector);

    let server = tokio::spawn(async move {
        let mut server = accepted.recv().await.expect("connection");
        let request = server.expect_request("job.logs").await;
        assert_eq!(request["params"]["uuid"], json!(JOB_A));
        server.log_line(&request, "compiling").await;
        server.log_line(&request, "done").await;
        server.reply(&request, json!({})).await;
        server
    });

    let mut stream = backend.stream_logs(JOB_A).await.expect("stream opens");
    assert_eq!(stream.next_line().await, Some(Ok("compiling".to_string())));
    assert_eq!(stream.next_line().await, Some(Ok("done".to_string())));
    assert_eq!(stream.next_line().await, None);
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn slow_log_consumer_does_not_stall_other_calls() {
    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector);

    let server = tokio::spawn(async move {
        let mut server = accepted.recv().await.expect("connection");
        let logs = server.expect_request("job.logs").await;
        for n in 0..1000 {
            server.log_line(&logs, &format!("line {n}")).await;
        }
        server.reply(&logs, json!({})).await;
        let listing = server.expect_request("job.list").await;
        server.reply(&listing, json!([])).await;
        server
    });

    let mut stream = backend.stream_logs(JOB_A).await.expect("stream opens");
    let jobs = tokio::time::timeout(Duration::from_secs(5), backend.list_jobs())
        .await
        .expect("reader keeps serving responses")
        .expect("job list");
    assert_eq!(jobs.data["count"], json!(0));

    let mut received = 0;
    while let Some(line) = stream.next_line().await {
        assert_eq!(line.expect("log line"), format!("line {received}"));
        received += 1;
    }
    assert!(received > 0);
    assert!(received < 1000, "unread lines were buffered without limit");
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn dropping_log_stream_sends_cancel_request() {
    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector);

    let stream = backend.stream_logs(JOB_A);
    let mut server_side = None;
    let server = async {
        let mut server = accepted.recv().await.expect("connection");
        let request = server.expect_request("job.logs").await;
        server.log_line(&request, "tick").await;
        server_side = Some((server, request));
    };
    let (stream, ()) = tokio::join!(stream, server);
    let mut stream = stream.expect("stream opens");
    let (mut server, request) = server_side.expect("server accepted");

    assert_eq!(stream.next_line().await, Some(Ok("tick".to_string())));
    drop(stream);

    let cancel = tokio::time::timeout(Duration::from_secs(5), server.recv())
        .await
        .expect("cancel arrives in time")
        .expect("client still connected");
    assert_eq!(cancel["method"], json!("$/cancelRequest"));
    assert_eq!(cancel["params"]["id"], request["id"]);
    assert!(cancel.get("id").is_none());
}

#[tokio::test]
async fn dropped_session_fails_call_and_reconnects() {
    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector.clone());

    let server = tokio::spawn(async move {
        let mut first = accepted.recv().await.expect("first connection");
        first.expect_request("monitor.status").await;
        drop(first);

        let mut second = accepted.recv().await.expect("second connection");
        let request = second.expect_request("monitor.status").await;
        second
            .reply(&request, json!({ "cpu": { "usagePercent": 12.5 } }))
            .await;
        second
    });

    let err = backend.system_status().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionError);

    let status = backend.system_status().await.expect("reconnected");
    assert_eq!(status.data["cpu"]["usage_percent"], json!(12.5));
    assert_eq!(connector.connects(), 2);
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn list_nodes_reads_configuration_without_connecting() {
    let (connector, _accepted) = DuplexConnector::new();
    let backend = native_backend(connector.clone());

    let result = backend.list_nodes().await.expect("nodes");
    assert_eq!(result.data["count"], json!(2));
    let nodes = result.data["nodes"].as_array().expect("node list");
    let default = nodes
        .iter()
        .find(|node| node["name"] == json!("default"))
        .expect("default node");
    assert_eq!(default["active"], json!(true));
    assert_eq!(default["insecure"], json!(true));
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn workflow_file_is_sent_inline() {
    let dir = tempdir().expect("tempdir");
    let workflow_file = dir.path().join("pipeline.yaml");
    std::fs::write(&workflow_file, "jobs:\n  extract:\n    command: echo\n").expect("write workflow");

    let (connector, mut accepted) = DuplexConnector::new();
    let backend = native_backend(connector);
    let server = tokio::spawn(async move {
        let mut server = accepted.recv().await.expect("connection");
        let request = server.expect_request("workflow.run").await;
        assert_eq!(request["params"]["name"], json!("pipeline.yaml"));
        assert!(
            request["params"]["content"]
                .as_str()
                .is_some_and(|content| content.contains("extract"))
        );
        server
            .reply(&request, json!([{ "uuid": JOB_A, "name": "extract" }]))
            .await;
        server
    });

    let result = backend
        .run_workflow(&WorkflowRequest { workflow_file })
        .await
        .expect("workflow runs");
    assert_eq!(result.data["jobs"][0]["uuid"], json!(JOB_A));
    drop(server.await.expect("server task"));
}

#[tokio::test]
async fn missing_workflow_file_is_not_found_without_connecting() {
    let dir = tempdir().expect("tempdir");
    let (connector, _accepted) = DuplexConnector::new();
    let backend = native_backend(connector.clone());

    let request = WorkflowRequest {
        workflow_file: dir.path().join("absent.yaml"),
    };
    let err = backend.run_workflow(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(connector.connects(), 0);
}
