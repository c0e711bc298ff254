// Subprocess backend tests - driving a fake `rnx` executable
//
// Each test writes a small shell script standing in for rnx, so argument
// building, output parsing and failure classification run end to end.
#![cfg(unix)]

use joblet_mcp::application::backend::JobBackend;
use joblet_mcp::domain::{CreateVolumeRequest, ErrorKind, VolumeType};
use joblet_mcp::subprocess::{CliBackend, CommandBuilder, ProcessRunner};
use serde_json::json;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};

const JOB_UUID: &str = "3f2a9c1e-0b4d-4e8a-9f7b-1c2d3e4f5a6b";

fn fake_rnx(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("rnx");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write fake rnx");
    let mut permissions = fs::metadata(&path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod");
    path
}

fn backend(binary: PathBuf) -> CliBackend {
    CliBackend::new(
        CommandBuilder::new(None, None),
        ProcessRunner::new(binary, 4, Duration::from_secs(10)),
    )
}

fn script_backend(body: &str) -> (TempDir, CliBackend) {
    let dir = tempdir().expect("tempdir");
    let binary = fake_rnx(dir.path(), body);
    (dir, backend(binary))
}

#[tokio::test]
async fn list_jobs_parses_json_output() {
    let (_dir, backend) = script_backend(&format!(
        r#"case "$1 $2" in
  "job list") echo '[{{"id":"{JOB_UUID}","name":"build","status":"RUNNING","startTime":"2026-01-01T00:00:00Z"}}]' ;;
  *) echo "unexpected: $*" >&2; exit 1 ;;
esac"#
    ));

    let result = backend.list_jobs().await.expect("job list succeeds");
    assert_eq!(result.data["count"], json!(1));
    let job = &result.data["jobs"][0];
    assert_eq!(job["uuid"], json!(JOB_UUID));
    assert_eq!(job["status"], json!("RUNNING"));
    assert_eq!(job["start_time"], json!("2026-01-01T00:00:00Z"));
}

#[tokio::test]
async fn existing_volume_is_a_conflict() {
    let (_dir, backend) = script_backend(
        r#"echo "Error: volume 'cache' already exists" >&2
exit 2"#,
    );

    let request = CreateVolumeRequest {
        name: "cache".into(),
        size: "1GB".into(),
        volume_type: VolumeType::Filesystem,
    };
    let err = backend.create_volume(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert!(err.message.contains("already exists"));
}

#[tokio::test]
async fn unknown_failure_keeps_stderr_detail() {
    let (_dir, backend) = script_backend(
        r#"echo "Error: quota exceeded for tenant" >&2
exit 3"#,
    );

    let err = backend.system_status().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendProcessError);
    assert!(err.message.contains("exit 3"));
    assert!(!err.message.contains("quota exceeded"));
    assert!(
        err.original_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("quota exceeded"))
    );
}

#[tokio::test]
async fn raw_stderr_is_not_the_error_message() {
    let (_dir, backend) = script_backend(
        r#"echo "panic: runtime error at /home/build/internal/secret.go:42 token=abc" >&2
exit 1"#,
    );

    let err = backend.system_status().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendProcessError);
    assert!(!err.message.contains("secret.go"));
    assert!(!err.message.contains("token=abc"));
    assert!(err.message.starts_with("rnx "));
    assert!(
        err.original_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("token=abc"))
    );
}

#[tokio::test]
async fn json_after_bracketed_banner_parses() {
    let (_dir, backend) = script_backend(&format!(
        r#"echo "[INFO] connected to node"
echo '[{{"uuid":"{JOB_UUID}","status":"COMPLETED"}}]'"#
    ));

    let result = backend.list_jobs().await.expect("job list succeeds");
    assert_eq!(result.data["count"], json!(1));
    assert_eq!(result.data["jobs"][0]["uuid"], json!(JOB_UUID));
}

#[tokio::test]
async fn process_limit_serialises_calls() {
    let dir = tempdir().expect("tempdir");
    let binary = fake_rnx(dir.path(), "sleep 0.5\necho '[]'");
    let backend = CliBackend::new(
        CommandBuilder::new(None, None),
        ProcessRunner::new(binary, 1, Duration::from_secs(10)),
    );

    let started = Instant::now();
    let (first, second) = tokio::join!(backend.list_jobs(), backend.list_jobs());
    let elapsed = started.elapsed();

    first.expect("first list");
    second.expect("second list");
    assert!(
        elapsed >= Duration::from_secs(1),
        "two calls overlapped with a limit of one process: {elapsed:?}"
    );
}

#[tokio::test]
async fn malformed_json_is_internal_error() {
    let (_dir, backend) = script_backend(r#"echo '{"jobs": [oops'"#);

    let err = backend.list_jobs().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InternalError);
    assert!(err.original_detail.is_some());
}

#[tokio::test]
async fn missing_binary_is_config_error() {
    let dir = tempdir().expect("tempdir");
    let backend = backend(dir.path().join("not-installed").join("rnx"));

    let err = backend.list_jobs().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConfigError);
    assert!(err.message.contains("RNX_BINARY"));
}

#[tokio::test]
async fn stop_job_reports_action() {
    let (_dir, backend) = script_backend(
        r#"[ "$1 $2" = "job stop" ] || exit 1
echo "Job stopped""#,
    );

    let result = backend.stop_job(JOB_UUID).await.expect("stop succeeds");
    assert_eq!(result.data["job_uuid"], json!(JOB_UUID));
    assert_eq!(result.data["action"], json!("stopped"));
}

#[tokio::test]
async fn finite_log_stream_ends_after_last_line() {
    let (_dir, backend) = script_backend(
        r#"printf 'first\nsecond\n'"#,
    );

    let mut stream = backend.stream_logs(JOB_UUID).await.expect("stream starts");
    assert_eq!(stream.next_line().await, Some(Ok("first".to_string())));
    assert_eq!(stream.next_line().await, Some(Ok("second".to_string())));
    assert_eq!(stream.next_line().await, None);
}

#[tokio::test]
async fn failing_log_stream_yields_classified_error() {
    let (_dir, backend) = script_backend(
        r#"echo "partial"
echo "Error: job not found" >&2
exit 1"#,
    );

    let mut stream = backend.stream_logs(JOB_UUID).await.expect("stream starts");
    assert_eq!(stream.next_line().await, Some(Ok("partial".to_string())));
    let err = stream
        .next_line()
        .await
        .expect("error item")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timed_out_command_is_killed() {
    let dir = tempdir().expect("tempdir");
    let pidfile = dir.path().join("rnx.pid");
    let binary = fake_rnx(
        dir.path(),
        &format!("echo $$ > \"{}\"\nexec sleep 5", pidfile.display()),
    );
    let backend = CliBackend::new(
        CommandBuilder::new(None, None),
        ProcessRunner::new(binary, 1, Duration::from_millis(300)),
    );

    let started = Instant::now();
    let err = backend.list_jobs().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendProcessError);
    assert!(err.message.contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(4));

    let pid = fs::read_to_string(&pidfile)
        .expect("pidfile written")
        .trim()
        .to_string();
    assert!(
        !PathBuf::from(format!("/proc/{pid}")).exists(),
        "rnx process {pid} still running after timeout"
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn cancelling_log_stream_kills_process() {
    let dir = tempdir().expect("tempdir");
    let pidfile = dir.path().join("rnx.pid");
    let binary = fake_rnx(
        dir.path(),
        &format!(
            r#"echo $$ > "{}"
i=0
while true; do
  echo "line $i"
  i=$((i+1))
  sleep 0.05
done"#,
            pidfile.display()
        ),
    );
    let backend = backend(binary);

    let mut stream = backend.stream_logs(JOB_UUID).await.expect("stream starts");
    assert_eq!(stream.next_line().await, Some(Ok("line 0".to_string())));
    assert_eq!(stream.next_line().await, Some(Ok("line 1".to_string())));

    let pid = fs::read_to_string(&pidfile)
        .expect("pidfile written")
        .trim()
        .to_string();
    let proc_entry = PathBuf::from(format!("/proc/{pid}"));
    assert!(proc_entry.exists());

    drop(stream);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while proc_entry.exists() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!proc_entry.exists(), "rnx process {pid} still running after cancel");
}
