use super::command::Invocation;
use super::parse::classify_failure;
use crate::domain::{CanonicalError, LogSink, LogStream};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Captured result of a finished `rnx` process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Launches `rnx` with a cap on how many run at once.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    binary: PathBuf,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(binary: PathBuf, max_processes: usize, timeout: Duration) -> Self {
        Self {
            binary,
            permits: Arc::new(Semaphore::new(max_processes.max(1))),
            timeout,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Runs to completion, capturing stdout and stderr in full.
    pub async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, CanonicalError> {
        let _permit = self.acquire().await?;
        debug!(
            binary = %self.binary.display(),
            args = ?invocation.redacted_args(),
            "Running rnx command"
        );

        let mut child = self.spawn(invocation)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            tokio::try_join!(read_pipe(stdout), read_pipe(stderr), child.wait())
        };
        let collected = timeout(self.timeout, collect).await;

        match collected {
            Ok(Ok((stdout, stderr, status))) => {
                let output = ProcessOutput {
                    code: status.code(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                };
                debug!(
                    command = %invocation,
                    code = ?output.code,
                    stdout_bytes = output.stdout.len(),
                    "rnx command finished"
                );
                Ok(output)
            }
            Ok(Err(source)) => Err(CanonicalError::internal(format!(
                "failed to collect output of rnx {invocation}: {source}"
            ))),
            Err(_) => {
                warn!(
                    command = %invocation,
                    timeout = ?self.timeout,
                    "rnx command timed out, killing it"
                );
                if let Err(err) = child.kill().await {
                    warn!(command = %invocation, %err, "failed to kill rnx process");
                }
                Err(CanonicalError::backend_process(format!(
                    "rnx {invocation} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Spawns a long-running command and forwards stdout lines into a [`LogStream`].
    ///
    /// The concurrency permit is held until the process exits or the stream is cancelled.
    pub async fn stream(&self, invocation: &Invocation) -> Result<LogStream, CanonicalError> {
        let permit = self.acquire().await?;
        debug!(
            binary = %self.binary.display(),
            args = ?invocation.redacted_args(),
            "Streaming rnx command"
        );

        let mut child = self.spawn(invocation)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CanonicalError::internal("failed to capture rnx stdout"))?;
        let stderr = child.stderr.take();

        let (sink, stream) = LogStream::channel();
        let label = invocation.label.clone();
        tokio::spawn(async move {
            pump_lines(child, stdout, stderr, sink, label, permit).await;
        });
        Ok(stream)
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, CanonicalError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| CanonicalError::internal("process limiter closed"))
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Child, CanonicalError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command.spawn().map_err(|source| self.spawn_error(invocation, source))
    }

    fn spawn_error(&self, invocation: &Invocation, source: io::Error) -> CanonicalError {
        match source.kind() {
            io::ErrorKind::NotFound => CanonicalError::config(format!(
                "rnx binary not found at '{}'; install rnx or set RNX_BINARY",
                self.binary.display()
            )),
            io::ErrorKind::PermissionDenied => CanonicalError::config(format!(
                "rnx binary at '{}' is not executable",
                self.binary.display()
            )),
            _ => CanonicalError::internal(format!(
                "failed to launch rnx {invocation}: {source}"
            )),
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn pump_lines(
    mut child: Child,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    sink: LogSink,
    label: String,
    _permit: OwnedSemaphorePermit,
) {
    let stderr_task = tokio::spawn(async move {
        let mut collected = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut collected).await;
        }
        collected
    });

    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            _ = sink.cancelled() => {
                debug!(command = %label, "Log stream cancelled, stopping rnx");
                if let Err(err) = child.kill().await {
                    warn!(command = %label, %err, "failed to kill rnx process");
                }
                stderr_task.abort();
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !sink.send(Ok(line)).await {
                        let _ = child.kill().await;
                        stderr_task.abort();
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(command = %label, %err, "failed to read rnx output");
                    break;
                }
            },
        }
    }

    let status = tokio::select! {
        _ = sink.cancelled() => {
            let _ = child.kill().await;
            stderr_task.abort();
            return;
        }
        status = child.wait() => status,
    };
    let stderr = stderr_task.await.unwrap_or_default();

    match status {
        Ok(status) if status.success() => {
            debug!(command = %label, "rnx stream finished");
        }
        Ok(status) => {
            let error = classify_failure(&label, status.code(), &stderr, "");
            sink.send(Err(error)).await;
        }
        Err(err) => {
            sink.send(Err(CanonicalError::internal(format!(
                "failed to wait for rnx {label}: {err}"
            ))))
            .await;
        }
    }
}
