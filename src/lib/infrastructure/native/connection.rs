use super::errors::RpcError;
use super::tls::{BoxedStream, Connector};
use crate::domain::stream::LOG_BUFFER;
use crate::domain::{CanonicalError, LogSink, LogStream};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const LOG_LINE_METHOD: &str = "job.logs.line";
pub const CANCEL_METHOD: &str = "$/cancelRequest";

type Responder = oneshot::Sender<Result<Value, RpcError>>;

/// One logical connection to joblet, shared by every concurrent caller.
///
/// Requests are correlated by id, so responses may arrive in any order.
/// The transport is opened on first use and reopened after a failure.
#[derive(Clone)]
pub struct RpcConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    connector: Arc<dyn Connector>,
    session: AsyncMutex<Option<Session>>,
    pending: AsyncMutex<HashMap<String, Responder>>,
    streams: AsyncMutex<HashMap<String, Relay>>,
    id_counter: AtomicU64,
    generation: AtomicU64,
    request_timeout: Duration,
}

/// Log lines waiting for a stream forwarder. Lines beyond the buffer are
/// dropped so a slow consumer never stalls the shared reader loop.
struct Relay {
    lines: mpsc::Sender<String>,
    dropped: u64,
}

struct Session {
    writer: BufWriter<WriteHalf<BoxedStream>>,
    generation: u64,
    reader: JoinHandle<()>,
}

impl RpcConnection {
    pub fn new(connector: Arc<dyn Connector>, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                connector,
                session: AsyncMutex::new(None),
                pending: AsyncMutex::new(HashMap::new()),
                streams: AsyncMutex::new(HashMap::new()),
                id_counter: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                request_timeout,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.inner.connector.endpoint()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.session.lock().await.is_some()
    }

    /// Sends one request and waits for its response.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CanonicalError> {
        self.inner.ensure_connected().await?;
        self.inner.send_request(method, params).await.map_err(Into::into)
    }

    /// Starts a streaming request whose notifications become log lines.
    pub async fn stream(&self, method: &str, params: Value) -> Result<LogStream, CanonicalError> {
        self.inner.ensure_connected().await?;
        let (id, relay, done) = self.inner.open_stream(method, params).await?;
        let (sink, stream) = LogStream::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.forward_stream(id, relay, done, sink).await;
        });
        Ok(stream)
    }

    /// Drops the transport and fails everything still in flight.
    pub async fn close(&self) {
        let session = self.inner.session.lock().await.take();
        if let Some(mut session) = session {
            session.reader.abort();
            let _ = session.writer.shutdown().await;
            info!(endpoint = %self.endpoint(), "Closed joblet connection");
        }
        self.inner.fail_all_pending("connection closed").await;
    }
}

impl ConnectionInner {
    async fn ensure_connected(self: &Arc<Self>) -> Result<(), RpcError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let stream = self.connector.connect().await?;
        let (reader, writer) = tokio::io::split(stream);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let reader_self = Arc::clone(self);
        let reader = tokio::spawn(async move {
            reader_self.reader_loop(reader, generation).await;
        });

        *session = Some(Session {
            writer: BufWriter::new(writer),
            generation,
            reader,
        });
        info!(endpoint = %self.connector.endpoint(), generation, "Connected to joblet");
        Ok(())
    }

    async fn reader_loop(self: Arc<Self>, reader: ReadHalf<BoxedStream>, generation: u64) {
        let mut lines = BufReader::new(reader).lines();
        let reason = loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(value) => self.process_inbound_message(value).await,
                        Err(source) => {
                            warn!(
                                endpoint = %self.connector.endpoint(),
                                line = trimmed,
                                %source,
                                "received invalid JSON from joblet"
                            );
                        }
                    }
                }
                Ok(None) => break "connection closed by peer".to_string(),
                Err(err) => break err.to_string(),
            }
        };

        self.reset(generation, &reason).await;
    }

    async fn process_inbound_message(&self, value: Value) {
        match value.get("method").and_then(Value::as_str) {
            Some(LOG_LINE_METHOD) => self.handle_log_line(&value).await,
            Some(method) => {
                debug!(
                    endpoint = %self.connector.endpoint(),
                    method,
                    "ignoring unsolicited message from joblet"
                );
            }
            None => {
                if let Some(id) = value.get("id") {
                    self.handle_response(id, &value).await;
                }
            }
        }
    }

    async fn handle_log_line(&self, value: &Value) {
        let params = value.get("params");
        let request = params
            .and_then(|params| params.get("request"))
            .and_then(response_key);
        let line = params
            .and_then(|params| params.get("line"))
            .and_then(Value::as_str);
        let (Some(request), Some(line)) = (request, line) else {
            warn!(endpoint = %self.connector.endpoint(), "malformed log notification");
            return;
        };
        let mut streams = self.streams.lock().await;
        if let Some(relay) = streams.get_mut(&request) {
            if let Err(TrySendError::Full(_)) = relay.lines.try_send(line.to_string()) {
                if relay.dropped == 0 {
                    warn!(
                        endpoint = %self.connector.endpoint(),
                        request = %request,
                        "log consumer is behind, dropping lines"
                    );
                }
                relay.dropped += 1;
            }
        }
    }

    async fn end_relay(&self, id: &str) {
        let relay = self.streams.lock().await.remove(id);
        if let Some(relay) = relay.filter(|relay| relay.dropped > 0) {
            warn!(
                endpoint = %self.connector.endpoint(),
                request = id,
                dropped = relay.dropped,
                "log stream ended with dropped lines"
            );
        }
    }

    async fn handle_response(&self, id: &Value, value: &Value) {
        let Some(key) = response_key(id) else {
            return;
        };

        // Ending the relay first lets the stream forwarder drain every line before the result.
        self.end_relay(&key).await;
        let responder = self.pending.lock().await.remove(&key);

        let Some(sender) = responder else {
            debug!(
                endpoint = %self.connector.endpoint(),
                response_id = key,
                "received response for unknown request"
            );
            return;
        };

        let outcome = match value.get("error") {
            Some(error) => Err(RpcError::Remote {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data: error.get("data").cloned(),
            }),
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = sender.send(outcome);
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(err) = self.write_request(&id, method, params).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(self.transport_error("request abandoned")),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    seconds: self.request_timeout.as_secs(),
                })
            }
        }
    }

    async fn open_stream(
        &self,
        method: &str,
        params: Value,
    ) -> Result<
        (
            String,
            mpsc::Receiver<String>,
            oneshot::Receiver<Result<Value, RpcError>>,
        ),
        RpcError,
    > {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        let (relay_tx, relay_rx) = mpsc::channel(LOG_BUFFER);
        self.streams.lock().await.insert(
            id.clone(),
            Relay {
                lines: relay_tx,
                dropped: 0,
            },
        );
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(err) = self.write_request(&id, method, params).await {
            self.forget(&id).await;
            return Err(err);
        }
        Ok((id, relay_rx, rx))
    }

    async fn forward_stream(
        &self,
        id: String,
        mut relay: mpsc::Receiver<String>,
        mut done: oneshot::Receiver<Result<Value, RpcError>>,
        sink: LogSink,
    ) {
        let mut relay_open = true;
        loop {
            tokio::select! {
                _ = sink.cancelled() => {
                    self.cancel_request(&id).await;
                    return;
                }
                line = relay.recv(), if relay_open => match line {
                    Some(line) => {
                        if !sink.send(Ok(line)).await {
                            self.cancel_request(&id).await;
                            return;
                        }
                    }
                    None => relay_open = false,
                },
                outcome = &mut done => {
                    while let Ok(line) = relay.try_recv() {
                        if !sink.send(Ok(line)).await {
                            return;
                        }
                    }
                    let failure = match outcome {
                        Ok(Ok(_)) => None,
                        Ok(Err(err)) => Some(CanonicalError::from(err)),
                        Err(_) => Some(CanonicalError::connection("log stream abandoned")),
                    };
                    if let Some(failure) = failure {
                        sink.send(Err(failure)).await;
                    }
                    return;
                }
            }
        }
    }

    /// Tells joblet to stop a streaming request and drops local state for it.
    async fn cancel_request(&self, id: &str) {
        self.forget(id).await;
        debug!(endpoint = %self.connector.endpoint(), request = id, "Cancelling stream");
        let payload = json!({
            "jsonrpc": "2.0",
            "method": CANCEL_METHOD,
            "params": { "id": id },
        });
        if let Err(err) = self.write_message(&payload).await {
            debug!(%err, "could not deliver cancellation");
        }
    }

    async fn forget(&self, id: &str) {
        self.end_relay(id).await;
        self.pending.lock().await.remove(id);
    }

    async fn write_request(&self, id: &str, method: &str, params: Value) -> Result<(), RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(endpoint = %self.connector.endpoint(), request = id, method, "Sending request");
        self.write_message(&payload).await
    }

    async fn write_message(&self, message: &Value) -> Result<(), RpcError> {
        let mut encoded = serde_json::to_string(message).map_err(|err| RpcError::Encode {
            method: message
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            message: err.to_string(),
        })?;
        encoded.push('\n');

        let (generation, result) = {
            let mut session = self.session.lock().await;
            let session = session
                .as_mut()
                .ok_or_else(|| self.transport_error("not connected"))?;
            let result = async {
                session.writer.write_all(encoded.as_bytes()).await?;
                session.writer.flush().await
            }
            .await;
            (session.generation, result)
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                let message = err.to_string();
                self.reset(generation, &message).await;
                Err(self.transport_error(message))
            }
        }
    }

    /// Tears down the session if it is still the one that failed.
    async fn reset(&self, generation: u64, reason: &str) {
        let stale = {
            let mut session = self.session.lock().await;
            match session.as_ref() {
                Some(current) if current.generation == generation => session.take(),
                _ => None,
            }
        };
        let Some(stale) = stale else {
            return;
        };
        drop(stale.writer);
        warn!(
            endpoint = %self.connector.endpoint(),
            generation,
            reason,
            "joblet connection lost; next call reconnects"
        );
        self.fail_all_pending(reason).await;
    }

    async fn fail_all_pending(&self, reason: &str) {
        self.streams.lock().await.clear();
        let mut pending = self.pending.lock().await;
        for (_, responder) in pending.drain() {
            let _ = responder.send(Err(self.transport_error(reason)));
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("req-{id}")
    }

    fn transport_error(&self, message: impl Into<String>) -> RpcError {
        RpcError::Transport {
            endpoint: self.connector.endpoint().to_string(),
            message: message.into(),
        }
    }
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
