use super::error::CanonicalError;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lines buffered between a producing adapter and the consumer before the producer waits.
pub const LOG_BUFFER: usize = 256;

pub type LogItem = Result<String, CanonicalError>;

/// Consumer side of a log stream. Dropping it cancels the producer.
#[derive(Debug)]
pub struct LogStream {
    rx: mpsc::Receiver<LogItem>,
    cancel: CancellationToken,
}

/// Producer side handed to the adapter that owns the underlying process or RPC call.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::Sender<LogItem>,
    cancel: CancellationToken,
}

impl LogStream {
    pub fn channel() -> (LogSink, LogStream) {
        Self::with_capacity(LOG_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> (LogSink, LogStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        (
            LogSink {
                tx,
                cancel: cancel.clone(),
            },
            LogStream { rx, cancel },
        )
    }

    /// Next line, or `None` once the producer has finished.
    pub async fn next_line(&mut self) -> Option<LogItem> {
        self.rx.recv().await
    }

    /// Ask the producer to stop. Lines already buffered can still be drained.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for LogStream {
    type Item = LogItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl LogSink {
    /// Delivers one item. Returns `false` once the consumer is gone or has cancelled,
    /// which is the producer's cue to release its resources.
    pub async fn send(&self, item: LogItem) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
