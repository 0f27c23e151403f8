//! Row streaming for unbuffered results.
//!
//! A producer task owns the connection while it reads a result off the wire
//! and hands rows over a bounded channel. The blocking side pulls one event at
//! a time, so at most [`STREAM_BUFFER`] rows sit between the socket and the
//! caller.

use std::future::Future;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ColumnInfo, DriverError, Value};

/// Rows the producer may read ahead of the caller.
pub(crate) const STREAM_BUFFER: usize = 32;

/// One step of a streamed result.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    /// Column metadata, sent before the first row.
    Columns(Vec<ColumnInfo>),
    Row(Vec<Value>),
    /// The result ended.
    Done { affected_rows: u64, insert_id: u64 },
    Failed(DriverError),
}

/// Producer half. Once the reader is gone further sends are dropped, so the
/// producer can keep draining the wire without anyone listening.
pub(crate) struct EventSender {
    tx: mpsc::Sender<StreamEvent>,
    open: bool,
}

impl EventSender {
    /// Sends `event`, returning false once the reader has gone away.
    pub(crate) async fn send(&mut self, event: StreamEvent) -> bool {
        if self.open && self.tx.send(event).await.is_err() {
            self.open = false;
        }
        self.open
    }
}

/// Reader half, paired with the producer task that returns `T` when done.
#[derive(Debug)]
pub(crate) struct EventStream<T> {
    rx: Option<mpsc::Receiver<StreamEvent>>,
    task: JoinHandle<T>,
}

impl<T: Send + 'static> EventStream<T> {
    /// Spawns `producer` on `runtime`. It only makes progress while the
    /// runtime is driven by [`next`](Self::next) or [`finish`](Self::finish).
    pub(crate) fn spawn<F, Fut>(runtime: &Runtime, producer: F) -> Self
    where
        F: FnOnce(EventSender) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let task = runtime.spawn(producer(EventSender { tx, open: true }));
        Self { rx: Some(rx), task }
    }

    /// Waits for the next event; `None` once the producer has stopped sending.
    pub(crate) fn next(&mut self, runtime: &Runtime) -> Option<StreamEvent> {
        let rx = self.rx.as_mut()?;
        runtime.block_on(rx.recv())
    }

    /// Stops listening and waits for the producer to finish. `None` if the task panicked.
    pub(crate) fn finish(mut self, runtime: &Runtime) -> Option<T> {
        self.rx = None;
        runtime.block_on(self.task).ok()
    }
}
