//! Per-output dispatch queue
//!
//! Each registered output gets a bounded queue drained by its own writer task,
//! so a slow or reconnecting output only ever delays itself. Chunks that do not
//! fit are dropped (drop-newest) and counted on the output.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::output::TcpOutput;
use crate::shutdown::Shutdown;

pub(crate) struct Dispatcher {
    tx: mpsc::Sender<Bytes>,
    /// Set while chunks are being dropped, so the overflow is logged once
    overflowing: AtomicBool,
}

impl Dispatcher {
    /// Spawn the writer task for `output`
    pub(crate) fn spawn(output: TcpOutput, shutdown: Shutdown) -> Self {
        let (tx, rx) = mpsc::channel(output.config().queue_capacity.max(1));
        tokio::spawn(run_writer(output, rx, shutdown));

        Self {
            tx,
            overflowing: AtomicBool::new(false),
        }
    }

    /// Queue a chunk without waiting; returns whether it was queued
    pub(crate) fn dispatch(&self, output: &TcpOutput, chunk: Bytes) -> bool {
        match self.tx.try_send(chunk) {
            Ok(()) => {
                if self.overflowing.swap(false, Ordering::Relaxed) {
                    tracing::info!(output = %output.id(), "Dispatch queue drained");
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = output.record_dropped();
                if !self.overflowing.swap(true, Ordering::Relaxed) {
                    tracing::warn!(output = %output.id(), dropped, "Dispatch queue full, dropping chunks");
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Write queued chunks in order until the queue closes or shutdown fires
async fn run_writer(output: TcpOutput, mut rx: mpsc::Receiver<Bytes>, shutdown: Shutdown) {
    loop {
        let chunk = tokio::select! {
            chunk = rx.recv() => chunk,
            _ = shutdown.wait() => None,
        };

        match chunk {
            Some(chunk) => output.write(&chunk).await,
            None => break,
        }
    }

    tracing::debug!(output = %output.id(), "Writer finished");
}
