//! Router manager
//!
//! Owns the input listener and the ordered registry of outputs, and fans
//! every chunk from the input out to all outputs that are not stopped.

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::input::{InputConfig, TcpInput};
use crate::output::{OutputConfig, OutputId, OutputState, OutputStatus, TcpOutput};
use crate::shutdown::Shutdown;

use super::dispatch::Dispatcher;

struct OutputEntry {
    output: TcpOutput,
    dispatcher: Dispatcher,
}

/// Registry of outputs plus the one input
///
/// Thread-safe via `RwLock`. The lock is never held across socket I/O:
/// fan-out only enqueues, and each output writes from its own task.
pub struct RouterManager {
    input: TcpInput,
    outputs: RwLock<Vec<OutputEntry>>,
    output_config: OutputConfig,
    shutdown: Shutdown,
}

impl RouterManager {
    /// Create a manager with no outputs
    pub fn new(input_config: InputConfig, output_config: OutputConfig, shutdown: Shutdown) -> Self {
        Self {
            input: TcpInput::new(input_config),
            outputs: RwLock::new(Vec::new()),
            output_config,
            shutdown,
        }
    }

    /// Get the input listener
    pub fn input(&self) -> &TcpInput {
        &self.input
    }

    /// Get the configuration applied to new outputs
    pub fn output_config(&self) -> &OutputConfig {
        &self.output_config
    }

    /// Register a new output in `Disconnected` state
    ///
    /// Does not connect. Returns [`Error::DuplicateOutput`] if an output with
    /// the same hostname and port is already registered.
    pub async fn add_output(&self, hostname: impl Into<String>, port: u16) -> Result<TcpOutput> {
        let id = OutputId::new(hostname, port);
        let mut outputs = self.outputs.write().await;

        if outputs.iter().any(|entry| entry.output.id() == &id) {
            tracing::warn!(output = %id, "Output not added, already added");
            return Err(Error::DuplicateOutput(id));
        }

        let output = TcpOutput::new(id, self.output_config.clone(), self.shutdown.clone());
        let dispatcher = Dispatcher::spawn(output.clone(), self.shutdown.clone());
        outputs.push(OutputEntry {
            output: output.clone(),
            dispatcher,
        });

        tracing::info!(output = %output.id(), outputs = outputs.len(), "Added output");
        Ok(output)
    }

    /// Register every target, skipping duplicates; returns how many were added
    pub async fn add_targets(&self, targets: &[OutputId]) -> usize {
        let mut added = 0;
        for target in targets {
            if self.add_output(target.hostname.clone(), target.port).await.is_ok() {
                added += 1;
            }
        }
        added
    }

    /// Remove and release an output; returns whether it was registered
    ///
    /// A write already in flight to the output finishes against the released
    /// connection without affecting other outputs.
    pub async fn remove_output(&self, id: &OutputId) -> bool {
        let removed = {
            let mut outputs = self.outputs.write().await;
            outputs
                .iter()
                .position(|entry| entry.output.id() == id)
                .map(|index| outputs.remove(index))
        };

        match removed {
            Some(entry) => {
                entry.output.stop();
                tracing::info!(output = %id, "Removed output");
                true
            }
            None => false,
        }
    }

    /// Look up an output by identity
    pub async fn output(&self, id: &OutputId) -> Option<TcpOutput> {
        self.outputs
            .read()
            .await
            .iter()
            .find(|entry| entry.output.id() == id)
            .map(|entry| entry.output.clone())
    }

    /// All outputs in insertion order
    pub async fn outputs(&self) -> Vec<TcpOutput> {
        self.outputs
            .read()
            .await
            .iter()
            .map(|entry| entry.output.clone())
            .collect()
    }

    /// Status of every output in insertion order
    pub async fn statuses(&self) -> Vec<OutputStatus> {
        self.outputs
            .read()
            .await
            .iter()
            .map(|entry| entry.output.status())
            .collect()
    }

    /// Check if an output is registered
    pub async fn contains(&self, id: &OutputId) -> bool {
        self.output(id).await.is_some()
    }

    /// Number of registered outputs
    pub async fn len(&self) -> usize {
        self.outputs.read().await.len()
    }

    /// Whether no outputs are registered
    pub async fn is_empty(&self) -> bool {
        self.outputs.read().await.is_empty()
    }

    /// Start every `Disconnected` output
    ///
    /// Connecting, connected and stopped outputs are left alone. Each start
    /// runs on its own task; the handles resolve to the start results.
    pub async fn start_all(&self) -> Vec<JoinHandle<bool>> {
        let pending = self.in_state(OutputState::Disconnected).await;
        tracing::info!(count = pending.len(), "Starting all disconnected outputs");

        pending.iter().map(TcpOutput::spawn_start).collect()
    }

    /// Disconnect every `Connected` output; returns how many were disconnected
    pub async fn disconnect_all(&self) -> usize {
        let connected = self.in_state(OutputState::Connected).await;
        tracing::info!(count = connected.len(), "Disconnecting all connected outputs");

        for output in &connected {
            output.disconnect();
        }
        connected.len()
    }

    /// Stop one output; returns whether it was found
    pub async fn stop_output(&self, id: &OutputId) -> bool {
        match self.output(id).await {
            Some(output) => {
                tracing::info!(output = %id, "Stopping output");
                output.stop();
                true
            }
            None => false,
        }
    }

    /// Start one output, including a manually stopped one
    ///
    /// Returns `None` if no such output is registered.
    pub async fn start_output(&self, id: &OutputId) -> Option<JoinHandle<bool>> {
        let output = self.output(id).await?;
        tracing::info!(output = %id, state = ?output.state(), "Starting output");
        Some(output.spawn_start())
    }

    /// Fan a chunk out to every output that is not stopped
    ///
    /// Returns once the chunk is queued for each output; returns the number
    /// of outputs it was queued for.
    pub async fn write_all(&self, chunk: Bytes) -> usize {
        let outputs = self.outputs.read().await;
        let mut queued = 0;

        for entry in outputs.iter() {
            if entry.output.is_stopped() {
                continue;
            }
            if entry.dispatcher.dispatch(&entry.output, chunk.clone()) {
                queued += 1;
            }
        }

        tracing::debug!(bytes = chunk.len(), queued, "Chunk dispatched");
        queued
    }

    /// Stop the input and release every output
    pub async fn close(&self) {
        self.input.stop();

        let entries: Vec<OutputEntry> = self.outputs.write().await.drain(..).collect();
        for entry in &entries {
            entry.output.stop();
        }

        tracing::info!(outputs = entries.len(), "Router manager closed");
    }

    async fn in_state(&self, state: OutputState) -> Vec<TcpOutput> {
        self.outputs
            .read()
            .await
            .iter()
            .filter(|entry| entry.output.state() == state)
            .map(|entry| entry.output.clone())
            .collect()
    }
}
