//! Outbound TCP connection with automatic recovery
//!
//! A [`TcpOutput`] owns at most one socket to its peer. Starts dial with an
//! increasing backoff, writes reconnect implicitly, and a manual stop turns
//! all of that off until the next explicit start.
//!
//! Every start, stop and disconnect bumps an epoch. Work that was begun under
//! an older epoch (a dial, a backoff sleep, an in-flight write) notices the
//! change and discards its result, so the most recent command always wins.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::shutdown::Shutdown;

use super::config::OutputConfig;
use super::id::OutputId;
use super::state::{Machine, OutputError, OutputState, OutputStatus, Transition};

/// Outbound connection to one `(hostname, port)` peer
///
/// Cheap to clone; clones share the same connection. A pending write keeps
/// the connection alive even after the output is removed from its registry.
#[derive(Clone)]
pub struct TcpOutput {
    inner: Arc<Inner>,
}

struct Inner {
    id: OutputId,
    config: OutputConfig,
    shutdown: Shutdown,
    slot: Mutex<Slot>,
    /// Wakes dials, sleeps and writes when a stop or disconnect supersedes them
    halt: Notify,
    state_tx: watch::Sender<OutputState>,
    connect_attempts: AtomicU64,
    bytes_written: AtomicU64,
    dropped_chunks: AtomicU64,
}

struct Slot {
    machine: Machine,
    epoch: u64,
    stream: Option<TcpStream>,
    /// Epoch whose write failed and is waiting out the drain delay
    draining: Option<u64>,
}

struct DialFailure {
    class: OutputError,
    source: io::Error,
}

/// What a write is allowed to do, decided under the lock
enum Claim {
    Write(u64, TcpStream),
    Start,
    Drop(&'static str),
    Ignore,
}

impl TcpOutput {
    /// Create a new output in `Disconnected` state. Does not connect.
    pub fn new(id: OutputId, config: OutputConfig, shutdown: Shutdown) -> Self {
        let (state_tx, _) = watch::channel(OutputState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                id,
                config,
                shutdown,
                slot: Mutex::new(Slot {
                    machine: Machine::new(),
                    epoch: 0,
                    stream: None,
                    draining: None,
                }),
                halt: Notify::new(),
                state_tx,
                connect_attempts: AtomicU64::new(0),
                bytes_written: AtomicU64::new(0),
                dropped_chunks: AtomicU64::new(0),
            }),
        }
    }

    /// Get the output identity
    pub fn id(&self) -> &OutputId {
        &self.inner.id
    }

    /// Get the output configuration
    pub fn config(&self) -> &OutputConfig {
        &self.inner.config
    }

    /// Current connection state
    pub fn state(&self) -> OutputState {
        self.lock().machine.state()
    }

    /// Current error classification
    pub fn error(&self) -> OutputError {
        self.lock().machine.error()
    }

    /// Whether an error is currently recorded
    pub fn has_error(&self) -> bool {
        self.error() != OutputError::NoError
    }

    /// Whether the output was manually stopped
    pub fn is_stopped(&self) -> bool {
        self.state() == OutputState::Stopped
    }

    /// Human-readable state message
    pub fn status_message(&self) -> &'static str {
        self.state().message()
    }

    /// Human-readable error message
    pub fn error_message(&self) -> &'static str {
        self.error().message()
    }

    /// Dial attempts made since creation
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::Relaxed)
    }

    /// Bytes written since creation
    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written.load(Ordering::Relaxed)
    }

    /// Snapshot of state, error and counters
    pub fn status(&self) -> OutputStatus {
        let machine = self.lock().machine;

        OutputStatus {
            id: self.inner.id.clone(),
            state: machine.state(),
            error: machine.error(),
            status_message: machine.state().message(),
            error_message: machine.error().message(),
            connect_attempts: self.connect_attempts(),
            bytes_written: self.bytes_written(),
            dropped_chunks: self.inner.dropped_chunks.load(Ordering::Relaxed),
        }
    }

    /// Subscribe to state changes
    pub fn watch_state(&self) -> watch::Receiver<OutputState> {
        self.inner.state_tx.subscribe()
    }

    /// Count one chunk dropped before reaching this output; returns the new total
    pub(crate) fn record_dropped(&self) -> u64 {
        self.inner.dropped_chunks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Connect to the peer
    ///
    /// Returns `true` once connected, or immediately if already connecting or
    /// connected. Returns `false` when every attempt failed, the host could
    /// not be resolved, or the start was superseded by a stop, disconnect or
    /// shutdown.
    pub async fn start(&self) -> bool {
        match self.begin_start(None) {
            Some(epoch) => self.connect(epoch).await,
            None => true,
        }
    }

    /// Run [`start`](Self::start) on a background task
    pub fn spawn_start(&self) -> JoinHandle<bool> {
        let output = self.clone();
        tokio::spawn(async move { output.start().await })
    }

    /// Close the socket and enter `Stopped`
    ///
    /// No-op if already stopped. A stopped output ignores writes.
    pub fn stop(&self) {
        let (transition, stream) = {
            let mut slot = self.lock();
            if slot.machine.state() == OutputState::Stopped {
                return;
            }
            slot.epoch += 1;
            let stream = slot.stream.take();
            let transition = slot.machine.stopped();
            self.publish(&transition);
            (transition, stream)
        };

        drop(stream);
        self.inner.halt.notify_waiters();
        self.log_transition(&transition);
    }

    /// Close the socket and enter `Disconnected`
    ///
    /// Unlike [`stop`](Self::stop), the output stays eligible for automatic
    /// restart.
    pub fn disconnect(&self) {
        let (transition, stream) = {
            let mut slot = self.lock();
            slot.epoch += 1;
            let stream = slot.stream.take();
            let transition = slot.machine.disconnected();
            self.publish(&transition);
            (transition, stream)
        };

        drop(stream);
        self.inner.halt.notify_waiters();
        self.log_transition(&transition);
    }

    /// Write a chunk to the peer
    ///
    /// Stopped outputs ignore the call. Any other output that is not connected
    /// drops the chunk, and a disconnected one starts connecting in the
    /// background. On a failed write the output disconnects, and a background
    /// task waits the drain delay, then starts again; chunks arriving during
    /// the drain are dropped.
    pub async fn write(&self, data: &[u8]) {
        let (epoch, mut stream) = match self.claim() {
            Claim::Write(epoch, stream) => (epoch, stream),
            Claim::Start => {
                let dropped = self.record_dropped();
                tracing::debug!(output = %self.inner.id, dropped, "Not connected, chunk dropped");
                self.spawn_start();
                return;
            }
            Claim::Drop(reason) => {
                let dropped = self.record_dropped();
                tracing::trace!(output = %self.inner.id, reason, dropped, "Chunk dropped");
                return;
            }
            Claim::Ignore => return,
        };

        let Some(result) = self.guarded(epoch, stream.write_all(data)).await else {
            self.settle(epoch, Machine::interrupted);
            return;
        };

        match result {
            Ok(()) => {
                self.inner
                    .bytes_written
                    .fetch_add(data.len() as u64, Ordering::Relaxed);

                let mut slot = self.lock();
                if slot.epoch == epoch && slot.machine.state() == OutputState::Connected {
                    slot.stream = Some(stream);
                }
            }
            Err(e) => {
                drop(stream);
                let class = OutputError::classify(&e, OutputError::IOError);
                tracing::debug!(output = %self.inner.id, error = %e, "Write failed");

                let transition = {
                    let mut slot = self.lock();
                    if slot.epoch != epoch {
                        return;
                    }
                    slot.draining = Some(epoch);
                    let transition = slot.machine.write_failed(class);
                    self.publish(&transition);
                    transition
                };

                self.log_transition(&transition);
                self.spawn_recovery(epoch);
            }
        }
    }

    /// Wait the drain delay, then start again unless superseded
    fn spawn_recovery(&self, epoch: u64) {
        let output = self.clone();
        tokio::spawn(async move {
            let drain = output.inner.config.drain_delay;
            if output.guarded(epoch, tokio::time::sleep(drain)).await.is_none() {
                return;
            }

            if let Some(epoch) = output.begin_start(Some(epoch)) {
                output.connect(epoch).await;
            }
        });
    }

    fn claim(&self) -> Claim {
        let mut slot = self.lock();
        let epoch = slot.epoch;
        match slot.machine.state() {
            OutputState::Stopped => Claim::Ignore,
            OutputState::Connecting => Claim::Drop("connecting"),
            OutputState::Disconnected if slot.draining == Some(epoch) => Claim::Drop("draining"),
            OutputState::Disconnected => Claim::Start,
            OutputState::Connected => match slot.stream.take() {
                Some(stream) => Claim::Write(epoch, stream),
                None => Claim::Drop("write in flight"),
            },
        }
    }

    /// Enter `Connecting` under a new epoch
    ///
    /// With `expected`, only proceeds if no command has superseded that epoch.
    fn begin_start(&self, expected: Option<u64>) -> Option<u64> {
        let (epoch, transition) = {
            let mut slot = self.lock();
            if !slot.machine.can_start() {
                return None;
            }
            if expected.is_some_and(|epoch| epoch != slot.epoch) {
                return None;
            }
            slot.epoch += 1;
            slot.stream = None;
            slot.draining = None;
            let transition = slot.machine.begin_connect();
            self.publish(&transition);
            (slot.epoch, transition)
        };

        // Older dials and drain sleeps give up
        self.inner.halt.notify_waiters();
        self.log_transition(&transition);
        Some(epoch)
    }

    async fn connect(&self, epoch: u64) -> bool {
        let max_tries = self.inner.config.max_connect_tries;

        for attempt in 1..=max_tries {
            self.inner.connect_attempts.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(output = %self.inner.id, attempt, max_tries, "Dialing");

            let Some(result) = self.guarded(epoch, self.dial()).await else {
                self.settle(epoch, Machine::interrupted);
                return false;
            };

            match result {
                Ok(stream) => return self.install(epoch, stream),
                Err(failure) if !failure.class.is_retryable() => {
                    tracing::debug!(output = %self.inner.id, error = %failure.source, "Name resolution failed");
                    self.settle(epoch, Machine::host_not_found);
                    return false;
                }
                Err(failure) => {
                    tracing::debug!(output = %self.inner.id, attempt, error = %failure.source, "Dial failed");
                    if !self.settle(epoch, |machine| machine.attempt_failed(failure.class)) {
                        return false;
                    }
                }
            }

            if attempt < max_tries {
                let delay = self.inner.config.backoff_delay(attempt);
                if self.guarded(epoch, tokio::time::sleep(delay)).await.is_none() {
                    self.settle(epoch, Machine::interrupted);
                    return false;
                }
            }
        }

        tracing::info!(output = %self.inner.id, "Failed to connect after {} tries", max_tries);
        self.settle(epoch, Machine::exhausted);
        false
    }

    async fn dial(&self) -> Result<TcpStream, DialFailure> {
        let id = &self.inner.id;

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((id.hostname.as_str(), id.port))
            .await
            .map_err(|source| DialFailure {
                class: OutputError::HostNotFound,
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(DialFailure {
                class: OutputError::HostNotFound,
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
            });
        }

        let connect = TcpStream::connect(addrs.as_slice());
        let result = match self.inner.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(DialFailure {
                        class: OutputError::Timeout,
                        source: io::ErrorKind::TimedOut.into(),
                    })
                }
            },
            None => connect.await,
        };

        result.map_err(|source| DialFailure {
            class: OutputError::classify(&source, OutputError::Unknown),
            source,
        })
    }

    fn install(&self, epoch: u64, stream: TcpStream) -> bool {
        if self.inner.config.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(output = %self.inner.id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let transition = {
            let mut slot = self.lock();
            if slot.epoch != epoch {
                return false;
            }
            slot.stream = Some(stream);
            let transition = slot.machine.connected();
            self.publish(&transition);
            transition
        };

        self.log_transition(&transition);
        true
    }

    /// Run `fut` unless superseded by a newer epoch or shutdown
    async fn guarded<F: Future>(&self, epoch: u64, fut: F) -> Option<F::Output> {
        let halted = self.inner.halt.notified();
        if self.lock().epoch != epoch || self.inner.shutdown.is_triggered() {
            return None;
        }

        tokio::select! {
            out = fut => Some(out),
            _ = halted => None,
            _ = self.inner.shutdown.wait() => None,
        }
    }

    /// Apply a transition if `epoch` is still current; returns whether it was
    fn settle(&self, epoch: u64, apply: impl FnOnce(&mut Machine) -> Transition) -> bool {
        let transition = {
            let mut slot = self.lock();
            if slot.epoch != epoch {
                return false;
            }
            let transition = apply(&mut slot.machine);
            self.publish(&transition);
            transition
        };

        self.log_transition(&transition);
        true
    }

    fn publish(&self, transition: &Transition) {
        self.inner.state_tx.send_if_modified(|state| {
            if *state == transition.to {
                false
            } else {
                *state = transition.to;
                true
            }
        });
    }

    fn log_transition(&self, transition: &Transition) {
        if transition.changed() {
            tracing::info!(
                output = %self.inner.id,
                from = ?transition.from,
                to = ?transition.to,
                "{}",
                transition.message()
            );
        }
        if let Some(error) = transition.failure {
            tracing::error!(output = %self.inner.id, error = ?error, "{}", error.message());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TcpOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let machine = self.lock().machine;
        f.debug_struct("TcpOutput")
            .field("id", &self.inner.id)
            .field("state", &machine.state())
            .field("error", &machine.error())
            .finish()
    }
}

impl std::fmt::Display for TcpOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner.id, f)
    }
}
