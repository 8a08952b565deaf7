//! Input listener
//!
//! Binds the producer-facing port and runs a sequential accept loop: one
//! client is handled to completion before the next is accepted.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::shutdown::Shutdown;

use super::config::InputConfig;
use super::handler::{ClientContext, ClientHandler};

/// Listener state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// Not bound
    Stopped,
    /// Bound and accepting
    Listening,
    /// Last start failed
    Error,
}

/// Producer-facing TCP listener
pub struct TcpInput {
    config: InputConfig,
    inner: Mutex<Inner>,
    stopped: Notify,
    next_client_id: AtomicU64,
}

struct Inner {
    state: InputState,
    listener: Option<Arc<TcpListener>>,
}

impl TcpInput {
    /// Create a new listener in `Stopped` state
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: InputState::Stopped,
                listener: None,
            }),
            stopped: Notify::new(),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Get the listener configuration
    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Current listener state
    pub fn state(&self) -> InputState {
        self.lock().state
    }

    /// Address actually bound, while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock()
            .listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Bind and start listening
    ///
    /// No-op if already listening. An address that is already bound yields
    /// [`Error::AddressInUse`] and leaves the listener in `Error` state.
    pub async fn start(&self) -> Result<()> {
        if self.state() == InputState::Listening {
            return Ok(());
        }

        let addr = self.config.bind_addr;
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.lock().state = InputState::Error;
                tracing::error!(addr = %addr, error = %e, "Failed to start listening");
                return Err(match e.kind() {
                    io::ErrorKind::AddrInUse => Error::AddressInUse(addr),
                    _ => Error::Io(e),
                });
            }
        };

        let local = listener.local_addr().unwrap_or(addr);
        {
            let mut inner = self.lock();
            inner.listener = Some(Arc::new(listener));
            inner.state = InputState::Listening;
        }

        tracing::info!(addr = %local, "Started listening");
        Ok(())
    }

    /// Stop listening and release the socket
    ///
    /// Idempotent. A running accept loop returns.
    pub fn stop(&self) {
        let released = {
            let mut inner = self.lock();
            let released = inner.listener.take();
            inner.state = InputState::Stopped;
            released
        };

        self.stopped.notify_waiters();
        if released.is_some() {
            tracing::info!(addr = %self.config.bind_addr, "Stopped listening");
        }
    }

    /// Accept clients one at a time and run `handler` for each
    ///
    /// Returns `Ok(())` when `shutdown` fires or the listener is stopped.
    /// Accept failures are logged and the loop continues.
    pub async fn accept_loop<H: ClientHandler>(
        &self,
        handler: &H,
        shutdown: Shutdown,
    ) -> Result<()> {
        let listener = self.lock().listener.clone().ok_or(Error::NotListening)?;

        loop {
            let stopped = self.stopped.notified();
            if shutdown.is_triggered() || self.state() != InputState::Listening {
                return Ok(());
            }

            let accepted = tokio::select! {
                result = listener.accept() => result,
                _ = stopped => return Ok(()),
                _ = shutdown.wait() => return Ok(()),
            };

            match accepted {
                Ok((socket, peer_addr)) => {
                    self.handle_client(handler, socket, peer_addr, &shutdown).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client<H: ClientHandler>(
        &self,
        handler: &H,
        socket: TcpStream,
        peer_addr: SocketAddr,
        shutdown: &Shutdown,
    ) {
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(client_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        tracing::info!(client_id, peer = %peer_addr, "Client connected");
        let ctx = ClientContext {
            client_id,
            peer_addr,
        };
        handler.handle(socket, ctx, shutdown.clone()).await;
        tracing::info!(client_id, peer = %peer_addr, "Client disconnected");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TcpInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpInput")
            .field("bind_addr", &self.config.bind_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::shutdown;

    fn local_config() -> InputConfig {
        InputConfig::with_addr("127.0.0.1:0".parse().unwrap())
    }

    /// Records what each client sent, then cancels after `cancel_after` clients
    struct Recorder {
        received: StdMutex<Vec<Vec<u8>>>,
        cancel_after: usize,
        trigger: shutdown::ShutdownTrigger,
    }

    impl ClientHandler for Recorder {
        async fn handle(&self, mut stream: TcpStream, _ctx: ClientContext, _shutdown: Shutdown) {
            let mut data = Vec::new();
            stream.read_to_end(&mut data).await.unwrap();

            let mut received = self.received.lock().unwrap();
            received.push(data);
            if received.len() >= self.cancel_after {
                self.trigger.trigger();
            }
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let input = TcpInput::new(local_config());
        assert_eq!(input.state(), InputState::Stopped);
        assert!(input.local_addr().is_none());

        input.start().await.unwrap();
        assert_eq!(input.state(), InputState::Listening);
        assert!(input.local_addr().is_some());

        input.stop();
        assert_eq!(input.state(), InputState::Stopped);
        input.stop();
        assert_eq!(input.state(), InputState::Stopped);
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let first = TcpInput::new(local_config());
        first.start().await.unwrap();
        let taken = first.local_addr().unwrap();

        let second = TcpInput::new(InputConfig::with_addr(taken));
        let result = second.start().await;

        assert!(matches!(result, Err(Error::AddressInUse(addr)) if addr == taken));
        assert_eq!(second.state(), InputState::Error);
    }

    #[tokio::test]
    async fn test_accept_loop_requires_start() {
        let (_trigger, shutdown) = shutdown::channel();
        let input = TcpInput::new(local_config());
        let (trigger, _) = shutdown::channel();
        let handler = Recorder {
            received: StdMutex::new(Vec::new()),
            cancel_after: 1,
            trigger,
        };

        let result = input.accept_loop(&handler, shutdown).await;
        assert!(matches!(result, Err(Error::NotListening)));
    }

    #[tokio::test]
    async fn test_clients_are_handled_sequentially() {
        let (trigger, shutdown) = shutdown::channel();
        let input = TcpInput::new(local_config());
        input.start().await.unwrap();
        let addr = input.local_addr().unwrap();

        let handler = Recorder {
            received: StdMutex::new(Vec::new()),
            cancel_after: 2,
            trigger,
        };

        let clients = tokio::spawn(async move {
            for payload in [&b"Hallo"[..], &b"Welt"[..]] {
                let mut client = TcpStream::connect(addr).await.unwrap();
                client.write_all(payload).await.unwrap();
            }
        });

        tokio::time::timeout(Duration::from_secs(5), input.accept_loop(&handler, shutdown))
            .await
            .unwrap()
            .unwrap();
        clients.await.unwrap();

        let received = handler.received.lock().unwrap();
        assert_eq!(*received, vec![b"Hallo".to_vec(), b"Welt".to_vec()]);
        assert_eq!(input.state(), InputState::Listening);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_accept() {
        let (trigger, shutdown) = shutdown::channel();
        let input = Arc::new(TcpInput::new(local_config()));
        input.start().await.unwrap();

        let (unused, _) = shutdown::channel();
        let handler = Recorder {
            received: StdMutex::new(Vec::new()),
            cancel_after: 1,
            trigger: unused,
        };

        let looping = Arc::clone(&input);
        let task = tokio::spawn(async move { looping.accept_loop(&handler, shutdown).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stop_ends_accept_loop() {
        let (_trigger, shutdown) = shutdown::channel();
        let input = Arc::new(TcpInput::new(local_config()));
        input.start().await.unwrap();

        let (unused, _) = shutdown::channel();
        let handler = Recorder {
            received: StdMutex::new(Vec::new()),
            cancel_after: 1,
            trigger: unused,
        };

        let looping = Arc::clone(&input);
        let task = tokio::spawn(async move { looping.accept_loop(&handler, shutdown).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        input.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
