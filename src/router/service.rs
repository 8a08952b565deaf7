//! Router driver
//!
//! Runs the input accept loop and pumps every chunk from the connected
//! producer into the manager's fan-out. Outputs are started when a producer
//! connects and disconnected when it leaves.

use std::sync::Arc;

use tokio::net::TcpStream;

use crate::error::Result;
use crate::input::{relay_chunks, ClientContext, ClientHandler};
use crate::shutdown::Shutdown;

use super::manager::RouterManager;

/// Drives a [`RouterManager`] until shutdown
pub struct RouterService {
    manager: Arc<RouterManager>,
}

impl RouterService {
    pub fn new(manager: Arc<RouterManager>) -> Self {
        Self { manager }
    }

    /// Get the driven manager
    pub fn manager(&self) -> &Arc<RouterManager> {
        &self.manager
    }

    /// Start the input and relay producers until `shutdown` fires or the
    /// input is stopped
    ///
    /// A bind failure is returned before any client is accepted. On return
    /// the input is stopped and every connected output is disconnected.
    pub async fn run(&self, shutdown: Shutdown) -> Result<()> {
        let input = self.manager.input();
        input.start().await?;

        let handler = RelayHandler {
            manager: Arc::clone(&self.manager),
        };
        let result = input.accept_loop(&handler, shutdown).await;

        input.stop();
        self.manager.disconnect_all().await;
        tracing::info!("Router stopped");

        result
    }
}

/// Relays one producer connection into the fan-out
struct RelayHandler {
    manager: Arc<RouterManager>,
}

impl ClientHandler for RelayHandler {
    async fn handle(&self, mut stream: TcpStream, ctx: ClientContext, shutdown: Shutdown) {
        let manager: &RouterManager = &self.manager;
        manager.start_all().await;

        let chunk_size = manager.input().config().read_chunk_size;
        let relayed = relay_chunks(&mut stream, chunk_size, &shutdown, move |chunk| async move {
            manager.write_all(chunk).await;
        })
        .await;

        match relayed {
            Ok(bytes) => {
                tracing::info!(client_id = ctx.client_id, bytes, "Producer stream ended");
            }
            Err(e) => {
                tracing::warn!(client_id = ctx.client_id, error = %e, "Producer read failed");
            }
        }

        manager.disconnect_all().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::Error;
    use crate::input::{InputConfig, InputState};
    use crate::output::{OutputConfig, OutputState, TcpOutput};
    use crate::shutdown::{self, ShutdownTrigger};

    struct Harness {
        service: Arc<RouterService>,
        trigger: ShutdownTrigger,
        shutdown: Shutdown,
    }

    async fn harness() -> Harness {
        // Reserve an ephemeral port for the input
        let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = reserved.local_addr().unwrap();
        drop(reserved);

        let (trigger, shutdown) = shutdown::channel();
        let output_config = OutputConfig::default()
            .backoff_step(Duration::from_secs(60))
            .drain_delay(Duration::from_millis(20));
        let manager = RouterManager::new(InputConfig::with_addr(addr), output_config, shutdown.clone());

        Harness {
            service: Arc::new(RouterService::new(Arc::new(manager))),
            trigger,
            shutdown,
        }
    }

    async fn wait_for_state(output: &TcpOutput, state: OutputState) {
        let mut rx = output.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached")
            .unwrap();
    }

    async fn wait_for_listening(service: &RouterService) -> std::net::SocketAddr {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(addr) = service.manager().input().local_addr() {
                    return addr;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_relays_hallo_end_to_end() {
        let h = harness().await;
        let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_port = peer.local_addr().unwrap().port();
        let output = h.service.manager().add_output("127.0.0.1", peer_port).await.unwrap();

        let service = Arc::clone(&h.service);
        let shutdown = h.shutdown.clone();
        let running = tokio::spawn(async move { service.run(shutdown).await });
        let input_addr = wait_for_listening(&h.service).await;

        let mut client = TcpStream::connect(input_addr).await.unwrap();
        wait_for_state(&output, OutputState::Connected).await;
        let (mut downstream, _) = peer.accept().await.unwrap();

        client.write_all(b"Hallo").await.unwrap();

        let mut received = [0u8; 5];
        tokio::time::timeout(Duration::from_secs(2), downstream.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&received, b"Hallo");

        // Producer leaves: outputs are disconnected and the peer sees EOF
        drop(client);
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), downstream.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());
        wait_for_state(&output, OutputState::Disconnected).await;
        assert_eq!(output.bytes_written(), 5);

        h.trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_live_output_unaffected_by_failing_one() {
        let h = harness().await;
        let refused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let refused_port = refused.local_addr().unwrap().port();
        drop(refused);

        let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_port = peer.local_addr().unwrap().port();

        let manager = h.service.manager();
        let failing = manager.add_output("127.0.0.1", refused_port).await.unwrap();
        let live = manager.add_output("127.0.0.1", peer_port).await.unwrap();

        let service = Arc::clone(&h.service);
        let shutdown = h.shutdown.clone();
        let running = tokio::spawn(async move { service.run(shutdown).await });
        let input_addr = wait_for_listening(&h.service).await;

        let mut client = TcpStream::connect(input_addr).await.unwrap();
        wait_for_state(&live, OutputState::Connected).await;
        let (mut downstream, _) = peer.accept().await.unwrap();

        client.write_all(b"X").await.unwrap();

        let mut received = [0u8; 1];
        tokio::time::timeout(Duration::from_secs(1), downstream.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&received, b"X");
        assert_ne!(failing.state(), OutputState::Connected);

        h.trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_service() {
        let h = harness().await;

        let service = Arc::clone(&h.service);
        let shutdown = h.shutdown.clone();
        let running = tokio::spawn(async move { service.run(shutdown).await });
        wait_for_listening(&h.service).await;

        h.trigger.trigger();
        let result = tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(h.service.manager().input().state(), InputState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let (_trigger, shutdown) = shutdown::channel();
        let manager = RouterManager::new(
            InputConfig::with_addr(addr),
            OutputConfig::default(),
            shutdown.clone(),
        );
        let service = RouterService::new(Arc::new(manager));

        let result = service.run(shutdown).await;
        assert!(matches!(result, Err(Error::AddressInUse(a)) if a == addr));
        assert_eq!(service.manager().input().state(), InputState::Error);
    }
}
