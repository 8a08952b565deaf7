//! Client handler trait
//!
//! Implement [`ClientHandler`] to consume the producer connection accepted by
//! a [`TcpInput`](super::TcpInput).

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::shutdown::Shutdown;

/// Information about an accepted producer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientContext {
    /// Sequential id assigned by the listener
    pub client_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,
}

/// Per-connection handler driven by the accept loop
///
/// The accept loop waits for `handle` to return before accepting the next
/// client. Implementations must return on end of stream and must honour
/// `shutdown` on every blocking read; [`relay_chunks`](super::relay_chunks)
/// does both.
pub trait ClientHandler: Send + Sync {
    /// Handle one client until it disconnects or shutdown fires
    fn handle(
        &self,
        stream: TcpStream,
        ctx: ClientContext,
        shutdown: Shutdown,
    ) -> impl Future<Output = ()> + Send;
}
