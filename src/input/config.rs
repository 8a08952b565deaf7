//! Input configuration

use std::net::{Ipv4Addr, SocketAddr};

/// Well-known port for ADS-B raw (Beast) feeds
pub const DEFAULT_INPUT_PORT: u16 = 30004;

/// Bytes requested per read from the producer
pub const DEFAULT_READ_CHUNK_SIZE: usize = 2048;

/// Input listener options
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum bytes per chunk read from the producer
    pub read_chunk_size: usize,

    /// Enable TCP_NODELAY on the accepted producer socket
    pub tcp_nodelay: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_INPUT_PORT)),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl InputConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the read chunk size (at least 1 byte)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}
