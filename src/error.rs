//! Error types
//!
//! Errors surfaced to callers of the router. Socket failures on outputs are
//! not errors in this sense: they are absorbed and recorded on the output as an
//! [`OutputError`](crate::output::OutputError) classification.

use std::net::SocketAddr;

use crate::output::OutputId;

/// Result alias for router operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for router operations
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure
    Io(std::io::Error),
    /// Input address or port is already bound by another socket
    AddressInUse(SocketAddr),
    /// The input listener has not been started
    NotListening,
    /// An output with the same hostname and port is already registered
    DuplicateOutput(OutputId),
    /// Configuration could not be loaded
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::AddressInUse(addr) => write!(f, "Address or port already in use: {}", addr),
            Error::NotListening => write!(f, "Input is not listening"),
            Error::DuplicateOutput(id) => write!(f, "Output already added: {}", id),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
