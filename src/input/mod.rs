//! Producer-facing input
//!
//! A single listener accepts the ADS-B feed producer. Bytes are read in
//! fixed-size chunks and handed on unchanged; no framing is applied.

pub mod config;
pub mod handler;
pub mod listener;
pub mod relay;

pub use config::InputConfig;
pub use handler::{ClientContext, ClientHandler};
pub use listener::{InputState, TcpInput};
pub use relay::relay_chunks;
