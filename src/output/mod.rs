//! Outbound connections
//!
//! Each output owns one TCP connection to a downstream consumer and runs its
//! own connect/retry/write cycle, independent of every other output.
//!
//! # State machine
//!
//! ```text
//!   Disconnected ──start──► Connecting ──success──► Connected
//!        ▲                      │                       │
//!        ├── exhausted, ────────┘                       │
//!        │   host not found                             │
//!        └──────────── write failure ◄──────────────────┘
//!                (drain delay, then start again)
//!
//!   Disconnected | Connecting | Connected ──stop──► Stopped ──start──► Connecting
//! ```

pub mod config;
pub mod connection;
pub mod id;
pub mod state;

pub use config::OutputConfig;
pub use connection::TcpOutput;
pub use id::OutputId;
pub use state::{OutputError, OutputState, OutputStatus, Transition};
