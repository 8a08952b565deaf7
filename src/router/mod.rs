//! Fan-out routing from the input to every output
//!
//! The manager owns the ordered output registry and the input listener; the
//! service drives the accept loop and pumps producer bytes into the fan-out.
//!
//! # Architecture
//!
//! ```text
//!                           Arc<RouterManager>
//!                     ┌──────────────────────────┐
//!                     │ input: TcpInput          │
//!                     │ outputs: RwLock<Vec<     │
//!                     │   OutputEntry {          │
//!                     │     output: TcpOutput,   │
//!                     │     dispatcher: mpsc::Tx │
//!                     │   }                      │
//!                     │ >>                       │
//!                     └────────────┬─────────────┘
//!                                  │
//!    [Producer] ──► relay_chunks() ──► write_all(chunk)
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          ▼                       ▼                       ▼
//!     [writer task]           [writer task]           [writer task]
//!     rx.recv()               rx.recv()               rx.recv()
//!     output.write() ──► TCP  output.write() ──► TCP  output.write() ──► TCP
//! ```
//!
//! # Isolation
//!
//! `write_all` only enqueues. Each output drains its own bounded queue, so a
//! dialing or backing-off output never delays the others. `Bytes` chunks are
//! reference-counted and shared between all queues without copying.

mod dispatch;
pub mod manager;
pub mod service;

pub use manager::RouterManager;
pub use service::RouterService;
