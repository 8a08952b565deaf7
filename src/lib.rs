//! TCP fan-out relay for ADS-B raw feeds
//!
//! One producer connects to the input listener; every byte it sends is
//! replicated, unchanged and in order, to each registered output. Outputs
//! dial, retry with linear backoff and recover from write failures on their
//! own, so a dead aggregator never stalls the healthy ones.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use adsb_router::{shutdown, InputConfig, OutputConfig, RouterManager, RouterService};
//!
//! # async fn run() -> adsb_router::Result<()> {
//! let (trigger, signal) = shutdown::channel();
//! let manager = Arc::new(RouterManager::new(
//!     InputConfig::default(),
//!     OutputConfig::default(),
//!     signal.clone(),
//! ));
//! manager.add_output("feed.adsb.lol", 30004).await?;
//!
//! let service = RouterService::new(Arc::clone(&manager));
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     trigger.trigger();
//! });
//! service.run(signal).await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod router;
pub mod shutdown;

pub use config::RouterConfig;
pub use error::{Error, Result};
pub use input::{InputConfig, InputState, TcpInput};
pub use output::{OutputConfig, OutputError, OutputId, OutputState, OutputStatus, TcpOutput};
pub use router::{RouterManager, RouterService};
pub use shutdown::{Shutdown, ShutdownTrigger};
