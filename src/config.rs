//! Router configuration file
//!
//! JSON layout, every section and field optional:
//!
//! ```json
//! {
//!   "input": { "address": "0.0.0.0", "port": 30004, "read_chunk_size": 2048 },
//!   "outputs": [ { "hostname": "feed.adsb.lol", "port": 30004 } ],
//!   "retry": {
//!     "max_tries": 3,
//!     "backoff_step_secs": 5,
//!     "drain_delay_secs": 10,
//!     "connect_timeout_secs": 10,
//!     "queue_capacity": 64
//!   }
//! }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::input::InputConfig;
use crate::output::{OutputConfig, OutputId};

/// Complete router configuration
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Producer-facing listener
    pub input: InputConfig,
    /// Applied to every output
    pub output: OutputConfig,
    /// Outputs to register, in order
    pub outputs: Vec<OutputId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    input: InputSection,
    outputs: Vec<OutputId>,
    retry: RetrySection,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct InputSection {
    address: Option<IpAddr>,
    port: Option<u16>,
    read_chunk_size: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct RetrySection {
    max_tries: Option<u32>,
    backoff_step_secs: Option<u64>,
    drain_delay_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    queue_capacity: Option<usize>,
}

impl RouterConfig {
    /// Parse a JSON document, filling gaps with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        file.into_config()
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

impl ConfigFile {
    fn into_config(self) -> Result<RouterConfig> {
        let mut input = InputConfig::default();
        let bind = input.bind_addr;
        input.bind_addr = SocketAddr::new(
            self.input.address.unwrap_or(bind.ip()),
            self.input.port.unwrap_or(bind.port()),
        );
        if let Some(size) = self.input.read_chunk_size {
            if size == 0 {
                return Err(Error::Config("input.read_chunk_size must be at least 1".into()));
            }
            input = input.read_chunk_size(size);
        }

        let retry = self.retry;
        let mut output = OutputConfig::default();
        if let Some(tries) = retry.max_tries {
            if tries == 0 {
                return Err(Error::Config("retry.max_tries must be at least 1".into()));
            }
            output = output.max_connect_tries(tries);
        }
        if let Some(capacity) = retry.queue_capacity {
            if capacity == 0 {
                return Err(Error::Config("retry.queue_capacity must be at least 1".into()));
            }
            output = output.queue_capacity(capacity);
        }
        if let Some(secs) = retry.backoff_step_secs {
            output = output.backoff_step(Duration::from_secs(secs));
        }
        if let Some(secs) = retry.drain_delay_secs {
            output = output.drain_delay(Duration::from_secs(secs));
        }
        if let Some(secs) = retry.connect_timeout_secs {
            output = output.connect_timeout(Duration::from_secs(secs));
        }

        Ok(RouterConfig {
            input,
            output,
            outputs: self.outputs,
        })
    }
}
