//! Output identity

use serde::{Deserialize, Serialize};

/// Unique identifier for an output (hostname + port)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputId {
    /// Remote host name or address literal (e.g., "feed.adsb.lol")
    pub hostname: String,
    /// Remote port (e.g., 30004)
    pub port: u16,
}

impl OutputId {
    /// Create a new output id
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }
}

impl std::fmt::Display for OutputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}
