//! Output configuration

use std::time::Duration;

/// Default number of dial attempts per start
pub const DEFAULT_MAX_CONNECT_TRIES: u32 = 3;

/// Default backoff increment between dial attempts
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(5);

/// Default pause after a write failure before reconnecting
pub const DEFAULT_DRAIN_DELAY: Duration = Duration::from_secs(10);

/// Default per-output dispatch queue capacity, in chunks
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Output connection options
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Dial attempts per start before giving up
    pub max_connect_tries: u32,

    /// Backoff after failed attempt `k` is `backoff_step * k`
    pub backoff_step: Duration,

    /// Pause after a write failure before reconnecting
    pub drain_delay: Duration,

    /// Upper bound for a single dial (None = OS default)
    pub connect_timeout: Option<Duration>,

    /// Chunks buffered per output before new chunks are dropped
    pub queue_capacity: usize,

    /// Enable TCP_NODELAY on outbound sockets
    pub tcp_nodelay: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_connect_tries: DEFAULT_MAX_CONNECT_TRIES,
            backoff_step: DEFAULT_BACKOFF_STEP,
            drain_delay: DEFAULT_DRAIN_DELAY,
            connect_timeout: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tcp_nodelay: true,
        }
    }
}

impl OutputConfig {
    /// Set the number of dial attempts (at least 1)
    pub fn max_connect_tries(mut self, tries: u32) -> Self {
        self.max_connect_tries = tries.max(1);
        self
    }

    /// Set the backoff step
    pub fn backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Set the drain delay
    pub fn drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    /// Set the dial timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the dispatch queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Delay inserted after failed attempt `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OutputConfig::default();

        assert_eq!(config.max_connect_tries, 3);
        assert_eq!(config.backoff_step, Duration::from_secs(5));
        assert_eq!(config.drain_delay, Duration::from_secs(10));
        assert!(config.connect_timeout.is_none());
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_backoff_increases_by_step() {
        let config = OutputConfig::default();

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(10));
        assert!(config.backoff_delay(2) > config.backoff_delay(1));
    }

    #[test]
    fn test_builder_floors() {
        let config = OutputConfig::default()
            .max_connect_tries(0)
            .queue_capacity(0);

        assert_eq!(config.max_connect_tries, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = OutputConfig::default()
            .max_connect_tries(5)
            .backoff_step(Duration::from_millis(10))
            .drain_delay(Duration::from_millis(20))
            .connect_timeout(Duration::from_secs(2));

        assert_eq!(config.max_connect_tries, 5);
        assert_eq!(config.backoff_delay(3), Duration::from_millis(30));
        assert_eq!(config.drain_delay, Duration::from_millis(20));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(2)));
    }
}
