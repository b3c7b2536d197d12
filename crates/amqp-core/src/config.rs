//! Connection configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::framing::DEFAULT_FRAME_MAX;

/// Highest channel id handed out by default.
pub const DEFAULT_CHANNEL_MAX: u16 = 2047;

const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 30_000;

/// Settings shared by a connection and all of its channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Highest channel id that [`crate::Connection::channel`] allocates.
    pub channel_max: u16,
    /// Largest wire frame, header and end octet included.
    pub frame_max: u32,
    /// Initial auto-decode flag of every channel.
    pub auto_decode: bool,
    /// Per-drain timeout used while waiting for close-ok. `None` waits forever.
    pub close_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            channel_max: DEFAULT_CHANNEL_MAX,
            frame_max: DEFAULT_FRAME_MAX,
            auto_decode: true,
            close_timeout: Some(Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS)),
        }
    }
}

impl ConnectionConfig {
    /// Defaults overridden by `AMQP_CHANNEL_MAX`, `AMQP_FRAME_MAX`,
    /// `AMQP_AUTO_DECODE` and `AMQP_CLOSE_TIMEOUT_MS` (0 disables the timeout).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let close_timeout_ms =
            env_or("AMQP_CLOSE_TIMEOUT_MS", DEFAULT_CLOSE_TIMEOUT_MS);
        Self {
            channel_max: env_or("AMQP_CHANNEL_MAX", defaults.channel_max).max(1),
            frame_max: env_or("AMQP_FRAME_MAX", defaults.frame_max),
            auto_decode: env_or("AMQP_AUTO_DECODE", defaults.auto_decode),
            close_timeout: (close_timeout_ms > 0).then(|| Duration::from_millis(close_timeout_ms)),
        }
    }

    pub fn with_channel_max(mut self, channel_max: u16) -> Self {
        self.channel_max = channel_max;
        self
    }

    pub fn with_auto_decode(mut self, auto_decode: bool) -> Self {
        self.auto_decode = auto_decode;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.close_timeout = timeout;
        self
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_limits() {
        let config = ConnectionConfig::default();
        assert_eq!(config.channel_max, DEFAULT_CHANNEL_MAX);
        assert_eq!(config.frame_max, DEFAULT_FRAME_MAX);
        assert!(config.auto_decode);
        assert_eq!(config.close_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_or_unparsable_env_falls_back() {
        assert_eq!(env_or("AMQP_CORE_TEST_UNSET_KEY", 7u16), 7);
        assert!(env_or("AMQP_CORE_TEST_UNSET_FLAG", true));
    }

    #[test]
    fn builders_override_fields() {
        let config = ConnectionConfig::default()
            .with_channel_max(16)
            .with_auto_decode(false)
            .with_close_timeout(None);
        assert_eq!(config.channel_max, 16);
        assert!(!config.auto_decode);
        assert_eq!(config.close_timeout, None);
    }
}
