use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;

/// Largest capacity a bounded Tokio channel accepts.
pub const MAX_CHANNEL_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Top-level configuration settings for the broker.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for topics and their dispatch loops.
///
/// Capacities are clamped into `1..=MAX_CHANNEL_CAPACITY` when channels are
/// created; `load_config` rejects values above the upper bound.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Envelopes a topic buffers before publishers wait.
    pub inbound_capacity: usize,
    /// Frames a subscriber buffers before the dispatch loop waits on it.
    pub subscriber_capacity: usize,
    /// Upper bound on a single handoff to one subscriber; `0` waits forever.
    pub delivery_timeout_ms: u64,
    /// Return serialization failures to the publisher instead of dropping.
    pub strict_serialization: bool,
}

impl BrokerSettings {
    /// Capacity used for a topic's inbound channel.
    pub fn inbound_channel_capacity(&self) -> usize {
        self.inbound_capacity.clamp(1, MAX_CHANNEL_CAPACITY)
    }

    /// Capacity used for each subscriber's outbound channel.
    pub fn subscriber_channel_capacity(&self) -> usize {
        self.subscriber_capacity.clamp(1, MAX_CHANNEL_CAPACITY)
    }

    /// The handoff limit, or `None` when `delivery_timeout_ms` is `0`.
    pub fn delivery_timeout(&self) -> Option<Duration> {
        (self.delivery_timeout_ms > 0).then(|| Duration::from_millis(self.delivery_timeout_ms))
    }
}

/// Configuration settings for logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub inbound_capacity: Option<usize>,
    pub subscriber_capacity: Option<usize>,
    pub delivery_timeout_ms: Option<u64>,
    pub strict_serialization: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            inbound_capacity: 64,
            subscriber_capacity: 16,
            delivery_timeout_ms: 0,
            strict_serialization: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
