//! The `error` module defines the error type shared by the broker.
//!
//! Closed topics, payload serialization and listener I/O are the only
//! runtime failures the broker reports. Exiting twice or removing an unknown
//! listener pairing are silent no-ops and never show up here.

use thiserror::Error;

/// Errors returned by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The topic was closed before (or while) the operation ran.
    #[error("topic '{topic}' is closed")]
    TopicClosed { topic: String },

    /// The payload could not be encoded as JSON.
    ///
    /// Only returned when strict serialization is enabled; otherwise the
    /// envelope is dropped at dispatch time.
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing a frame to a listener's sink failed.
    #[error("listener write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    pub(crate) fn topic_closed(topic: &str) -> Self {
        Self::TopicClosed {
            topic: topic.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
