use std::time::Duration;

use thiserror::Error;

/// Failures of the physical detector link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("detector link unavailable: {0}")]
    Unavailable(String),
    #[error("detector link read failure: {0}")]
    ReadFailure(#[from] std::io::Error),
}

/// Per-line validation failures. Always recoverable by skipping the line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("unrecognized sentence \"{0}\"")]
    UnrecognizedSentence(String),
    #[error("malformed {field} field: \"{value}\"")]
    MalformedField { field: &'static str, value: String },
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("insufficient samples: {0} found, 10 required")]
    InsufficientSamples(usize),
}

impl DecodeError {
    pub(crate) fn malformed(field: &'static str, value: &str) -> Self {
        Self::MalformedField {
            field,
            value: value.to_string(),
        }
    }
}

/// Failure of a single consumer on a single event.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("event rejected: {0}")]
    Rejected(String),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("delivery queue full, event dropped")]
    QueueFull,
    #[error("consumer is not connected")]
    NotConnected,
    #[error("consumer I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}
