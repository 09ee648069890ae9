//! Error types for stablebridge

use std::fmt;

/// Result type alias for stablebridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for stablebridge
#[derive(Debug)]
pub enum Error {
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// A rule definition failed validation
    InvalidRule { topic: String, reason: String },
    /// A single event could not be mapped to a row
    Mapping { topic: String, reason: String },
    /// Inconsistent logical query
    Planning(String),
    /// Store-reported failure
    Store { code: i64, desc: String },
    /// Transport failure talking to the store
    Transport(String),
    /// Malformed or unexpected store response
    Query(String),
    /// Worker pool rejected a submission
    PoolSaturated { capacity: usize },
    /// Call was cancelled before completion
    Cancelled,
    /// Timeout
    Timeout,
    /// Internal error
    Internal(String),
}

impl Error {
    pub(crate) fn invalid_rule(topic: &str, reason: impl Into<String>) -> Self {
        Error::InvalidRule {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mapping(topic: &str, reason: impl Into<String>) -> Self {
        Error::Mapping {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }

    /// Short, stable label for metrics attributes.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::InvalidRule { .. } => "invalid_rule",
            Error::Mapping { .. } => "mapping",
            Error::Planning(_) => "planning",
            Error::Store { .. } => "store",
            Error::Transport(_) => "transport",
            Error::Query(_) => "query",
            Error::PoolSaturated { .. } => "pool_saturated",
            Error::Cancelled => "cancelled",
            Error::Timeout => "timeout",
            Error::Internal(_) => "internal",
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidRule { topic, reason } => {
                write!(f, "Invalid rule for topic {}: {}", topic, reason)
            }
            Error::Mapping { topic, reason } => {
                write!(f, "Mapping error on topic {}: {}", topic, reason)
            }
            Error::Planning(msg) => write!(f, "Query planning error: {}", msg),
            Error::Store { code, desc } => write!(f, "Store error [{}]: {}", code, desc),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Query(msg) => write!(f, "Query error: {}", msg),
            Error::PoolSaturated { capacity } => {
                write!(f, "Worker pool saturated (capacity {})", capacity)
            }
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
