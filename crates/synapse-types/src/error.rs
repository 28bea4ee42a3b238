use std::time::Duration;

use thiserror::Error;

/// Errors returned by message bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("agent '{0}' is not registered")]
    NotRegistered(String),

    #[error("invalid routing pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A sender-assigned id collides with a message still tracked by the bus.
    #[error("message id '{0}' is already in flight")]
    DuplicateMessageId(String),

    #[error("message queue is closed")]
    QueueClosed,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("reply channel closed before a response arrived")]
    ReplyChannelClosed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure raised by an agent's message handler.
///
/// Handler failures never reach the sender; the bus records them against the
/// envelope and schedules a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("handler rejected message: {0}")]
    Rejected(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn other(err: impl std::fmt::Display) -> Self {
        Self::Other(err.to_string())
    }
}

/// Invalid bus configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_display() {
        let err = BusError::NotRegistered("planner".to_string());
        assert_eq!(err.to_string(), "agent 'planner' is not registered");

        let err = BusError::InvalidPattern {
            pattern: "[".to_string(),
            reason: "unclosed".to_string(),
        };
        assert!(err.to_string().contains("'['"));
    }

    #[test]
    fn test_config_error_converts_into_bus_error() {
        let err: BusError = ConfigError::Zero { field: "queue_capacity" }.into();
        assert_eq!(err.to_string(), "queue_capacity must be greater than zero");
    }

    #[test]
    fn test_handler_error_constructors() {
        assert_eq!(
            HandlerError::rejected("busy").to_string(),
            "handler rejected message: busy"
        );
        assert_eq!(HandlerError::other("boom").to_string(), "boom");
    }
}
