//! Event Publisher Port (Driven Port)
//!
//! Interface for publishing payment events to the message broker.

use async_trait::async_trait;

use crate::domain::payment::PaymentEvent;
use crate::resilience::{Classify, ErrorKind};

/// Event publishing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventPublishError {
    /// Connection error.
    #[error("Event publish connection error: {message}")]
    ConnectionError {
        /// Details.
        message: String,
    },

    /// Serialization error.
    #[error("Event serialization error: {message}")]
    SerializationError {
        /// Details.
        message: String,
    },

    /// Publishing failed.
    #[error("Event publish failed: {message}")]
    PublishFailed {
        /// Details.
        message: String,
    },
}

impl Classify for EventPublishError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionError { .. } => ErrorKind::Connection,
            Self::SerializationError { .. } => ErrorKind::Rejected,
            Self::PublishFailed { .. } => ErrorKind::Unavailable,
        }
    }
}

/// Port for publishing payment events.
#[async_trait]
pub trait EventPublisherPort: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: &PaymentEvent) -> Result<(), EventPublishError>;
}

/// No-op event publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisherPort for NoOpEventPublisher {
    async fn publish(&self, _event: &PaymentEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}
