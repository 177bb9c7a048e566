//! Payment Repository Port (Driven Port)
//!
//! Interface for persisting payment records.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::payment::Payment;
use crate::resilience::{Classify, ErrorKind};

/// Repository error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Could not reach the store.
    #[error("Repository connection error: {message}")]
    Connection {
        /// Details.
        message: String,
    },

    /// The query did not complete in time.
    #[error("Repository query timeout: {message}")]
    Timeout {
        /// Details.
        message: String,
    },

    /// The store refused the write.
    #[error("Repository constraint violation: {message}")]
    Constraint {
        /// Details.
        message: String,
    },
}

impl Classify for RepositoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Constraint { .. } => ErrorKind::Rejected,
        }
    }
}

/// Port for payment persistence.
#[async_trait]
pub trait PaymentRepositoryPort: Send + Sync {
    /// Insert or replace a payment.
    async fn save(&self, payment: &Payment) -> Result<(), RepositoryError>;

    /// Find a payment by ID.
    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, RepositoryError>;

    /// Find every payment made by a user, newest first.
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Payment>, RepositoryError>;
}
