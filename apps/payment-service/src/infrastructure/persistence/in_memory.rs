//! In-Memory Payment Repository
//!
//! Process-local store used by the binary and by tests. Can be switched
//! offline to exercise the database resilience profile.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::application::ports::{PaymentRepositoryPort, RepositoryError};
use crate::domain::payment::Payment;

/// Payment store backed by a `HashMap`.
#[derive(Debug)]
pub struct InMemoryPaymentRepository {
    payments: RwLock<HashMap<Uuid, Payment>>,
    online: AtomicBool,
}

impl InMemoryPaymentRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            payments: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Number of stored payments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payments.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payments.read().is_empty()
    }

    /// Take the store offline (`false`) or bring it back (`true`).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), RepositoryError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RepositoryError::Connection {
                message: "store offline".to_string(),
            })
        }
    }
}

impl Default for InMemoryPaymentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentRepositoryPort for InMemoryPaymentRepository {
    async fn save(&self, payment: &Payment) -> Result<(), RepositoryError> {
        self.ensure_online()?;
        self.payments
            .write()
            .insert(payment.payment_id, payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, RepositoryError> {
        self.ensure_online()?;
        Ok(self.payments.read().get(&payment_id).cloned())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Payment>, RepositoryError> {
        self.ensure_online()?;
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}
