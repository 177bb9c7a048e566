//! Payment Request Consumer
//!
//! Pulls JSON payment requests off an in-process queue, charges them through
//! [`PaymentService`], and answers each one on a reply queue. Replies are sent
//! through the `message_queue` resilience profile like any other broker call.
//!
//! Requests that cannot be decoded or that fail for a reason other than a
//! decline are dropped without a reply, the way a broker consumer would
//! reject them without requeueing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::services::{PaymentService, PaymentServiceError};
use crate::domain::payment::{Payment, PaymentRequest, PaymentStatus};
use crate::resilience::{Classify, ErrorKind, ResilienceError};

/// Breaker and retry name for reply publishing.
const REPLIES_OPERATION: &str = "payment_responses";

/// A request as it arrives from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDelivery {
    /// JSON-encoded [`PaymentRequest`].
    pub body: String,
    /// Caller's correlation ID, echoed on the reply.
    pub correlation_id: Option<String>,
}

impl PaymentDelivery {
    /// Delivery with no correlation ID.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            correlation_id: None,
        }
    }

    /// Attach a correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Answer to one processed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReply {
    /// Order the request was for.
    pub order_id: String,
    /// Stored payment.
    pub payment_id: Uuid,
    /// Outcome.
    pub status: PaymentStatus,
    /// Human-readable outcome.
    pub message: String,
    /// Correlation ID copied from the delivery.
    pub correlation_id: Option<String>,
    /// When the reply was built.
    pub timestamp: DateTime<Utc>,
}

impl PaymentReply {
    fn for_payment(payment: &Payment, correlation_id: Option<String>) -> Self {
        Self {
            order_id: payment.order_id.clone(),
            payment_id: payment.payment_id,
            status: payment.status,
            message: payment.message.clone(),
            correlation_id,
            timestamp: Utc::now(),
        }
    }
}

/// Reply queue failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    /// Nobody is reading replies any more.
    #[error("reply queue closed")]
    Closed,
}

impl Classify for ReplyError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Closed => ErrorKind::Connection,
        }
    }
}

/// Consumer loop over a request queue.
pub struct PaymentConsumer {
    service: Arc<PaymentService>,
    requests: mpsc::Receiver<PaymentDelivery>,
    replies: mpsc::Sender<PaymentReply>,
    cancel: CancellationToken,
}

impl PaymentConsumer {
    /// Create a consumer.
    #[must_use]
    pub const fn new(
        service: Arc<PaymentService>,
        requests: mpsc::Receiver<PaymentDelivery>,
        replies: mpsc::Sender<PaymentReply>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            requests,
            replies,
            cancel,
        }
    }

    /// Handle deliveries one at a time until cancelled or the queue closes.
    pub async fn run(mut self) {
        tracing::info!("Waiting for payment requests");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Payment consumer cancelled");
                    break;
                }
                delivery = self.requests.recv() => match delivery {
                    Some(delivery) => self.handle(delivery).await,
                    None => {
                        tracing::debug!("Payment request queue closed");
                        break;
                    }
                },
            }
        }

        tracing::info!("Payment consumer stopped");
    }

    async fn handle(&self, delivery: PaymentDelivery) {
        let request: PaymentRequest = match serde_json::from_str(&delivery.body) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(error = %e, "Rejecting undecodable payment request");
                return;
            }
        };
        let order_id = request.order_id.clone();
        tracing::info!(order_id = %order_id, "Received payment request");

        let reply = match self.service.process_payment(request).await {
            Ok(payment) => PaymentReply::for_payment(&payment, delivery.correlation_id),
            Err(PaymentServiceError::Declined { payment_id, message }) => PaymentReply {
                order_id,
                payment_id,
                status: PaymentStatus::Failed,
                message,
                correlation_id: delivery.correlation_id,
                timestamp: Utc::now(),
            },
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Rejecting payment request");
                return;
            }
        };

        let payment_id = reply.payment_id;
        if let Err(e) = self.reply(reply).await {
            tracing::error!(payment_id = %payment_id, error = %e, "Failed to send payment reply");
        }
    }

    async fn reply(&self, reply: PaymentReply) -> Result<(), ResilienceError<ReplyError>> {
        let replies = self.replies.clone();
        self.service
            .resilience()
            .message_queue(REPLIES_OPERATION)
            .execute(move || {
                let replies = replies.clone();
                let reply = reply.clone();
                async move { replies.send(reply).await.map_err(|_| ReplyError::Closed) }
            })
            .await
    }
}
