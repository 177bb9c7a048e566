//! Messaging Adapters

mod consumer;
mod in_memory;

pub use consumer::{PaymentConsumer, PaymentDelivery, PaymentReply, ReplyError};
pub use in_memory::{InMemoryEventPublisher, PublishedMessage};
