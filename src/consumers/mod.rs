use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use lapin::message::Delivery;

use crate::app_state::AppState;

pub mod payments;

/// Handler for one queue. It owns the delivery and must ack, nack or reject it.
pub type Consumer = fn(Delivery, Arc<AppState>) -> BoxFuture<'static, Result<()>>;

/// Queues this service consumes, with their handlers.
pub fn all() -> [(&'static str, Consumer); 1] {
    [(
        payments::PAYMENT_SUCCEEDED_QUEUE,
        payments::payment_succeeded as Consumer,
    )]
}
