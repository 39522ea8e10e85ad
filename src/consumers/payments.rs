use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app_state::AppState;

pub const PAYMENT_SUCCEEDED_QUEUE: &str = "payments.payment_succeeded";

/// Relayed payment provider webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceededEvent {
    pub tenant_id: Uuid,
    pub payment_reference: String,
}

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Ack,
    /// Transient failure. The broker redelivers and the assembler's idempotency
    /// makes the retry safe.
    Requeue,
    /// The payload can never be processed.
    Reject,
}

/// Runs checkout for one delivery payload and classifies the result.
pub async fn handle_payment_succeeded(state: &AppState, data: &[u8]) -> DeliveryOutcome {
    let payload: PaymentSucceededEvent = match serde_json::from_slice(data) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "Undecodable PaymentSucceeded payload");
            return DeliveryOutcome::Reject;
        }
    };
    info!("Received event: {:?}", payload);

    let PaymentSucceededEvent {
        tenant_id,
        payment_reference,
    } = payload;

    match state
        .checkout
        .create_from_payment_reference(tenant_id, &payment_reference)
        .await
    {
        Ok(detail) => {
            info!(
                %tenant_id,
                payment_reference = %payment_reference,
                order_number = %detail.order.order_number,
                "Payment settled into order"
            );
            DeliveryOutcome::Ack
        }
        Err(err) if err.is_retryable() => {
            warn!(
                %tenant_id,
                payment_reference = %payment_reference,
                error = %err,
                "Checkout failed, requeueing"
            );
            DeliveryOutcome::Requeue
        }
        Err(err) => {
            warn!(
                %tenant_id,
                payment_reference = %payment_reference,
                kind = ?err.kind(),
                error = %err,
                "Checkout rejected, dropping delivery"
            );
            DeliveryOutcome::Ack
        }
    }
}

pub fn payment_succeeded(
    delivery: Delivery,
    state: Arc<AppState>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        match handle_payment_succeeded(&state, &delivery.data).await {
            DeliveryOutcome::Ack => {
                delivery.ack(BasicAckOptions::default()).await?;
            }
            DeliveryOutcome::Requeue => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await?;
            }
            DeliveryOutcome::Reject => {
                delivery
                    .reject(BasicRejectOptions { requeue: false })
                    .await?;
            }
        }

        Ok(())
    })
}
