//! Notifications emitted after an order is committed.
//!
//! Publishing is best effort. A failed publish is logged and never touches
//! the order that triggered it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lapin::{
    BasicProperties, Channel, Connection,
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::OrderDetail;

pub const ORDER_CREATED_QUEUE: &str = "orders.order_created";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_reference: String,
    pub user_id: Uuid,
    pub total_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderDetail> for OrderCreatedEvent {
    fn from(detail: &OrderDetail) -> Self {
        let order = &detail.order;
        Self {
            tenant_id: order.tenant_id,
            order_id: order.id,
            order_number: order.order_number.clone(),
            payment_reference: order.payment_reference.clone(),
            user_id: order.user_id,
            total_cents: order.total_cents,
            currency: order.currency.clone(),
            created_at: order.created_at,
        }
    }
}

#[async_trait]
pub trait OrderEvents: Send + Sync {
    async fn order_created(&self, event: &OrderCreatedEvent) -> Result<()>;
}

/// Publishes JSON events to a durable queue through the default exchange.
#[derive(Clone)]
pub struct AmqpOrderEvents {
    channel: Channel,
}

impl AmqpOrderEvents {
    pub async fn new(connection: &Connection) -> Result<Self> {
        let channel = connection
            .create_channel()
            .await
            .context("Failed to open the events channel")?;

        channel
            .queue_declare(
                ORDER_CREATED_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to declare queue {ORDER_CREATED_QUEUE}"))?;

        Ok(Self { channel })
    }
}

#[async_trait]
impl OrderEvents for AmqpOrderEvents {
    async fn order_created(&self, event: &OrderCreatedEvent) -> Result<()> {
        let payload = serde_json::to_vec(event).context("Failed to serialize event")?;

        self.channel
            .basic_publish(
                "",
                ORDER_CREATED_QUEUE,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .context("Failed to publish OrderCreated")?
            .await
            .context("Broker did not confirm OrderCreated")?;

        Ok(())
    }
}

/// Writes events to the log only. Used when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingOrderEvents;

#[async_trait]
impl OrderEvents for LoggingOrderEvents {
    async fn order_created(&self, event: &OrderCreatedEvent) -> Result<()> {
        info!(
            tenant_id = %event.tenant_id,
            order_number = %event.order_number,
            total_cents = event.total_cents,
            "OrderCreated"
        );
        Ok(())
    }
}
