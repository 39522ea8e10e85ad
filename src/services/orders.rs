use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    error::{CheckoutError, Result},
    models::{OrderDetail, OrderEntity, OrderStatus},
    store::Store,
};

/// Tenant-scoped order lookups and status transitions.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, tenant_id: Uuid, order_id: Uuid) -> Result<OrderDetail> {
        self.store
            .find_order_by_id(tenant_id, order_id)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound {
                reference: order_id.to_string(),
            })
    }

    pub async fn get_by_number(&self, tenant_id: Uuid, order_number: &str) -> Result<OrderDetail> {
        self.store
            .find_order_by_number(tenant_id, order_number.trim())
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound {
                reference: order_number.to_string(),
            })
    }

    pub async fn confirm(&self, tenant_id: Uuid, order_id: Uuid) -> Result<OrderEntity> {
        self.transition(tenant_id, order_id, OrderStatus::Confirmed).await
    }

    pub async fn ship(&self, tenant_id: Uuid, order_id: Uuid) -> Result<OrderEntity> {
        self.transition(tenant_id, order_id, OrderStatus::Shipped).await
    }

    pub async fn deliver(&self, tenant_id: Uuid, order_id: Uuid) -> Result<OrderEntity> {
        self.transition(tenant_id, order_id, OrderStatus::Delivered).await
    }

    pub async fn cancel(&self, tenant_id: Uuid, order_id: Uuid) -> Result<OrderEntity> {
        self.transition(tenant_id, order_id, OrderStatus::Cancelled).await
    }

    /// Conditional update: applies only while the order is in a legal source status.
    pub async fn transition(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<OrderEntity> {
        let updated = self
            .store
            .transition_order_status(tenant_id, order_id, to.allowed_sources(), to)
            .await?;

        if let Some(order) = updated {
            info!(%tenant_id, order_number = %order.order_number, status = %to, "Order status changed");
            return Ok(order);
        }

        let current = self.get_by_id(tenant_id, order_id).await?;
        Err(CheckoutError::InvalidStatusTransition {
            order_id,
            from: current.order.status,
            to: to.to_string(),
        })
    }
}
