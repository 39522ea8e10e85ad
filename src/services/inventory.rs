use std::{collections::BTreeMap, sync::Arc};

use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{CheckoutError, Result},
    models::CartItemEntity,
    store::{StockDecrement, Store},
};

/// Per-SKU stock counter guarded by a conditional decrement.
///
/// There is no reservation step and no backorder path. A decrement either
/// takes the full quantity or changes nothing.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn Store>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn decrement(&self, tenant_id: Uuid, sku_id: Uuid, quantity: i32) -> Result<()> {
        if quantity <= 0 {
            return Err(CheckoutError::InvalidQuantity { quantity });
        }

        if self.store.decrement_stock(tenant_id, sku_id, quantity).await? {
            return Ok(());
        }

        // Distinguish a missing SKU from an exhausted one.
        match self.store.quantity_on_hand(tenant_id, sku_id).await? {
            None => Err(CheckoutError::SkuNotFound { sku_id }),
            Some(on_hand) => {
                warn!(%tenant_id, %sku_id, requested = quantity, on_hand, "Stock decrement refused");
                Err(CheckoutError::InsufficientStock {
                    sku_id,
                    requested: quantity,
                })
            }
        }
    }

    pub async fn on_hand(&self, tenant_id: Uuid, sku_id: Uuid) -> Result<i32> {
        self.store
            .quantity_on_hand(tenant_id, sku_id)
            .await?
            .ok_or(CheckoutError::SkuNotFound { sku_id })
    }

    /// One decrement per SKU, ordered by SKU id so concurrent commits touch
    /// stock rows in the same order.
    pub fn plan_decrements(items: &[CartItemEntity]) -> Vec<StockDecrement> {
        let mut per_sku: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in items {
            *per_sku.entry(item.sku_id).or_default() += item.quantity;
        }

        per_sku
            .into_iter()
            .map(|(sku_id, quantity)| StockDecrement { sku_id, quantity })
            .collect()
    }
}
