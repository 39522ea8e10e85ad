use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::{CheckoutError, Result},
    models::SkuEntity,
    store::Store,
};

/// Unit price of a SKU in the tenant's default price list at lookup time.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrice {
    pub sku: SkuEntity,
    pub price_list_id: Uuid,
    pub unit_price_cents: i64,
}

#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn Store>,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, tenant_id: Uuid, sku_id: Uuid) -> Result<ResolvedPrice> {
        let sku = self
            .store
            .find_sku(tenant_id, sku_id)
            .await?
            .ok_or(CheckoutError::SkuNotFound { sku_id })?;

        let price_list = self
            .store
            .default_price_list(tenant_id)
            .await?
            .ok_or(CheckoutError::PriceNotFound { sku_id })?;

        let unit_price_cents = self
            .store
            .price_for_sku(tenant_id, price_list.id, sku_id)
            .await?
            .ok_or(CheckoutError::PriceNotFound { sku_id })?;

        Ok(ResolvedPrice {
            sku,
            price_list_id: price_list.id,
            unit_price_cents,
        })
    }
}
