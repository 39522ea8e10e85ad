use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::CartConfig,
    error::{CheckoutError, Result},
    models::{CartEntity, CartSummary},
    services::PricingResolver,
    store::Store,
};

/// Mutable pre-checkout line items per session.
///
/// Concurrent edits of one cart are last-write-wins. Every mutation returns a
/// fresh [`CartSummary`] computed from the stored lines.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    pricing: PricingResolver,
    config: CartConfig,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, pricing: PricingResolver, config: CartConfig) -> Self {
        Self {
            store,
            pricing,
            config,
        }
    }

    fn new_session_token(&self) -> String {
        let mut bytes = vec![0u8; self.config.session_token_bytes];
        rand::rng().fill(bytes.as_mut_slice());
        hex::encode(bytes)
    }

    /// Resolves the cart behind `token` or mints a new session and cart.
    ///
    /// A token that parses as a UUID is tried as a cart id first, then as a
    /// session token. Converted carts are never handed out again.
    pub async fn get_or_create(
        &self,
        tenant_id: Uuid,
        token: Option<&str>,
    ) -> Result<(CartEntity, String)> {
        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            if let Some(cart) = self.lookup(tenant_id, token).await? {
                if cart.is_open() {
                    return Ok((cart, token.to_string()));
                }
                debug!(%tenant_id, cart_id = %cart.id, "Cart already converted, starting a new one");
            }
        }

        let token = self.new_session_token();
        let (cart, _session) = self.store.create_session_with_cart(tenant_id, &token).await?;
        info!(%tenant_id, cart_id = %cart.id, "Created cart");

        Ok((cart, token))
    }

    async fn lookup(&self, tenant_id: Uuid, token: &str) -> Result<Option<CartEntity>> {
        if let Ok(cart_id) = Uuid::parse_str(token) {
            if let Some(cart) = self.store.find_cart(tenant_id, cart_id).await? {
                return Ok(Some(cart));
            }
        }

        match self.store.find_session(tenant_id, token).await? {
            Some(session) => Ok(self.store.find_cart(tenant_id, session.cart_id).await?),
            None => Ok(None),
        }
    }

    async fn open_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> Result<CartEntity> {
        let cart = self
            .store
            .find_cart(tenant_id, cart_id)
            .await?
            .ok_or_else(|| CheckoutError::CartNotFound {
                cart_ref: cart_id.to_string(),
            })?;

        if !cart.is_open() {
            return Err(CheckoutError::CartAlreadyConverted { cart_id });
        }
        Ok(cart)
    }

    /// Sets the line for `sku_id` to `quantity` at the current price.
    ///
    /// Repeating the call with the same SKU replaces the quantity.
    pub async fn add_item(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
    ) -> Result<CartSummary> {
        if quantity <= 0 {
            return Err(CheckoutError::InvalidQuantity { quantity });
        }
        let cart = self.open_cart(tenant_id, cart_id).await?;
        let price = self.pricing.resolve(tenant_id, sku_id).await?;

        self.store
            .upsert_cart_item(tenant_id, cart.id, sku_id, quantity, price.unit_price_cents)
            .await?;
        debug!(%tenant_id, %cart_id, %sku_id, quantity, "Cart line set");

        self.summarize(&cart).await
    }

    /// Zero removes the line. A line that does not exist yet is added.
    pub async fn update_quantity(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
    ) -> Result<CartSummary> {
        if quantity < 0 {
            return Err(CheckoutError::InvalidQuantity { quantity });
        }
        if quantity == 0 {
            return self.remove_item(tenant_id, cart_id, sku_id).await;
        }

        let cart = self.open_cart(tenant_id, cart_id).await?;
        let updated = self
            .store
            .set_cart_item_quantity(tenant_id, cart.id, sku_id, quantity)
            .await?;
        if !updated {
            return self.add_item(tenant_id, cart_id, sku_id, quantity).await;
        }

        self.summarize(&cart).await
    }

    pub async fn remove_item(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
    ) -> Result<CartSummary> {
        let cart = self.open_cart(tenant_id, cart_id).await?;
        self.store.delete_cart_item(tenant_id, cart.id, sku_id).await?;
        self.summarize(&cart).await
    }

    pub async fn clear(&self, tenant_id: Uuid, cart_id: Uuid) -> Result<CartSummary> {
        let cart = self.open_cart(tenant_id, cart_id).await?;
        let removed = self.store.clear_cart(tenant_id, cart.id).await?;
        debug!(%tenant_id, %cart_id, removed, "Cart cleared");
        self.summarize(&cart).await
    }

    /// Readable for converted carts too.
    pub async fn summary(&self, tenant_id: Uuid, cart_id: Uuid) -> Result<CartSummary> {
        let cart = self
            .store
            .find_cart(tenant_id, cart_id)
            .await?
            .ok_or_else(|| CheckoutError::CartNotFound {
                cart_ref: cart_id.to_string(),
            })?;
        self.summarize(&cart).await
    }

    /// Links a signed-in user to the cart so checkout uses their identity.
    pub async fn attach_user(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        user_id: Uuid,
    ) -> Result<CartEntity> {
        self.store
            .find_user(tenant_id, user_id)
            .await?
            .ok_or(CheckoutError::CustomerNotFound { user_id })?;
        self.open_cart(tenant_id, cart_id).await?;

        self.store
            .attach_user(tenant_id, cart_id, user_id)
            .await?
            .ok_or_else(|| CheckoutError::CartNotFound {
                cart_ref: cart_id.to_string(),
            })
    }

    async fn summarize(&self, cart: &CartEntity) -> Result<CartSummary> {
        let items = self.store.cart_items(cart.tenant_id, cart.id).await?;
        Ok(CartSummary::from_items(cart, &items))
    }
}
