use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    models::{
        AddressEntity, BillingCustomerEntity, CartEntity, CartItemEntity, CartStatus,
        CreateAddressEntity, CreatePriceListEntity, CreateProductEntity, CreateSkuEntity,
        CreateUserEntity, OrderDetail, OrderEntity, OrderItemEntity, OrderStatus, PaymentEntity,
        PriceEntity, PriceListEntity, ProductEntity, SessionEntity, SkuEntity, UserEntity,
    },
    store::{
        CartRepository, CatalogRepository, CustomerDraft, InventoryRepository, OrderDraft,
        OrderRepository, StoreError, StoreResult,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<Uuid, ProductEntity>,
    skus: HashMap<Uuid, SkuEntity>,
    price_lists: HashMap<Uuid, PriceListEntity>,
    prices: HashMap<(Uuid, Uuid), i64>,
    users: HashMap<Uuid, UserEntity>,
    billing_customers: Vec<BillingCustomerEntity>,
    carts: HashMap<Uuid, CartEntity>,
    /// Lines per cart, in insertion order.
    cart_items: HashMap<Uuid, Vec<CartItemEntity>>,
    sessions: Vec<SessionEntity>,
    orders: HashMap<Uuid, OrderEntity>,
    order_items: HashMap<Uuid, Vec<OrderItemEntity>>,
    addresses: HashMap<Uuid, AddressEntity>,
    payments: HashMap<Uuid, PaymentEntity>,
}

impl MemoryState {
    fn touch_cart(&mut self, cart_id: Uuid) {
        if let Some(cart) = self.carts.get_mut(&cart_id) {
            cart.updated_at = Utc::now();
        }
    }

    fn cart_lines_mut(&mut self, tenant_id: Uuid, cart_id: Uuid) -> Option<&mut Vec<CartItemEntity>> {
        let owned = self
            .carts
            .get(&cart_id)
            .is_some_and(|cart| cart.tenant_id == tenant_id);
        if !owned {
            return None;
        }
        Some(self.cart_items.entry(cart_id).or_default())
    }

    fn decrement(&mut self, tenant_id: Uuid, sku_id: Uuid, quantity: i32) -> bool {
        match self.skus.get_mut(&sku_id) {
            Some(sku) if sku.tenant_id == tenant_id && sku.quantity_on_hand >= quantity => {
                sku.quantity_on_hand -= quantity;
                sku.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    fn detail(&self, order: &OrderEntity) -> Option<OrderDetail> {
        let mut items = self.order_items.get(&order.id).cloned().unwrap_or_default();
        items.sort_by_key(|item| item.line_number);

        Some(OrderDetail {
            order: order.clone(),
            items,
            shipping_address: self.addresses.get(&order.shipping_address_id)?.clone(),
            billing_address: self.addresses.get(&order.billing_address_id)?.clone(),
            payment: self.payments.get(&order.payment_id)?.clone(),
        })
    }

    fn find_order(&self, predicate: impl Fn(&OrderEntity) -> bool) -> Option<OrderDetail> {
        self.orders
            .values()
            .find(|order| predicate(*order))
            .and_then(|order| self.detail(order))
    }

    fn resolve_user(&mut self, tenant_id: Uuid, customer: &CustomerDraft) -> StoreResult<Uuid> {
        match customer {
            CustomerDraft::Existing { user_id } => match self.users.get(user_id) {
                Some(user) if user.tenant_id == tenant_id => Ok(user.id),
                _ => Err(StoreError::UserNotFound { user_id: *user_id }),
            },
            CustomerDraft::Guest { email, name } => {
                let existing = self
                    .users
                    .values()
                    .find(|user| user.tenant_id == tenant_id && &user.email == email);
                if let Some(user) = existing {
                    return Ok(user.id);
                }

                let user = UserEntity {
                    id: Uuid::new_v4(),
                    tenant_id,
                    email: email.clone(),
                    name: name.clone(),
                    is_guest: true,
                    created_at: Utc::now(),
                };
                let user_id = user.id;
                self.users.insert(user_id, user);
                Ok(user_id)
            }
        }
    }

    fn insert_address(&mut self, address: &CreateAddressEntity) {
        self.addresses.insert(
            address.id,
            AddressEntity {
                id: address.id,
                tenant_id: address.tenant_id,
                name: address.name.clone(),
                line1: address.line1.clone(),
                line2: address.line2.clone(),
                city: address.city.clone(),
                region: address.region.clone(),
                postal_code: address.postal_code.clone(),
                country: address.country.clone(),
                created_at: Utc::now(),
            },
        );
    }

    /// Applies the draft in the same order as the SQL transaction.
    fn apply(&mut self, draft: &OrderDraft) -> StoreResult<OrderDetail> {
        let tenant_id = draft.tenant_id;
        let payment_reference = &draft.order.payment_reference;
        let now = Utc::now();

        let user_id = self.resolve_user(tenant_id, &draft.customer)?;

        match self
            .billing_customers
            .iter_mut()
            .find(|link| link.tenant_id == tenant_id && link.user_id == user_id)
        {
            Some(link) => link.gateway_customer_id = draft.gateway_customer_id.clone(),
            None => self.billing_customers.push(BillingCustomerEntity {
                id: Uuid::new_v4(),
                tenant_id,
                user_id,
                gateway_customer_id: draft.gateway_customer_id.clone(),
                created_at: now,
            }),
        }

        self.insert_address(&draft.shipping_address);
        self.insert_address(&draft.billing_address);

        let duplicate_payment = self.payments.values().any(|payment| {
            payment.tenant_id == tenant_id && &payment.payment_reference == payment_reference
        });
        if duplicate_payment {
            return Err(StoreError::DuplicatePaymentReference {
                payment_reference: payment_reference.clone(),
            });
        }
        self.payments.insert(
            draft.payment.id,
            PaymentEntity {
                id: draft.payment.id,
                tenant_id,
                order_id: None,
                payment_reference: payment_reference.clone(),
                amount_cents: draft.payment.amount_cents,
                currency: draft.payment.currency.clone(),
                status: draft.payment.status.clone(),
                created_at: now,
                updated_at: now,
            },
        );

        let order_number = draft
            .order_number_candidates
            .iter()
            .find(|candidate| {
                !self
                    .orders
                    .values()
                    .any(|order| &order.order_number == *candidate)
            })
            .ok_or(StoreError::OrderNumberExhausted {
                attempts: draft.order_number_candidates.len(),
            })?;

        let row = draft.order_row(order_number, user_id);
        let order = OrderEntity {
            id: row.id,
            tenant_id: row.tenant_id,
            order_number: row.order_number,
            user_id: row.user_id,
            cart_id: row.cart_id,
            payment_reference: row.payment_reference,
            status: row.status,
            currency: row.currency,
            subtotal_cents: row.subtotal_cents,
            tax_cents: row.tax_cents,
            shipping_cents: row.shipping_cents,
            total_cents: row.total_cents,
            shipping_address_id: row.shipping_address_id,
            billing_address_id: row.billing_address_id,
            payment_id: row.payment_id,
            customer_notes: row.customer_notes,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(order.id, order.clone());

        let items = draft
            .items
            .iter()
            .map(|item| OrderItemEntity {
                id: item.id,
                order_id: item.order_id,
                tenant_id: item.tenant_id,
                line_number: item.line_number,
                sku_id: item.sku_id,
                product_name: item.product_name.clone(),
                sku_code: item.sku_code.clone(),
                variant_description: item.variant_description.clone(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                line_total_cents: item.line_total_cents,
            })
            .collect();
        self.order_items.insert(order.id, items);

        for line in &draft.stock {
            if !self.decrement(tenant_id, line.sku_id, line.quantity) {
                return Err(StoreError::InsufficientStock {
                    sku_id: line.sku_id,
                    requested: line.quantity,
                });
            }
        }

        match self.carts.get_mut(&draft.cart_id) {
            Some(cart) if cart.tenant_id == tenant_id && cart.is_open() => {
                cart.status = CartStatus::Converted.as_str().to_string();
                cart.updated_at = now;
            }
            _ => {
                return Err(StoreError::CartNotOpen {
                    cart_id: draft.cart_id,
                });
            }
        }

        if let Some(payment) = self.payments.get_mut(&draft.payment.id) {
            payment.order_id = Some(order.id);
            payment.updated_at = now;
        }

        self.detail(&order).ok_or(StoreError::Database(diesel::result::Error::NotFound))
    }
}

/// In-process store with the same atomicity as the SQL adapter.
///
/// Each write locks the whole state. `commit_order` applies the draft to a copy
/// and only swaps it in when every step succeeded, so a failed commit leaves no
/// trace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    commit_ack_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays the reply of `commit_order` after the commit has been applied,
    /// like a database whose acknowledgement is slow to arrive.
    pub fn set_commit_ack_delay(&self, delay: Duration) {
        self.commit_ack_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn insert_product(&self, product: CreateProductEntity) -> ProductEntity {
        let product = ProductEntity {
            id: product.id,
            tenant_id: product.tenant_id,
            name: product.name,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        product
    }

    pub async fn insert_sku(&self, sku: CreateSkuEntity) -> SkuEntity {
        let now = Utc::now();
        let sku = SkuEntity {
            id: sku.id,
            tenant_id: sku.tenant_id,
            product_id: sku.product_id,
            code: sku.code,
            option_values: sku.option_values,
            quantity_on_hand: sku.quantity_on_hand,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.skus.insert(sku.id, sku.clone());
        sku
    }

    pub async fn insert_price_list(&self, price_list: CreatePriceListEntity) -> PriceListEntity {
        let price_list = PriceListEntity {
            id: price_list.id,
            tenant_id: price_list.tenant_id,
            name: price_list.name,
            is_default: price_list.is_default,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .price_lists
            .insert(price_list.id, price_list.clone());
        price_list
    }

    pub async fn insert_price(&self, price: PriceEntity) {
        self.state
            .lock()
            .await
            .prices
            .insert((price.price_list_id, price.sku_id), price.amount_cents);
    }

    pub async fn insert_user(&self, user: CreateUserEntity) -> UserEntity {
        let user = UserEntity {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            name: user.name,
            is_guest: user.is_guest,
            created_at: Utc::now(),
        };
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    pub async fn address_count(&self) -> usize {
        self.state.lock().await.addresses.len()
    }

    pub async fn users_with_email(&self, tenant_id: Uuid, email: &str) -> Vec<UserEntity> {
        self.state
            .lock()
            .await
            .users
            .values()
            .filter(|user| user.tenant_id == tenant_id && user.email == email)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn find_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> StoreResult<Option<CartEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .carts
            .get(&cart_id)
            .filter(|cart| cart.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_cart_for_checkout(&self, cart_id: Uuid) -> StoreResult<Option<CartEntity>> {
        Ok(self.state.lock().await.carts.get(&cart_id).cloned())
    }

    async fn find_session(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> StoreResult<Option<SessionEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .iter()
            .find(|session| session.tenant_id == tenant_id && session.token == token)
            .cloned())
    }

    async fn create_session_with_cart(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> StoreResult<(CartEntity, SessionEntity)> {
        let now = Utc::now();
        let cart = CartEntity {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: None,
            status: CartStatus::Open.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        let session = SessionEntity {
            id: Uuid::new_v4(),
            tenant_id,
            token: token.to_string(),
            cart_id: cart.id,
            created_at: now,
        };

        let mut state = self.state.lock().await;
        state.carts.insert(cart.id, cart.clone());
        state.sessions.push(session.clone());
        Ok((cart, session))
    }

    async fn attach_user(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<CartEntity>> {
        let mut state = self.state.lock().await;
        let cart = state
            .carts
            .get_mut(&cart_id)
            .filter(|cart| cart.tenant_id == tenant_id)
            .map(|cart| {
                cart.user_id = Some(user_id);
                cart.updated_at = Utc::now();
                cart.clone()
            });
        Ok(cart)
    }

    async fn cart_items(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
    ) -> StoreResult<Vec<CartItemEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .cart_items
            .get(&cart_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_cart_item(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
        unit_price_cents: i64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(lines) = state.cart_lines_mut(tenant_id, cart_id) {
            match lines.iter_mut().find(|item| item.sku_id == sku_id) {
                Some(item) => {
                    item.quantity = quantity;
                    item.unit_price_cents = unit_price_cents;
                    item.updated_at = now;
                }
                None => lines.push(CartItemEntity {
                    cart_id,
                    sku_id,
                    tenant_id,
                    quantity,
                    unit_price_cents,
                    created_at: now,
                    updated_at: now,
                }),
            }
            state.touch_cart(cart_id);
        }
        Ok(())
    }

    async fn set_cart_item_quantity(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;

        let updated = state
            .cart_lines_mut(tenant_id, cart_id)
            .and_then(|lines| lines.iter_mut().find(|item| item.sku_id == sku_id))
            .map(|item| {
                item.quantity = quantity;
                item.updated_at = Utc::now();
            })
            .is_some();

        if updated {
            state.touch_cart(cart_id);
        }
        Ok(updated)
    }

    async fn delete_cart_item(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;

        let removed = match state.cart_lines_mut(tenant_id, cart_id) {
            Some(lines) => {
                let before = lines.len();
                lines.retain(|item| item.sku_id != sku_id);
                lines.len() < before
            }
            None => false,
        };

        if removed {
            state.touch_cart(cart_id);
        }
        Ok(removed)
    }

    async fn clear_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> StoreResult<u64> {
        let mut state = self.state.lock().await;

        let removed = state
            .cart_lines_mut(tenant_id, cart_id)
            .map(|lines| lines.drain(..).count() as u64)
            .unwrap_or(0);

        state.touch_cart(cart_id);
        Ok(removed)
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn find_sku(&self, tenant_id: Uuid, sku_id: Uuid) -> StoreResult<Option<SkuEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .skus
            .get(&sku_id)
            .filter(|sku| sku.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<ProductEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .get(&product_id)
            .filter(|product| product.tenant_id == tenant_id)
            .cloned())
    }

    async fn default_price_list(&self, tenant_id: Uuid) -> StoreResult<Option<PriceListEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .price_lists
            .values()
            .find(|list| list.tenant_id == tenant_id && list.is_default)
            .cloned())
    }

    async fn price_for_sku(
        &self,
        tenant_id: Uuid,
        price_list_id: Uuid,
        sku_id: Uuid,
    ) -> StoreResult<Option<i64>> {
        let state = self.state.lock().await;
        let in_tenant = state
            .price_lists
            .get(&price_list_id)
            .is_some_and(|list| list.tenant_id == tenant_id);

        Ok(in_tenant
            .then(|| state.prices.get(&(price_list_id, sku_id)).copied())
            .flatten())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn find_order_by_payment_reference(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
    ) -> StoreResult<Option<OrderDetail>> {
        let state = self.state.lock().await;
        Ok(state.find_order(|order| {
            order.tenant_id == tenant_id && order.payment_reference == payment_reference
        }))
    }

    async fn find_order_by_id(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> StoreResult<Option<OrderDetail>> {
        let state = self.state.lock().await;
        Ok(state.find_order(|order| order.tenant_id == tenant_id && order.id == order_id))
    }

    async fn find_order_by_number(
        &self,
        tenant_id: Uuid,
        order_number: &str,
    ) -> StoreResult<Option<OrderDetail>> {
        let state = self.state.lock().await;
        Ok(state.find_order(|order| {
            order.tenant_id == tenant_id && order.order_number == order_number
        }))
    }

    async fn find_user(&self, tenant_id: Uuid, user_id: Uuid) -> StoreResult<Option<UserEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .get(&user_id)
            .filter(|user| user.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_billing_customer(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<BillingCustomerEntity>> {
        let state = self.state.lock().await;
        Ok(state
            .billing_customers
            .iter()
            .find(|link| link.tenant_id == tenant_id && link.user_id == user_id)
            .cloned())
    }

    async fn commit_order(&self, draft: OrderDraft) -> StoreResult<OrderDetail> {
        let mut state = self.state.lock().await;

        let duplicate = state.orders.values().any(|order| {
            order.tenant_id == draft.tenant_id
                && order.payment_reference == draft.order.payment_reference
        });
        if duplicate {
            return Err(StoreError::DuplicatePaymentReference {
                payment_reference: draft.order.payment_reference.clone(),
            });
        }

        let mut staged = state.clone();
        let detail = staged.apply(&draft)?;
        *state = staged;
        drop(state);

        let delay = self.commit_ack_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(detail)
    }

    async fn transition_order_status(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> StoreResult<Option<OrderEntity>> {
        let mut state = self.state.lock().await;

        let order = state
            .orders
            .get_mut(&order_id)
            .filter(|order| order.tenant_id == tenant_id)
            .filter(|order| from.iter().any(|status| status.as_str() == order.status))
            .map(|order| {
                order.status = to.as_str().to_string();
                order.updated_at = Utc::now();
                order.clone()
            });
        Ok(order)
    }
}

#[async_trait]
impl InventoryRepository for MemoryStore {
    async fn decrement_stock(
        &self,
        tenant_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool> {
        Ok(self.state.lock().await.decrement(tenant_id, sku_id, quantity))
    }

    async fn quantity_on_hand(&self, tenant_id: Uuid, sku_id: Uuid) -> StoreResult<Option<i32>> {
        let state = self.state.lock().await;
        Ok(state
            .skus
            .get(&sku_id)
            .filter(|sku| sku.tenant_id == tenant_id)
            .map(|sku| sku.quantity_on_hand))
    }
}
