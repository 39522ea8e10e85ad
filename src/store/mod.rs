//! Persistence port of the checkout core.
//!
//! Every read and write is scoped by `tenant_id`. The single exception is
//! [`CartRepository::find_cart_for_checkout`], which exists so the order
//! assembler can tell a foreign cart apart from a missing one.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use diesel::result::DatabaseErrorKind;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    BillingCustomerEntity, CartEntity, CartItemEntity, CreateAddressEntity, CreateOrderEntity,
    CreateOrderItemEntity, CreatePaymentEntity, OrderDetail, OrderEntity, OrderStatus,
    PriceListEntity, ProductEntity, SessionEntity, SkuEntity, UserEntity,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("insufficient stock for sku {sku_id} (requested {requested})")]
    InsufficientStock { sku_id: Uuid, requested: i32 },

    #[error("cart {cart_id} is not open")]
    CartNotOpen { cart_id: Uuid },

    #[error("an order for payment {payment_reference} already exists")]
    DuplicatePaymentReference { payment_reference: String },

    #[error("all {attempts} order number candidates were taken")]
    OrderNumberExhausted { attempts: usize },

    #[error("user {user_id} not found")]
    UserNotFound { user_id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("failed to obtain a DB connection: {0}")]
    Pool(String),
}

impl StoreError {
    /// Whether the same write can succeed on a later attempt.
    ///
    /// Constraint violations other than the payment reference one will fail
    /// again with the same input.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::CheckViolation
                    | DatabaseErrorKind::NotNullViolation
                    | DatabaseErrorKind::ForeignKeyViolation
                    | DatabaseErrorKind::UniqueViolation,
                _,
            ))
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One conditional stock decrement inside an order commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub sku_id: Uuid,
    pub quantity: i32,
}

/// Who the order belongs to.
#[derive(Debug, Clone)]
pub enum CustomerDraft {
    /// Cart was attached to a known user.
    Existing { user_id: Uuid },
    /// Guest checkout; the user row is reused by email or created.
    Guest { email: String, name: Option<String> },
}

/// Order header fields that are known before commit.
#[derive(Debug, Clone)]
pub struct OrderHeaderDraft {
    pub id: Uuid,
    pub payment_reference: String,
    pub currency: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub customer_notes: Option<String>,
}

/// Everything the order commit writes, prepared ahead of the transaction.
///
/// `order_number_candidates` are tried in order; the first one not taken wins.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub tenant_id: Uuid,
    pub cart_id: Uuid,
    pub customer: CustomerDraft,
    pub gateway_customer_id: String,
    pub shipping_address: CreateAddressEntity,
    pub billing_address: CreateAddressEntity,
    pub payment: CreatePaymentEntity,
    pub order: OrderHeaderDraft,
    pub order_number_candidates: Vec<String>,
    pub items: Vec<CreateOrderItemEntity>,
    pub stock: Vec<StockDecrement>,
}

impl OrderDraft {
    pub fn order_row(&self, order_number: &str, user_id: Uuid) -> CreateOrderEntity {
        CreateOrderEntity {
            id: self.order.id,
            tenant_id: self.tenant_id,
            order_number: order_number.to_string(),
            user_id,
            cart_id: self.cart_id,
            payment_reference: self.order.payment_reference.clone(),
            status: OrderStatus::Pending.as_str().to_string(),
            currency: self.order.currency.clone(),
            subtotal_cents: self.order.subtotal_cents,
            tax_cents: self.order.tax_cents,
            shipping_cents: self.order.shipping_cents,
            total_cents: self.order.total_cents,
            shipping_address_id: self.shipping_address.id,
            billing_address_id: self.billing_address.id,
            payment_id: self.payment.id,
            customer_notes: self.order.customer_notes.clone(),
        }
    }
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> StoreResult<Option<CartEntity>>;

    /// Unscoped lookup used only for the checkout tenant check.
    async fn find_cart_for_checkout(&self, cart_id: Uuid) -> StoreResult<Option<CartEntity>>;

    async fn find_session(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> StoreResult<Option<SessionEntity>>;

    /// Creates a cart and the session pointing at it in one transaction.
    async fn create_session_with_cart(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> StoreResult<(CartEntity, SessionEntity)>;

    async fn attach_user(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<CartEntity>>;

    async fn cart_items(&self, tenant_id: Uuid, cart_id: Uuid)
    -> StoreResult<Vec<CartItemEntity>>;

    /// Inserts the line or replaces quantity and price of the existing line.
    async fn upsert_cart_item(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
        unit_price_cents: i64,
    ) -> StoreResult<()>;

    /// Returns false when no line with `sku_id` existed.
    async fn set_cart_item_quantity(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool>;

    async fn delete_cart_item(&self, tenant_id: Uuid, cart_id: Uuid, sku_id: Uuid)
    -> StoreResult<bool>;

    async fn clear_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_sku(&self, tenant_id: Uuid, sku_id: Uuid) -> StoreResult<Option<SkuEntity>>;

    async fn find_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<ProductEntity>>;

    async fn default_price_list(&self, tenant_id: Uuid) -> StoreResult<Option<PriceListEntity>>;

    async fn price_for_sku(
        &self,
        tenant_id: Uuid,
        price_list_id: Uuid,
        sku_id: Uuid,
    ) -> StoreResult<Option<i64>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order_by_payment_reference(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
    ) -> StoreResult<Option<OrderDetail>>;

    async fn find_order_by_id(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> StoreResult<Option<OrderDetail>>;

    async fn find_order_by_number(
        &self,
        tenant_id: Uuid,
        order_number: &str,
    ) -> StoreResult<Option<OrderDetail>>;

    async fn find_user(&self, tenant_id: Uuid, user_id: Uuid) -> StoreResult<Option<UserEntity>>;

    async fn find_billing_customer(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<BillingCustomerEntity>>;

    /// Writes the whole order aggregate atomically. Nothing is visible unless
    /// every step succeeds.
    async fn commit_order(&self, draft: OrderDraft) -> StoreResult<OrderDetail>;

    /// Moves the order to `to` only if its current status is in `from`.
    async fn transition_order_status(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> StoreResult<Option<OrderEntity>>;
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Decrements only if `quantity_on_hand >= quantity`. Returns whether a row changed.
    async fn decrement_stock(&self, tenant_id: Uuid, sku_id: Uuid, quantity: i32)
    -> StoreResult<bool>;

    async fn quantity_on_hand(&self, tenant_id: Uuid, sku_id: Uuid) -> StoreResult<Option<i32>>;
}

pub trait Store: CartRepository + CatalogRepository + OrderRepository + InventoryRepository {}

impl<T> Store for T where T: CartRepository + CatalogRepository + OrderRepository + InventoryRepository
{}
