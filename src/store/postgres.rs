use std::time::Duration;

use async_trait::async_trait;
use diesel::{
    ExpressionMethods, OptionalExtension, QueryDsl, QueryResult, SelectableHelper,
    result::{DatabaseErrorKind, Error as DieselError},
};
use diesel_async::{
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
    pooled_connection::bb8::{Pool, PooledConnection},
    scoped_futures::ScopedFutureExt,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    models::{
        AddressEntity, BillingCustomerEntity, CartEntity, CartItemEntity, CartStatus,
        CreateBillingCustomerEntity, CreateCartEntity, CreateCartItemEntity, CreateSessionEntity,
        CreateUserEntity, OrderDetail, OrderEntity, OrderItemEntity, OrderStatus, PaymentEntity,
        PriceListEntity, ProductEntity, SessionEntity, SkuEntity, UserEntity,
    },
    schema::{
        addresses, billing_customers, cart_items, carts, order_items, orders, payments,
        price_lists, prices, products, sessions, skus, users,
    },
    store::{
        CartRepository, CatalogRepository, CustomerDraft, InventoryRepository, OrderDraft,
        OrderRepository, StoreError, StoreResult,
    },
};

pub type DbPool = Pool<AsyncPgConnection>;

/// Unique constraints that identify an already-processed payment.
const PAYMENT_REFERENCE_CONSTRAINTS: &[&str] = &[
    "orders_tenant_payment_reference_key",
    "payments_tenant_payment_reference_key",
];

/// PostgreSQL implementation of every repository port.
#[derive(Clone)]
pub struct PgStore {
    db_pool: DbPool,
    statement_timeout: Duration,
}

impl PgStore {
    /// `statement_timeout` bounds each statement of the order commit.
    pub fn new(db_pool: DbPool, statement_timeout: Duration) -> Self {
        Self {
            db_pool,
            statement_timeout,
        }
    }

    async fn conn(&self) -> StoreResult<PooledConnection<'_, AsyncPgConnection>> {
        self.db_pool
            .get()
            .await
            .map_err(|err| StoreError::Pool(err.to_string()))
    }
}

async fn touch_cart(conn: &mut AsyncPgConnection, tenant_id: Uuid, cart_id: Uuid) -> QueryResult<()> {
    diesel::update(
        carts::table
            .filter(carts::id.eq(cart_id))
            .filter(carts::tenant_id.eq(tenant_id)),
    )
    .set(carts::updated_at.eq(diesel::dsl::now))
    .execute(conn)
    .await?;
    Ok(())
}

async fn decrement_stock_in(
    conn: &mut AsyncPgConnection,
    tenant_id: Uuid,
    sku_id: Uuid,
    quantity: i32,
) -> QueryResult<bool> {
    let affected = diesel::update(
        skus::table
            .filter(skus::id.eq(sku_id))
            .filter(skus::tenant_id.eq(tenant_id))
            .filter(skus::quantity_on_hand.ge(quantity)),
    )
    .set((
        skus::quantity_on_hand.eq(skus::quantity_on_hand - quantity),
        skus::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await?;

    Ok(affected > 0)
}

async fn load_detail(conn: &mut AsyncPgConnection, order: OrderEntity) -> QueryResult<OrderDetail> {
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .filter(order_items::tenant_id.eq(order.tenant_id))
        .order_by(order_items::line_number.asc())
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await?;

    let shipping_address: AddressEntity = addresses::table
        .find(order.shipping_address_id)
        .filter(addresses::tenant_id.eq(order.tenant_id))
        .select(AddressEntity::as_select())
        .first(conn)
        .await?;

    let billing_address: AddressEntity = addresses::table
        .find(order.billing_address_id)
        .filter(addresses::tenant_id.eq(order.tenant_id))
        .select(AddressEntity::as_select())
        .first(conn)
        .await?;

    let payment: PaymentEntity = payments::table
        .find(order.payment_id)
        .filter(payments::tenant_id.eq(order.tenant_id))
        .select(PaymentEntity::as_select())
        .first(conn)
        .await?;

    Ok(OrderDetail {
        order,
        items,
        shipping_address,
        billing_address,
        payment,
    })
}

async fn load_optional_detail(
    conn: &mut AsyncPgConnection,
    order: Option<OrderEntity>,
) -> StoreResult<Option<OrderDetail>> {
    match order {
        Some(order) => Ok(Some(load_detail(conn, order).await?)),
        None => Ok(None),
    }
}

async fn resolve_user(
    conn: &mut AsyncPgConnection,
    tenant_id: Uuid,
    customer: &CustomerDraft,
) -> StoreResult<Uuid> {
    match customer {
        CustomerDraft::Existing { user_id } => {
            let user_id = *user_id;
            let count: i64 = users::table
                .filter(users::id.eq(user_id))
                .filter(users::tenant_id.eq(tenant_id))
                .count()
                .get_result(conn)
                .await?;

            if count == 0 {
                return Err(StoreError::UserNotFound { user_id });
            }
            Ok(user_id)
        }
        CustomerDraft::Guest { email, name } => {
            // Concurrent guest checkouts with one email converge on a single row.
            diesel::insert_into(users::table)
                .values(CreateUserEntity {
                    id: Uuid::new_v4(),
                    tenant_id,
                    email: email.clone(),
                    name: name.clone(),
                    is_guest: true,
                })
                .on_conflict((users::tenant_id, users::email))
                .do_nothing()
                .execute(conn)
                .await?;

            let user_id: Uuid = users::table
                .filter(users::tenant_id.eq(tenant_id))
                .filter(users::email.eq(email))
                .select(users::id)
                .first(conn)
                .await?;
            Ok(user_id)
        }
    }
}

fn classify(err: StoreError, payment_reference: &str) -> StoreError {
    match err {
        StoreError::Database(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info))
            if info
                .constraint_name()
                .is_some_and(|name| PAYMENT_REFERENCE_CONSTRAINTS.contains(&name)) =>
        {
            StoreError::DuplicatePaymentReference {
                payment_reference: payment_reference.to_string(),
            }
        }
        other => other,
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn find_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> StoreResult<Option<CartEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let cart = carts::table
            .filter(carts::id.eq(cart_id))
            .filter(carts::tenant_id.eq(tenant_id))
            .select(CartEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(cart)
    }

    async fn find_cart_for_checkout(&self, cart_id: Uuid) -> StoreResult<Option<CartEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let cart = carts::table
            .find(cart_id)
            .select(CartEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(cart)
    }

    async fn find_session(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> StoreResult<Option<SessionEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let session = sessions::table
            .filter(sessions::tenant_id.eq(tenant_id))
            .filter(sessions::token.eq(token))
            .select(SessionEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(session)
    }

    async fn create_session_with_cart(
        &self,
        tenant_id: Uuid,
        token: &str,
    ) -> StoreResult<(CartEntity, SessionEntity)> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        let token = token.to_string();

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let cart: CartEntity = diesel::insert_into(carts::table)
                    .values(CreateCartEntity {
                        id: Uuid::new_v4(),
                        tenant_id,
                        user_id: None,
                        status: CartStatus::Open.as_str().to_string(),
                    })
                    .returning(CartEntity::as_returning())
                    .get_result(conn)
                    .await?;

                let session: SessionEntity = diesel::insert_into(sessions::table)
                    .values(CreateSessionEntity {
                        id: Uuid::new_v4(),
                        tenant_id,
                        token,
                        cart_id: cart.id,
                    })
                    .returning(SessionEntity::as_returning())
                    .get_result(conn)
                    .await?;

                Ok((cart, session))
            }
            .scope_boxed()
        })
        .await
    }

    async fn attach_user(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<CartEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let cart = diesel::update(
            carts::table
                .filter(carts::id.eq(cart_id))
                .filter(carts::tenant_id.eq(tenant_id)),
        )
        .set((
            carts::user_id.eq(Some(user_id)),
            carts::updated_at.eq(diesel::dsl::now),
        ))
        .returning(CartEntity::as_returning())
        .get_result(conn)
        .await
        .optional()?;
        Ok(cart)
    }

    async fn cart_items(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
    ) -> StoreResult<Vec<CartItemEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let items = cart_items::table
            .filter(cart_items::cart_id.eq(cart_id))
            .filter(cart_items::tenant_id.eq(tenant_id))
            .order_by((cart_items::created_at.asc(), cart_items::sku_id.asc()))
            .select(CartItemEntity::as_select())
            .get_results(conn)
            .await?;
        Ok(items)
    }

    async fn upsert_cart_item(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
        unit_price_cents: i64,
    ) -> StoreResult<()> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        diesel::insert_into(cart_items::table)
            .values(CreateCartItemEntity {
                cart_id,
                sku_id,
                tenant_id,
                quantity,
                unit_price_cents,
            })
            .on_conflict((cart_items::cart_id, cart_items::sku_id))
            .do_update()
            .set((
                cart_items::quantity.eq(quantity),
                cart_items::unit_price_cents.eq(unit_price_cents),
                cart_items::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await?;

        touch_cart(conn, tenant_id, cart_id).await?;
        Ok(())
    }

    async fn set_cart_item_quantity(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let affected = diesel::update(
            cart_items::table
                .filter(cart_items::cart_id.eq(cart_id))
                .filter(cart_items::sku_id.eq(sku_id))
                .filter(cart_items::tenant_id.eq(tenant_id)),
        )
        .set((
            cart_items::quantity.eq(quantity),
            cart_items::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;

        if affected > 0 {
            touch_cart(conn, tenant_id, cart_id).await?;
        }
        Ok(affected > 0)
    }

    async fn delete_cart_item(
        &self,
        tenant_id: Uuid,
        cart_id: Uuid,
        sku_id: Uuid,
    ) -> StoreResult<bool> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let affected = diesel::delete(
            cart_items::table
                .filter(cart_items::cart_id.eq(cart_id))
                .filter(cart_items::sku_id.eq(sku_id))
                .filter(cart_items::tenant_id.eq(tenant_id)),
        )
        .execute(conn)
        .await?;

        if affected > 0 {
            touch_cart(conn, tenant_id, cart_id).await?;
        }
        Ok(affected > 0)
    }

    async fn clear_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> StoreResult<u64> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let affected = diesel::delete(
            cart_items::table
                .filter(cart_items::cart_id.eq(cart_id))
                .filter(cart_items::tenant_id.eq(tenant_id)),
        )
        .execute(conn)
        .await?;

        touch_cart(conn, tenant_id, cart_id).await?;
        Ok(affected as u64)
    }
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn find_sku(&self, tenant_id: Uuid, sku_id: Uuid) -> StoreResult<Option<SkuEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let sku = skus::table
            .filter(skus::id.eq(sku_id))
            .filter(skus::tenant_id.eq(tenant_id))
            .select(SkuEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(sku)
    }

    async fn find_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<ProductEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let product = products::table
            .filter(products::id.eq(product_id))
            .filter(products::tenant_id.eq(tenant_id))
            .select(ProductEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(product)
    }

    async fn default_price_list(&self, tenant_id: Uuid) -> StoreResult<Option<PriceListEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let price_list = price_lists::table
            .filter(price_lists::tenant_id.eq(tenant_id))
            .filter(price_lists::is_default.eq(true))
            .select(PriceListEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(price_list)
    }

    async fn price_for_sku(
        &self,
        tenant_id: Uuid,
        price_list_id: Uuid,
        sku_id: Uuid,
    ) -> StoreResult<Option<i64>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let amount = prices::table
            .inner_join(price_lists::table)
            .filter(price_lists::tenant_id.eq(tenant_id))
            .filter(prices::price_list_id.eq(price_list_id))
            .filter(prices::sku_id.eq(sku_id))
            .select(prices::amount_cents)
            .first::<i64>(conn)
            .await
            .optional()?;
        Ok(amount)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn find_order_by_payment_reference(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
    ) -> StoreResult<Option<OrderDetail>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let order = orders::table
            .filter(orders::tenant_id.eq(tenant_id))
            .filter(orders::payment_reference.eq(payment_reference))
            .select(OrderEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        load_optional_detail(conn, order).await
    }

    async fn find_order_by_id(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> StoreResult<Option<OrderDetail>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let order = orders::table
            .filter(orders::id.eq(order_id))
            .filter(orders::tenant_id.eq(tenant_id))
            .select(OrderEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        load_optional_detail(conn, order).await
    }

    async fn find_order_by_number(
        &self,
        tenant_id: Uuid,
        order_number: &str,
    ) -> StoreResult<Option<OrderDetail>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let order = orders::table
            .filter(orders::order_number.eq(order_number))
            .filter(orders::tenant_id.eq(tenant_id))
            .select(OrderEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        load_optional_detail(conn, order).await
    }

    async fn find_user(&self, tenant_id: Uuid, user_id: Uuid) -> StoreResult<Option<UserEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let user = users::table
            .filter(users::id.eq(user_id))
            .filter(users::tenant_id.eq(tenant_id))
            .select(UserEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(user)
    }

    async fn find_billing_customer(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<BillingCustomerEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let customer = billing_customers::table
            .filter(billing_customers::tenant_id.eq(tenant_id))
            .filter(billing_customers::user_id.eq(user_id))
            .select(BillingCustomerEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(customer)
    }

    async fn commit_order(&self, draft: OrderDraft) -> StoreResult<OrderDetail> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        let timeout_ms = self.statement_timeout.as_millis();
        let payment_reference = draft.order.payment_reference.clone();

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                diesel::sql_query(format!("SET LOCAL statement_timeout = {timeout_ms}"))
                    .execute(conn)
                    .await?;

                let tenant_id = draft.tenant_id;
                let user_id = resolve_user(conn, tenant_id, &draft.customer).await?;

                diesel::insert_into(billing_customers::table)
                    .values(CreateBillingCustomerEntity {
                        id: Uuid::new_v4(),
                        tenant_id,
                        user_id,
                        gateway_customer_id: draft.gateway_customer_id.clone(),
                    })
                    .on_conflict((billing_customers::tenant_id, billing_customers::user_id))
                    .do_update()
                    .set(billing_customers::gateway_customer_id.eq(&draft.gateway_customer_id))
                    .execute(conn)
                    .await?;

                diesel::insert_into(addresses::table)
                    .values(vec![
                        draft.shipping_address.clone(),
                        draft.billing_address.clone(),
                    ])
                    .execute(conn)
                    .await?;

                diesel::insert_into(payments::table)
                    .values(draft.payment.clone())
                    .execute(conn)
                    .await?;

                let mut order: Option<OrderEntity> = None;
                for candidate in &draft.order_number_candidates {
                    order = diesel::insert_into(orders::table)
                        .values(draft.order_row(candidate, user_id))
                        .on_conflict(orders::order_number)
                        .do_nothing()
                        .returning(OrderEntity::as_returning())
                        .get_result(conn)
                        .await
                        .optional()?;

                    if order.is_some() {
                        break;
                    }
                    warn!(order_number = %candidate, "Order number already taken, trying next candidate");
                }
                let order = order.ok_or(StoreError::OrderNumberExhausted {
                    attempts: draft.order_number_candidates.len(),
                })?;

                diesel::insert_into(order_items::table)
                    .values(draft.items.clone())
                    .execute(conn)
                    .await?;

                for line in &draft.stock {
                    if !decrement_stock_in(conn, tenant_id, line.sku_id, line.quantity).await? {
                        return Err(StoreError::InsufficientStock {
                            sku_id: line.sku_id,
                            requested: line.quantity,
                        });
                    }
                }

                let converted = diesel::update(
                    carts::table
                        .filter(carts::id.eq(draft.cart_id))
                        .filter(carts::tenant_id.eq(tenant_id))
                        .filter(carts::status.eq(CartStatus::Open.as_str())),
                )
                .set((
                    carts::status.eq(CartStatus::Converted.as_str()),
                    carts::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)
                .await?;

                if converted == 0 {
                    return Err(StoreError::CartNotOpen {
                        cart_id: draft.cart_id,
                    });
                }

                diesel::update(payments::table.find(draft.payment.id))
                    .set((
                        payments::order_id.eq(Some(order.id)),
                        payments::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await?;

                Ok(load_detail(conn, order).await?)
            }
            .scope_boxed()
        })
        .await
        .map_err(|err| classify(err, &payment_reference))
    }

    async fn transition_order_status(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> StoreResult<Option<OrderEntity>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;
        let from: Vec<&str> = from.iter().map(|status| status.as_str()).collect();

        let order = diesel::update(
            orders::table
                .filter(orders::id.eq(order_id))
                .filter(orders::tenant_id.eq(tenant_id))
                .filter(orders::status.eq_any(from)),
        )
        .set((
            orders::status.eq(to.as_str()),
            orders::updated_at.eq(diesel::dsl::now),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .optional()?;
        Ok(order)
    }
}

#[async_trait]
impl InventoryRepository for PgStore {
    async fn decrement_stock(
        &self,
        tenant_id: Uuid,
        sku_id: Uuid,
        quantity: i32,
    ) -> StoreResult<bool> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        Ok(decrement_stock_in(conn, tenant_id, sku_id, quantity).await?)
    }

    async fn quantity_on_hand(&self, tenant_id: Uuid, sku_id: Uuid) -> StoreResult<Option<i32>> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        let quantity = skus::table
            .filter(skus::id.eq(sku_id))
            .filter(skus::tenant_id.eq(tenant_id))
            .select(skus::quantity_on_hand)
            .first::<i32>(conn)
            .await
            .optional()?;
        Ok(quantity)
    }
}
