#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use storefront_orderservice::{
    app_state::AppState,
    config::{CartConfig, CheckoutConfig},
    events::{OrderCreatedEvent, OrderEvents},
    gateway::{InMemoryGateway, PaymentIntent, PaymentIntentStatus},
    models::{
        CreatePriceListEntity, CreateProductEntity, CreateSkuEntity, CreateUserEntity,
        PriceEntity, UserEntity,
    },
    store::MemoryStore,
};
use uuid::Uuid;

pub const SHIPPING_ADDRESS: &str = r#"{"name":"Ada Lovelace","line1":"12 St James's Square","city":"London","postal_code":"SW1Y 4JH","country":"GB"}"#;

/// Records published events. Can be told to fail every publish.
#[derive(Default)]
pub struct RecordingEvents {
    pub published: Mutex<Vec<OrderCreatedEvent>>,
    pub fail: bool,
}

#[async_trait]
impl OrderEvents for RecordingEvents {
    async fn order_created(&self, event: &OrderCreatedEvent) -> Result<()> {
        if self.fail {
            bail!("broker down");
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<InMemoryGateway>,
    pub events: Arc<RecordingEvents>,
    pub state: AppState,
    pub tenant_id: Uuid,
    pub other_tenant_id: Uuid,
    price_lists: HashMap<Uuid, Uuid>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_events(RecordingEvents::default()).await
    }

    pub async fn with_events(events: RecordingEvents) -> Self {
        Self::build(events, Duration::from_secs(2)).await
    }

    pub async fn with_commit_timeout(commit_timeout: Duration) -> Self {
        Self::build(RecordingEvents::default(), commit_timeout).await
    }

    async fn build(events: RecordingEvents, commit_timeout: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(InMemoryGateway::new());
        let events = Arc::new(events);

        let state = AppState::new(
            store.clone(),
            gateway.clone(),
            events.clone(),
            CartConfig::default(),
            CheckoutConfig {
                commit_timeout,
                ..CheckoutConfig::default()
            },
        );

        let tenant_id = Uuid::new_v4();
        let other_tenant_id = Uuid::new_v4();
        let mut price_lists = HashMap::new();
        for tenant in [tenant_id, other_tenant_id] {
            let list = store
                .insert_price_list(CreatePriceListEntity {
                    id: Uuid::new_v4(),
                    tenant_id: tenant,
                    name: "Default".into(),
                    is_default: true,
                })
                .await;
            price_lists.insert(tenant, list.id);
        }

        Self {
            store,
            gateway,
            events,
            state,
            tenant_id,
            other_tenant_id,
            price_lists,
        }
    }

    /// Adds a product with one SKU priced in the tenant's default list.
    pub async fn sku_in(
        &self,
        tenant_id: Uuid,
        name: &str,
        code: &str,
        price_cents: i64,
        stock: i32,
        options: Value,
    ) -> Uuid {
        let product = self
            .store
            .insert_product(CreateProductEntity {
                id: Uuid::new_v4(),
                tenant_id,
                name: name.into(),
            })
            .await;
        let sku = self
            .store
            .insert_sku(CreateSkuEntity {
                id: Uuid::new_v4(),
                tenant_id,
                product_id: product.id,
                code: code.into(),
                option_values: options,
                quantity_on_hand: stock,
            })
            .await;
        self.set_price(tenant_id, sku.id, price_cents).await;
        sku.id
    }

    pub async fn sku(&self, name: &str, code: &str, price_cents: i64, stock: i32) -> Uuid {
        self.sku_in(self.tenant_id, name, code, price_cents, stock, json!([]))
            .await
    }

    pub async fn set_price(&self, tenant_id: Uuid, sku_id: Uuid, price_cents: i64) {
        self.store
            .insert_price(PriceEntity {
                price_list_id: self.price_lists[&tenant_id],
                sku_id,
                amount_cents: price_cents,
            })
            .await;
    }

    pub async fn user(&self, email: &str, name: &str) -> UserEntity {
        self.store
            .insert_user(CreateUserEntity {
                id: Uuid::new_v4(),
                tenant_id: self.tenant_id,
                email: email.into(),
                name: Some(name.into()),
                is_guest: false,
            })
            .await
    }

    /// A fresh open cart in `tenant_id` holding `lines`.
    pub async fn cart_in(&self, tenant_id: Uuid, lines: &[(Uuid, i32)]) -> Uuid {
        let (cart, _token) = self
            .state
            .carts
            .get_or_create(tenant_id, None)
            .await
            .unwrap();
        for &(sku_id, quantity) in lines {
            self.state
                .carts
                .add_item(tenant_id, cart.id, sku_id, quantity)
                .await
                .unwrap();
        }
        cart.id
    }

    pub async fn cart(&self, lines: &[(Uuid, i32)]) -> Uuid {
        self.cart_in(self.tenant_id, lines).await
    }

    /// Registers a succeeded payment for `cart_id` with the gateway of `tenant_id`.
    pub async fn pay(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
        cart_id: Uuid,
        amount_cents: i64,
        tax_cents: i64,
        shipping_cents: i64,
    ) {
        self.payment(
            tenant_id,
            payment_reference,
            cart_id,
            amount_cents,
            tax_cents,
            shipping_cents,
            PaymentIntentStatus::Succeeded,
            Some("ada@example.com"),
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn payment(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
        cart_id: Uuid,
        amount_cents: i64,
        tax_cents: i64,
        shipping_cents: i64,
        status: PaymentIntentStatus,
        receipt_email: Option<&str>,
    ) {
        let mut intent = self.intent(payment_reference, cart_id, amount_cents);
        intent.status = status;
        intent.receipt_email = receipt_email.map(str::to_string);
        intent
            .metadata
            .insert("tax_cents".into(), tax_cents.to_string());
        intent
            .metadata
            .insert("shipping_cents".into(), shipping_cents.to_string());
        self.gateway.insert_intent(tenant_id, intent).await;
    }

    /// A succeeded guest intent for `cart_id`, not yet registered with the gateway.
    pub fn intent(&self, payment_reference: &str, cart_id: Uuid, amount_cents: i64) -> PaymentIntent {
        let metadata: HashMap<String, String> = [
            ("cart_id", cart_id.to_string()),
            ("shipping_address", SHIPPING_ADDRESS.to_string()),
            ("customer_notes", "Leave at the door".to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        PaymentIntent {
            id: payment_reference.into(),
            status: PaymentIntentStatus::Succeeded,
            amount_cents,
            currency: "usd".into(),
            receipt_email: Some("ada@example.com".into()),
            customer_id: None,
            metadata,
        }
    }

    pub async fn stock(&self, sku_id: Uuid) -> i32 {
        self.state
            .inventory
            .on_hand(self.tenant_id, sku_id)
            .await
            .unwrap()
    }

    /// Waits for the spawned event publisher to run.
    pub async fn published_events(&self, expected: usize) -> Vec<OrderCreatedEvent> {
        for _ in 0..50 {
            if self.events.published.lock().unwrap().len() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events.published.lock().unwrap().clone()
    }
}
