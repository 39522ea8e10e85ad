//! Turns a confirmed payment into an order.
//!
//! The flow runs in two halves. Everything up to the draft is read-only and
//! fails with typed errors before any write. The draft is then handed to the
//! store, which applies it in one transaction. The payment reference is the
//! idempotency key: a replay of the same reference returns the order that
//! already exists instead of creating a second one.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::CheckoutConfig,
    error::{CheckoutError, Result},
    events::{OrderCreatedEvent, OrderEvents},
    gateway::{CheckoutMetadata, GatewayError, MAX_PROVIDER_ID_LEN, PaymentGateway, PaymentIntent},
    models::{CartEntity, CartItemEntity, CreateOrderItemEntity, CreatePaymentEntity, OrderDetail},
    services::{InventoryLedger, OrderNumberGenerator},
    store::{CustomerDraft, OrderDraft, OrderHeaderDraft, StoreError, Store},
};

const MAX_EMAIL_LEN: usize = 320;

/// Who pays, as resolved before the commit.
struct Identity {
    customer: CustomerDraft,
    email: String,
    name: Option<String>,
    /// Existing local link to a gateway customer, if any.
    linked_gateway_customer: Option<String>,
}

pub struct OrderAssembler {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn OrderEvents>,
    order_numbers: OrderNumberGenerator,
    config: CheckoutConfig,
}

impl OrderAssembler {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn OrderEvents>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            order_numbers: OrderNumberGenerator::new(config.order_number_prefix.clone()),
            config,
        }
    }

    /// Creates the order for `payment_reference`, or returns the one that exists.
    ///
    /// Safe to call repeatedly and concurrently with the same reference. Any
    /// failure after validation rolls back completely and can be retried.
    pub async fn create_from_payment_reference(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
    ) -> Result<OrderDetail> {
        let payment_reference = payment_reference.trim();
        if payment_reference.is_empty() || payment_reference.chars().count() > MAX_PROVIDER_ID_LEN {
            return Err(CheckoutError::InvalidIdentifier {
                field: "payment_reference",
                value: payment_reference.to_string(),
            });
        }

        if let Some(existing) = self.existing_order(tenant_id, payment_reference).await? {
            return Ok(existing);
        }

        let intent = self.confirmed_payment(tenant_id, payment_reference).await?;
        let metadata = CheckoutMetadata::parse(&intent.metadata)?;

        let cart = match self.checkout_cart(tenant_id, metadata.cart_id).await {
            Err(CheckoutError::CartAlreadyConverted { cart_id }) => {
                // A concurrent delivery may have converted it for this very payment.
                return self
                    .existing_order(tenant_id, payment_reference)
                    .await?
                    .ok_or(CheckoutError::CartAlreadyConverted { cart_id });
            }
            other => other?,
        };

        let items = self.store.cart_items(tenant_id, cart.id).await?;
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart { cart_id: cart.id });
        }

        let identity = self.identity(&cart, &intent, &metadata).await?;
        let draft = self
            .draft(&cart, &items, payment_reference, &intent, metadata, identity)
            .await?;

        let Ok(committed) =
            tokio::time::timeout(self.config.commit_timeout, self.store.commit_order(draft)).await
        else {
            warn!(%tenant_id, payment_reference, "Order commit timed out");
            // The commit may have landed with only its acknowledgement lost.
            let detail = self
                .existing_order(tenant_id, payment_reference)
                .await?
                .ok_or(CheckoutError::Timeout)?;
            self.publish(&detail);
            return Ok(detail);
        };

        let detail = match committed {
            Ok(detail) => detail,
            Err(
                err @ (StoreError::DuplicatePaymentReference { .. } | StoreError::CartNotOpen { .. }),
            ) => {
                info!(%tenant_id, payment_reference, "Lost the commit race, reading the winner");
                return self
                    .existing_order(tenant_id, payment_reference)
                    .await?
                    .ok_or_else(|| err.into());
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            %tenant_id,
            payment_reference,
            order_number = %detail.order.order_number,
            cart_id = %cart.id,
            total_cents = detail.order.total_cents,
            "Order created"
        );
        self.publish(&detail);

        Ok(detail)
    }

    async fn existing_order(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
    ) -> Result<Option<OrderDetail>> {
        let existing = self
            .store
            .find_order_by_payment_reference(tenant_id, payment_reference)
            .await?;

        if let Some(detail) = &existing {
            info!(
                %tenant_id,
                payment_reference,
                order_number = %detail.order.order_number,
                "Order already exists for payment"
            );
        }
        Ok(existing)
    }

    async fn confirmed_payment(
        &self,
        tenant_id: Uuid,
        payment_reference: &str,
    ) -> Result<PaymentIntent> {
        let intent = self
            .gateway
            .get_payment_intent(tenant_id, payment_reference)
            .await
            .map_err(|err| match err {
                GatewayError::NotFound(_) => CheckoutError::PaymentNotFound {
                    payment_reference: payment_reference.to_string(),
                },
                other => CheckoutError::Gateway(other),
            })?;

        if !intent.status.is_succeeded() {
            return Err(CheckoutError::PaymentNotSucceeded {
                payment_reference: payment_reference.to_string(),
                status: intent.status.as_str().to_string(),
            });
        }
        Ok(intent)
    }

    async fn checkout_cart(&self, tenant_id: Uuid, cart_id: Uuid) -> Result<CartEntity> {
        let cart = self
            .store
            .find_cart_for_checkout(cart_id)
            .await?
            .ok_or_else(|| CheckoutError::CartNotFound {
                cart_ref: cart_id.to_string(),
            })?;

        if cart.tenant_id != tenant_id {
            warn!(%tenant_id, %cart_id, "Payment references a cart of another tenant");
            return Err(CheckoutError::TenantMismatch { cart_id });
        }
        if !cart.is_open() {
            return Err(CheckoutError::CartAlreadyConverted { cart_id });
        }
        Ok(cart)
    }

    async fn identity(
        &self,
        cart: &CartEntity,
        intent: &PaymentIntent,
        metadata: &CheckoutMetadata,
    ) -> Result<Identity> {
        match cart.user_id {
            Some(user_id) => {
                let user = self
                    .store
                    .find_user(cart.tenant_id, user_id)
                    .await?
                    .ok_or(CheckoutError::CustomerNotFound { user_id })?;
                let linked = self
                    .store
                    .find_billing_customer(cart.tenant_id, user_id)
                    .await?
                    .map(|link| link.gateway_customer_id);

                Ok(Identity {
                    customer: CustomerDraft::Existing { user_id },
                    email: user.email,
                    name: user.name,
                    linked_gateway_customer: linked,
                })
            }
            None => {
                let email = intent
                    .receipt_email
                    .as_deref()
                    .map(str::trim)
                    .filter(|email| !email.is_empty())
                    .ok_or(CheckoutError::InvalidPaymentMetadata {
                        field: "receipt_email",
                        message: "guest checkout needs a receipt email".to_string(),
                    })?
                    .to_lowercase();
                if email.chars().count() > MAX_EMAIL_LEN {
                    return Err(CheckoutError::InvalidPaymentMetadata {
                        field: "receipt_email",
                        message: format!("longer than {MAX_EMAIL_LEN} characters"),
                    });
                }
                let name = Some(metadata.shipping_address.name.clone());

                Ok(Identity {
                    customer: CustomerDraft::Guest {
                        email: email.clone(),
                        name: name.clone(),
                    },
                    email,
                    name,
                    linked_gateway_customer: None,
                })
            }
        }
    }

    /// Reuses the customer linked locally or charged on the intent, then looks
    /// one up by email, and only creates one when none exists.
    async fn gateway_customer(
        &self,
        tenant_id: Uuid,
        identity: &Identity,
        intent: &PaymentIntent,
    ) -> Result<String> {
        let known = identity
            .linked_gateway_customer
            .clone()
            .or_else(|| intent.customer_id.clone().filter(|id| !id.trim().is_empty()));

        let customer_id = match known {
            Some(customer_id) => customer_id,
            None => match self
                .gateway
                .get_customer_by_email(tenant_id, &identity.email)
                .await?
            {
                Some(customer) => customer.id,
                None => {
                    let customer = self
                        .gateway
                        .create_customer(tenant_id, &identity.email, identity.name.as_deref())
                        .await?;
                    info!(%tenant_id, gateway_customer_id = %customer.id, "Created gateway customer");
                    customer.id
                }
            },
        };

        if customer_id.chars().count() > MAX_PROVIDER_ID_LEN {
            return Err(CheckoutError::InvalidIdentifier {
                field: "gateway_customer_id",
                value: customer_id,
            });
        }
        Ok(customer_id)
    }

    async fn draft(
        &self,
        cart: &CartEntity,
        items: &[CartItemEntity],
        payment_reference: &str,
        intent: &PaymentIntent,
        metadata: CheckoutMetadata,
        identity: Identity,
    ) -> Result<OrderDraft> {
        let tenant_id = cart.tenant_id;
        let order_id = Uuid::new_v4();
        let currency = intent.currency_code()?;
        let out_of_range = || CheckoutError::TotalOutOfRange { cart_id: cart.id };

        let mut order_items = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let sku = self
                .store
                .find_sku(tenant_id, item.sku_id)
                .await?
                .ok_or(CheckoutError::SkuNotFound { sku_id: item.sku_id })?;
            let product = self
                .store
                .find_product(tenant_id, sku.product_id)
                .await?
                .ok_or(CheckoutError::SkuNotFound { sku_id: item.sku_id })?;

            order_items.push(CreateOrderItemEntity {
                id: Uuid::new_v4(),
                order_id,
                tenant_id,
                line_number: index as i32 + 1,
                sku_id: sku.id,
                product_name: product.name,
                variant_description: sku.variant_description(),
                sku_code: sku.code,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                line_total_cents: item.checked_line_total_cents().ok_or_else(out_of_range)?,
            });
        }

        let subtotal_cents = order_items
            .iter()
            .try_fold(0i64, |sum, item| sum.checked_add(item.line_total_cents))
            .ok_or_else(out_of_range)?;
        let total_cents = subtotal_cents
            .checked_add(metadata.tax_cents)
            .ok_or_else(|| overflow(CheckoutMetadata::TAX_CENTS))?
            .checked_add(metadata.shipping_cents)
            .ok_or_else(|| overflow(CheckoutMetadata::SHIPPING_CENTS))?;
        if total_cents != intent.amount_cents {
            warn!(
                %tenant_id,
                payment_reference,
                total_cents,
                charged_cents = intent.amount_cents,
                "Order total differs from the charged amount"
            );
        }

        let gateway_customer_id = self.gateway_customer(tenant_id, &identity, intent).await?;

        Ok(OrderDraft {
            tenant_id,
            cart_id: cart.id,
            customer: identity.customer,
            gateway_customer_id,
            shipping_address: metadata.shipping_address.to_entity(tenant_id),
            billing_address: metadata.billing_address.to_entity(tenant_id),
            payment: CreatePaymentEntity {
                id: Uuid::new_v4(),
                tenant_id,
                payment_reference: payment_reference.to_string(),
                amount_cents: intent.amount_cents,
                currency: currency.clone(),
                status: intent.status.as_str().to_string(),
            },
            order: OrderHeaderDraft {
                id: order_id,
                payment_reference: payment_reference.to_string(),
                currency,
                subtotal_cents,
                tax_cents: metadata.tax_cents,
                shipping_cents: metadata.shipping_cents,
                total_cents,
                customer_notes: metadata.customer_notes,
            },
            order_number_candidates: self
                .order_numbers
                .candidates(self.config.order_number_attempts),
            items: order_items,
            stock: InventoryLedger::plan_decrements(items),
        })
    }

    fn publish(&self, detail: &OrderDetail) {
        let events = Arc::clone(&self.events);
        let event = OrderCreatedEvent::from(detail);

        tokio::spawn(async move {
            if let Err(err) = events.order_created(&event).await {
                warn!(
                    tenant_id = %event.tenant_id,
                    order_number = %event.order_number,
                    error = %err,
                    "Failed to publish OrderCreated"
                );
            }
        });
    }
}

fn overflow(field: &'static str) -> CheckoutError {
    CheckoutError::InvalidPaymentMetadata {
        field,
        message: "order total does not fit".to_string(),
    }
}
