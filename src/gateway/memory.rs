use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::gateway::{GatewayCustomer, GatewayError, PaymentGateway, PaymentIntent};

/// In-memory payment provider for tests and local runs.
///
/// Data is keyed by tenant. `set_unreachable` makes every call fail the way a
/// network outage would. Every call yields once so concurrent checkouts
/// interleave at the gateway like they would against a real provider.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    intents: RwLock<HashMap<(Uuid, String), PaymentIntent>>,
    customers: RwLock<HashMap<(Uuid, String), GatewayCustomer>>,
    unreachable: AtomicBool,
    intent_lookups: AtomicUsize,
    customers_created: AtomicUsize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_intent(&self, tenant_id: Uuid, intent: PaymentIntent) {
        self.intents
            .write()
            .await
            .insert((tenant_id, intent.id.clone()), intent);
    }

    pub async fn insert_customer(&self, tenant_id: Uuid, customer: GatewayCustomer) {
        self.customers
            .write()
            .await
            .insert((tenant_id, customer.email.clone()), customer);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn intent_lookups(&self) -> usize {
        self.intent_lookups.load(Ordering::SeqCst)
    }

    pub fn customers_created(&self) -> usize {
        self.customers_created.load(Ordering::SeqCst)
    }

    async fn call(&self) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn get_payment_intent(
        &self,
        tenant_id: Uuid,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        self.call().await?;
        self.intent_lookups.fetch_add(1, Ordering::SeqCst);

        self.intents
            .read()
            .await
            .get(&(tenant_id, payment_intent_id.to_string()))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(payment_intent_id.to_string()))
    }

    async fn get_customer_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<GatewayCustomer>, GatewayError> {
        self.call().await?;

        Ok(self
            .customers
            .read()
            .await
            .get(&(tenant_id, email.to_string()))
            .cloned())
    }

    async fn create_customer(
        &self,
        tenant_id: Uuid,
        email: &str,
        name: Option<&str>,
    ) -> Result<GatewayCustomer, GatewayError> {
        self.call().await?;

        let mut customers = self.customers.write().await;
        let customer = customers
            .entry((tenant_id, email.to_string()))
            .or_insert_with(|| {
                self.customers_created.fetch_add(1, Ordering::SeqCst);
                GatewayCustomer {
                    id: format!("cus_mock_{}", Uuid::new_v4().simple()),
                    email: email.to_string(),
                    name: name.map(str::to_string),
                }
            });
        Ok(customer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PaymentIntentStatus;

    #[tokio::test]
    async fn intents_are_tenant_scoped() {
        let gateway = InMemoryGateway::new();
        let tenant_id = Uuid::new_v4();
        gateway
            .insert_intent(
                tenant_id,
                PaymentIntent {
                    id: "pi_1".into(),
                    status: PaymentIntentStatus::Succeeded,
                    amount_cents: 100,
                    currency: "usd".into(),
                    receipt_email: None,
                    customer_id: None,
                    metadata: HashMap::new(),
                },
            )
            .await;

        assert!(gateway.get_payment_intent(tenant_id, "pi_1").await.is_ok());
        let err = gateway
            .get_payment_intent(Uuid::new_v4(), "pi_1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(gateway.intent_lookups(), 2);
    }

    #[tokio::test]
    async fn unreachable_fails_every_call() {
        let gateway = InMemoryGateway::new();
        gateway.set_unreachable(true);

        let err = gateway
            .get_customer_by_email(Uuid::new_v4(), "a@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unreachable(_)));
    }

    #[tokio::test]
    async fn create_customer_is_keyed_by_email() {
        let gateway = InMemoryGateway::new();
        let tenant_id = Uuid::new_v4();

        let first = gateway
            .create_customer(tenant_id, "a@example.com", Some("Ada"))
            .await
            .unwrap();
        let second = gateway
            .create_customer(tenant_id, "a@example.com", None)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.customers_created(), 1);
    }
}
