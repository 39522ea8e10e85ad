use std::sync::Arc;

use crate::{
    config::{CartConfig, CheckoutConfig},
    events::OrderEvents,
    gateway::PaymentGateway,
    services::{CartService, InventoryLedger, OrderAssembler, OrderService, PricingResolver},
    store::Store,
};

/// Components shared by every consumer, built once at startup.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub carts: CartService,
    pub orders: OrderService,
    pub checkout: OrderAssembler,
    pub inventory: InventoryLedger,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn OrderEvents>,
        cart_config: CartConfig,
        checkout_config: CheckoutConfig,
    ) -> Self {
        let pricing = PricingResolver::new(Arc::clone(&store));

        Self {
            carts: CartService::new(Arc::clone(&store), pricing, cart_config),
            orders: OrderService::new(Arc::clone(&store)),
            checkout: OrderAssembler::new(Arc::clone(&store), gateway, events, checkout_config),
            inventory: InventoryLedger::new(Arc::clone(&store)),
            store,
        }
    }
}
