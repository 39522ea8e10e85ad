use std::sync::Arc;

use anyhow::{Context, Result};
use lapin::{Connection, ConnectionProperties};
use storefront_orderservice::{
    app_state::AppState,
    bootstrap, consumers,
    config::AppConfig,
    db,
    events::{AmqpOrderEvents, LoggingOrderEvents, OrderEvents},
    gateway::HttpPaymentGateway,
    store::PgStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = AppConfig::from_env()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(&config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    tracing::info!("Bootstrapping...");
    let db_pool = db::create_pool(&config.database).await?;
    let store = Arc::new(PgStore::new(db_pool, config.checkout.commit_timeout));
    let gateway = Arc::new(HttpPaymentGateway::new(&config.gateway)?);

    let connection = Connection::connect(&config.amqp.url, ConnectionProperties::default())
        .await
        .context("Failed to connect to the message broker")?;
    let events: Arc<dyn OrderEvents> = if config.amqp.publish_order_events {
        Arc::new(AmqpOrderEvents::new(&connection).await?)
    } else {
        tracing::info!("OrderCreated events are logged, not published");
        Arc::new(LoggingOrderEvents)
    };

    let state = Arc::new(AppState::new(
        store,
        gateway,
        events,
        config.cart.clone(),
        config.checkout.clone(),
    ));

    let handles = bootstrap::run_consumers(
        &connection,
        state,
        config.amqp.prefetch,
        &consumers::all(),
    )
    .await?;
    tracing::info!("OrderService is consuming {} queue(s)", handles.len());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    for handle in handles {
        handle.abort();
    }
    connection
        .close(200, "shutdown")
        .await
        .context("Failed to close the broker connection")?;

    Ok(())
}
