use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    Connection,
    options::{BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{app_state::AppState, consumers::Consumer};

const CONSUMER_TAG: &str = "storefront-orderservice";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Loads `.env` if present. Real environment variables win.
pub fn init_env() {
    if let Err(err) = dotenvy::dotenv() {
        info!("No .env file loaded: {err}");
    }
}

/// Starts one consumer per queue, each on its own channel.
///
/// Every delivery is handled on its own task. Handler errors are logged; the
/// handler is responsible for acking its delivery.
pub async fn run_consumers(
    connection: &Connection,
    state: Arc<AppState>,
    prefetch: u16,
    consumers: &[(&'static str, Consumer)],
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(consumers.len());

    for &(queue, handler) in consumers {
        let channel = connection
            .create_channel()
            .await
            .with_context(|| format!("Failed to open a channel for {queue}"))?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .context("Failed to set prefetch")?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to declare queue {queue}"))?;

        let mut consumer = channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to consume {queue}"))?;

        info!(queue, "Consumer started");
        let state = Arc::clone(&state);

        handles.push(tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(err) = handler(delivery, state).await {
                                error!(queue, error = %err, "Failed to handle delivery");
                            }
                        });
                    }
                    Err(err) => {
                        error!(queue, error = %err, "Consumer stream failed");
                        break;
                    }
                }
            }
            warn!(queue, "Consumer stopped");
        }));
    }

    Ok(handles)
}
