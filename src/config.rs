//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `AMQP_URL` - Broker URL (default: amqp://localhost:5672/%2f)
//! - `AMQP_PREFETCH` - Unacked deliveries per consumer (default: 16)
//! - `ORDER_EVENTS_ENABLED` - Publish `OrderCreated` to the broker, otherwise only log it (default: true)
//! - `PAYMENT_GATEWAY_URL` - Payments service base URL (default: http://localhost:3000/payments-service)
//! - `PAYMENT_GATEWAY_TIMEOUT_MS` - Per-request timeout (default: 5000)
//! - `SESSION_TOKEN_BYTES` - Random bytes per session token (default: 32)
//! - `ORDER_NUMBER_PREFIX` - Order number prefix (default: ORD)
//! - `ORDER_NUMBER_ATTEMPTS` - Order number candidates per checkout (default: 5)
//! - `CHECKOUT_COMMIT_TIMEOUT_MS` - Deadline of the order commit (default: 5000)

use std::{fmt::Display, str::FromStr, time::Duration};

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_AMQP_URL: &str = "amqp://localhost:5672/%2f";
const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000/payments-service";
const MIN_SESSION_TOKEN_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub amqp: AmqpConfig,
    pub gateway: GatewayConfig,
    pub cart: CartConfig,
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Contains the password.
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub url: String,
    pub prefetch: u16,
    pub publish_order_events: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            timeout: Duration::from_millis(5000),
        }
    }
}

/// Cart store settings.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Random bytes per session token. 32 bytes is 256 bits.
    pub session_token_bytes: usize,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            session_token_bytes: 32,
        }
    }
}

/// Order assembler settings.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub order_number_prefix: String,
    /// Order number candidates generated per checkout.
    pub order_number_attempts: usize,
    /// Upper bound for the atomic commit, also used as its statement timeout.
    pub commit_timeout: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            order_number_prefix: "ORD".to_string(),
            order_number_attempts: 5,
            commit_timeout: Duration::from_millis(5000),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or any value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let cart_defaults = CartConfig::default();
        let checkout_defaults = CheckoutConfig::default();

        let session_token_bytes =
            env.parse_or("SESSION_TOKEN_BYTES", cart_defaults.session_token_bytes)?;
        if session_token_bytes < MIN_SESSION_TOKEN_BYTES {
            return Err(ConfigError::InvalidEnvVar(
                "SESSION_TOKEN_BYTES".to_string(),
                format!("must be at least {MIN_SESSION_TOKEN_BYTES}"),
            ));
        }

        let order_number_attempts =
            env.parse_or("ORDER_NUMBER_ATTEMPTS", checkout_defaults.order_number_attempts)?;
        if order_number_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ORDER_NUMBER_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database: DatabaseConfig {
                url: SecretString::from(env.required("DATABASE_URL")?),
                max_connections: env.parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            amqp: AmqpConfig {
                url: env.or("AMQP_URL", DEFAULT_AMQP_URL),
                prefetch: env.parse_or("AMQP_PREFETCH", 16)?,
                publish_order_events: env.parse_or("ORDER_EVENTS_ENABLED", true)?,
            },
            gateway: GatewayConfig {
                base_url: env.or("PAYMENT_GATEWAY_URL", DEFAULT_GATEWAY_URL),
                timeout: env.millis_or("PAYMENT_GATEWAY_TIMEOUT_MS", GatewayConfig::default().timeout)?,
            },
            cart: CartConfig {
                session_token_bytes,
            },
            checkout: CheckoutConfig {
                order_number_prefix: env.or(
                    "ORDER_NUMBER_PREFIX",
                    &checkout_defaults.order_number_prefix,
                ),
                order_number_attempts,
                commit_timeout: env
                    .millis_or("CHECKOUT_COMMIT_TIMEOUT_MS", checkout_defaults.commit_timeout)?,
            },
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|err: T::Err| ConfigError::InvalidEnvVar(key.to_string(), err.to_string())),
            None => Ok(default),
        }
    }

    fn millis_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let millis = self.parse_or(key, default.as_millis() as u64)?;
        Ok(Duration::from_millis(millis))
    }
}
