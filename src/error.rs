//! Typed failures of the checkout core.
//!
//! Every failure the cart and order paths can produce is a variant of
//! [`CheckoutError`]. Callers match on the variant or on its [`ErrorKind`]
//! instead of comparing messages.

use thiserror::Error;
use uuid::Uuid;

use crate::{gateway::GatewayError, store::StoreError};

/// Coarse classification used for retry decisions and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any I/O.
    Validation,
    NotFound,
    /// The request collides with state that already exists.
    Conflict,
    /// A finite resource (stock) ran out.
    Exhausted,
    /// Store or payment gateway failure. Safe to retry.
    Upstream,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Quantity {quantity} is not allowed")]
    InvalidQuantity { quantity: i32 },

    #[error("Invalid {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("Invalid payment metadata `{field}`: {message}")]
    InvalidPaymentMetadata { field: &'static str, message: String },

    #[error("Cart {cart_ref} not found")]
    CartNotFound { cart_ref: String },

    #[error("Order {reference} not found")]
    OrderNotFound { reference: String },

    #[error("SKU {sku_id} not found")]
    SkuNotFound { sku_id: Uuid },

    #[error("No price for SKU {sku_id}")]
    PriceNotFound { sku_id: Uuid },

    #[error("Customer {user_id} not found")]
    CustomerNotFound { user_id: Uuid },

    #[error("Payment {payment_reference} not found")]
    PaymentNotFound { payment_reference: String },

    #[error("Cart {cart_id} belongs to another tenant")]
    TenantMismatch { cart_id: Uuid },

    #[error("Cart {cart_id} has already been converted to an order")]
    CartAlreadyConverted { cart_id: Uuid },

    #[error("Payment {payment_reference} has already been processed")]
    PaymentAlreadyProcessed { payment_reference: String },

    #[error("Payment {payment_reference} is {status}, not succeeded")]
    PaymentNotSucceeded {
        payment_reference: String,
        status: String,
    },

    #[error("Cart {cart_id} is empty")]
    EmptyCart { cart_id: Uuid },

    #[error("Total of cart {cart_id} is out of range")]
    TotalOutOfRange { cart_id: Uuid },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        order_id: Uuid,
        from: String,
        to: String,
    },

    #[error("Insufficient stock for SKU {sku_id} (requested {requested})")]
    InsufficientStock { sku_id: Uuid, requested: i32 },

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Checkout did not finish within the deadline")]
    Timeout,
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuantity { .. }
            | Self::InvalidIdentifier { .. }
            | Self::InvalidPaymentMetadata { .. }
            | Self::PaymentNotSucceeded { .. }
            | Self::EmptyCart { .. }
            | Self::TotalOutOfRange { .. }
            | Self::TenantMismatch { .. } => ErrorKind::Validation,
            Self::CartNotFound { .. }
            | Self::OrderNotFound { .. }
            | Self::SkuNotFound { .. }
            | Self::PriceNotFound { .. }
            | Self::CustomerNotFound { .. }
            | Self::PaymentNotFound { .. } => ErrorKind::NotFound,
            Self::CartAlreadyConverted { .. }
            | Self::PaymentAlreadyProcessed { .. }
            | Self::InvalidStatusTransition { .. } => ErrorKind::Conflict,
            Self::InsufficientStock { .. } => ErrorKind::Exhausted,
            Self::Gateway(err) if err.is_not_found() => ErrorKind::NotFound,
            Self::Store(err) if !err.is_transient() => ErrorKind::Conflict,
            Self::Gateway(_) | Self::Store(_) | Self::Timeout => ErrorKind::Upstream,
        }
    }

    /// The kind of resource the failure is about.
    pub fn resource(&self) -> &'static str {
        match self {
            Self::InvalidQuantity { .. } => "quantity",
            Self::InvalidIdentifier { field, .. } | Self::InvalidPaymentMetadata { field, .. } => {
                *field
            }
            Self::CartNotFound { .. }
            | Self::TenantMismatch { .. }
            | Self::CartAlreadyConverted { .. }
            | Self::EmptyCart { .. }
            | Self::TotalOutOfRange { .. } => "cart",
            Self::OrderNotFound { .. } | Self::InvalidStatusTransition { .. } => "order",
            Self::SkuNotFound { .. } | Self::InsufficientStock { .. } => "sku",
            Self::PriceNotFound { .. } => "price",
            Self::CustomerNotFound { .. } => "customer",
            Self::PaymentNotFound { .. }
            | Self::PaymentAlreadyProcessed { .. }
            | Self::PaymentNotSucceeded { .. } => "payment",
            Self::Gateway(_) => "payment_gateway",
            Self::Store(_) | Self::Timeout => "store",
        }
    }

    /// Webhook deliveries failing with a retryable error should be redelivered.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Upstream
    }

    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::Exhausted => 409,
            ErrorKind::Upstream => match self {
                Self::Timeout => 504,
                Self::Gateway(_) => 502,
                _ => 500,
            },
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock { sku_id, requested } => {
                Self::InsufficientStock { sku_id, requested }
            }
            StoreError::CartNotOpen { cart_id } => Self::CartAlreadyConverted { cart_id },
            StoreError::DuplicatePaymentReference { payment_reference } => {
                Self::PaymentAlreadyProcessed { payment_reference }
            }
            StoreError::UserNotFound { user_id } => Self::CustomerNotFound { user_id },
            other => Self::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_outcomes_become_domain_errors() {
        let sku_id = Uuid::new_v4();
        let err: CheckoutError = StoreError::InsufficientStock {
            sku_id,
            requested: 4,
        }
        .into();
        assert!(matches!(err, CheckoutError::InsufficientStock { requested: 4, .. }));
        assert_eq!(err.kind(), ErrorKind::Exhausted);
        assert_eq!(err.resource(), "sku");

        let err: CheckoutError = StoreError::Pool("timed out".into()).into();
        assert!(matches!(err, CheckoutError::Store(_)));
        assert!(err.is_retryable());
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = CheckoutError::TenantMismatch {
            cart_id: Uuid::new_v4(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.http_status(), 400);

        let err = CheckoutError::CartAlreadyConverted {
            cart_id: Uuid::new_v4(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn gateway_not_found_is_not_retryable() {
        let err = CheckoutError::from(GatewayError::NotFound("pi_123".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = CheckoutError::from(GatewayError::Unreachable("connection refused".into()));
        assert!(err.is_retryable());
        assert_eq!(err.http_status(), 502);
        assert_eq!(CheckoutError::Timeout.http_status(), 504);
    }

    #[test]
    fn constraint_violations_are_not_retried() {
        let violation = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::CheckViolation,
            Box::new("new row violates check constraint".to_string()),
        );
        let err = CheckoutError::from(StoreError::Database(violation));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());

        let lost = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::ClosedConnection,
            Box::new("server closed the connection".to_string()),
        );
        assert!(CheckoutError::from(StoreError::Database(lost)).is_retryable());
    }

    #[test]
    fn display_names_the_sku() {
        let sku_id = Uuid::nil();
        let err = CheckoutError::InsufficientStock {
            sku_id,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for SKU 00000000-0000-0000-0000-000000000000 (requested 2)"
        );
    }
}
