//! Payment provider boundary.
//!
//! The checkout core needs three things from the provider: the confirmed
//! payment intent, and a way to find or create the provider-side customer.

pub mod http;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{error::CheckoutError, models::CreateAddressEntity};

pub use http::HttpPaymentGateway;
pub use memory::InMemoryGateway;

/// Upper bound for tax and shipping amounts taken from metadata.
pub const MAX_METADATA_CENTS: i64 = 10_000_000_000;
const MAX_POSTAL_CODE_LEN: usize = 32;
/// Column width of provider-side identifiers.
pub const MAX_PROVIDER_ID_LEN: usize = 128;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{0} not found at the payment provider")]
    NotFound(String),

    #[error("payment provider unreachable: {0}")]
    Unreachable(String),

    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected payment provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl PaymentIntentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
        }
    }

    /// The provider's terminal success state. Nothing else may become an order.
    pub fn is_succeeded(self) -> bool {
        self == Self::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub receipt_email: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// The ISO 4217 code of the charge, lowercased.
    pub fn currency_code(&self) -> Result<String, CheckoutError> {
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(invalid("currency", format!("{currency:?} is not a 3-letter code")));
        }
        Ok(currency.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn get_payment_intent(
        &self,
        tenant_id: Uuid,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn get_customer_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<GatewayCustomer>, GatewayError>;

    async fn create_customer(
        &self,
        tenant_id: Uuid,
        email: &str,
        name: Option<&str>,
    ) -> Result<GatewayCustomer, GatewayError>;
}

/// Postal address as the storefront submits it with the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

impl AddressInput {
    /// Normalizes the country code and checks the fields against their columns.
    fn validated(mut self, field: &'static str) -> Result<Self, CheckoutError> {
        let country = self.country.trim();
        if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(invalid(field, format!("country {country:?} is not a 2-letter code")));
        }
        self.country = country.to_ascii_uppercase();

        if self.postal_code.trim().is_empty() || self.postal_code.chars().count() > MAX_POSTAL_CODE_LEN {
            return Err(invalid(
                field,
                format!("postal_code must be 1 to {MAX_POSTAL_CODE_LEN} characters"),
            ));
        }
        Ok(self)
    }

    /// A fresh snapshot row. Addresses are never shared between orders.
    pub fn to_entity(&self, tenant_id: Uuid) -> CreateAddressEntity {
        CreateAddressEntity {
            id: Uuid::new_v4(),
            tenant_id,
            name: self.name.clone(),
            line1: self.line1.clone(),
            line2: self.line2.clone(),
            city: self.city.clone(),
            region: self.region.clone(),
            postal_code: self.postal_code.clone(),
            country: self.country.clone(),
        }
    }
}

/// Checkout data the storefront attaches to a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub cart_id: Uuid,
    pub shipping_address: AddressInput,
    pub billing_address: AddressInput,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub customer_notes: Option<String>,
}

impl CheckoutMetadata {
    pub const CART_ID: &'static str = "cart_id";
    pub const SHIPPING_ADDRESS: &'static str = "shipping_address";
    pub const BILLING_ADDRESS: &'static str = "billing_address";
    pub const TAX_CENTS: &'static str = "tax_cents";
    pub const SHIPPING_CENTS: &'static str = "shipping_cents";
    pub const CUSTOMER_NOTES: &'static str = "customer_notes";

    pub fn parse(metadata: &HashMap<String, String>) -> Result<Self, CheckoutError> {
        let raw_cart_id = required(metadata, Self::CART_ID)?;
        let cart_id = Uuid::parse_str(raw_cart_id.trim()).map_err(|err| invalid(Self::CART_ID, err))?;

        let shipping_address = address(required(metadata, Self::SHIPPING_ADDRESS)?, Self::SHIPPING_ADDRESS)?;
        let billing_address = match non_empty(metadata, Self::BILLING_ADDRESS) {
            Some(raw) => address(raw, Self::BILLING_ADDRESS)?,
            None => shipping_address.clone(),
        };

        Ok(Self {
            cart_id,
            shipping_address,
            billing_address,
            tax_cents: cents(metadata, Self::TAX_CENTS)?,
            shipping_cents: cents(metadata, Self::SHIPPING_CENTS)?,
            customer_notes: non_empty(metadata, Self::CUSTOMER_NOTES).map(str::to_string),
        })
    }
}

fn invalid(field: &'static str, err: impl ToString) -> CheckoutError {
    CheckoutError::InvalidPaymentMetadata {
        field,
        message: err.to_string(),
    }
}

fn non_empty<'a>(metadata: &'a HashMap<String, String>, field: &str) -> Option<&'a str> {
    metadata
        .get(field)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

fn required<'a>(
    metadata: &'a HashMap<String, String>,
    field: &'static str,
) -> Result<&'a str, CheckoutError> {
    non_empty(metadata, field).ok_or_else(|| invalid(field, "missing"))
}

fn address(raw: &str, field: &'static str) -> Result<AddressInput, CheckoutError> {
    serde_json::from_str::<AddressInput>(raw)
        .map_err(|err| invalid(field, err))?
        .validated(field)
}

fn cents(metadata: &HashMap<String, String>, field: &'static str) -> Result<i64, CheckoutError> {
    let Some(raw) = non_empty(metadata, field) else {
        return Ok(0);
    };

    let value: i64 = raw.trim().parse().map_err(|err| invalid(field, err))?;
    if !(0..=MAX_METADATA_CENTS).contains(&value) {
        return Err(invalid(field, format!("must be between 0 and {MAX_METADATA_CENTS}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPING: &str = r#"{"name":"Ada Lovelace","line1":"1 Main St","city":"London","postal_code":"N1","country":"GB"}"#;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn billing_defaults_to_shipping() {
        let cart_id = Uuid::new_v4().to_string();
        let parsed = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", SHIPPING),
            ("tax_cents", "100"),
        ]))
        .unwrap();

        assert_eq!(parsed.billing_address, parsed.shipping_address);
        assert_eq!(parsed.shipping_address.name, "Ada Lovelace");
        assert_eq!(parsed.tax_cents, 100);
        assert_eq!(parsed.shipping_cents, 0);
        assert_eq!(parsed.customer_notes, None);
    }

    #[test]
    fn rejects_malformed_fields() {
        let err = CheckoutMetadata::parse(&metadata(&[("shipping_address", SHIPPING)])).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidPaymentMetadata { field: "cart_id", .. }));

        let err = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", "not-a-uuid"),
            ("shipping_address", SHIPPING),
        ]))
        .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidPaymentMetadata { field: "cart_id", .. }));

        let cart_id = Uuid::new_v4().to_string();
        let err = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", SHIPPING),
            ("shipping_cents", "-5"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidPaymentMetadata { field: "shipping_cents", .. }
        ));

        let err = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", "{}"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidPaymentMetadata { field: "shipping_address", .. }
        ));
    }

    #[test]
    fn amounts_are_bounded() {
        let cart_id = Uuid::new_v4().to_string();
        let max = i64::MAX.to_string();
        let err = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", SHIPPING),
            ("tax_cents", &max),
        ]))
        .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidPaymentMetadata { field: "tax_cents", .. }));

        let limit = MAX_METADATA_CENTS.to_string();
        let parsed = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", SHIPPING),
            ("shipping_cents", &limit),
        ]))
        .unwrap();
        assert_eq!(parsed.shipping_cents, MAX_METADATA_CENTS);
    }

    #[test]
    fn addresses_must_fit_their_columns() {
        let cart_id = Uuid::new_v4().to_string();
        let usa = r#"{"name":"Ada","line1":"1 Main St","city":"Boston","postal_code":"02108","country":"USA"}"#;
        let err = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", usa),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidPaymentMetadata { field: "shipping_address", .. }
        ));

        let long_postal = format!(
            r#"{{"name":"Ada","line1":"1 Main St","city":"Boston","postal_code":"{}","country":"US"}}"#,
            "9".repeat(33)
        );
        let err = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", SHIPPING),
            ("billing_address", &long_postal),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidPaymentMetadata { field: "billing_address", .. }
        ));

        let lower = r#"{"name":"Ada","line1":"1 Main St","city":"Boston","postal_code":"02108","country":"us"}"#;
        let parsed = CheckoutMetadata::parse(&metadata(&[
            ("cart_id", &cart_id),
            ("shipping_address", lower),
        ]))
        .unwrap();
        assert_eq!(parsed.shipping_address.country, "US");
    }

    #[test]
    fn currency_must_be_a_three_letter_code() {
        let mut intent = PaymentIntent {
            id: "pi_1".into(),
            status: PaymentIntentStatus::Succeeded,
            amount_cents: 100,
            currency: "USD".into(),
            receipt_email: None,
            customer_id: None,
            metadata: HashMap::new(),
        };
        assert_eq!(intent.currency_code().unwrap(), "usd");

        intent.currency = "usdollars".into();
        assert!(matches!(
            intent.currency_code(),
            Err(CheckoutError::InvalidPaymentMetadata { field: "currency", .. })
        ));
    }

    #[test]
    fn intent_status_uses_provider_names() {
        let status: PaymentIntentStatus = serde_json::from_str("\"requires_capture\"").unwrap();
        assert_eq!(status, PaymentIntentStatus::RequiresCapture);
        assert!(!status.is_succeeded());
        assert!(PaymentIntentStatus::Succeeded.is_succeeded());
        assert_eq!(PaymentIntentStatus::Canceled.as_str(), "canceled");
    }
}
