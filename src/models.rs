use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// Catalog

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::skus)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SkuEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub code: String,
    pub option_values: Value,
    pub quantity_on_hand: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SkuEntity {
    /// Human readable variant label, e.g. `Size: L / Color: Red`.
    ///
    /// `option_values` is a JSON array of `{"name", "value"}` objects. Entries
    /// missing either key are skipped.
    pub fn variant_description(&self) -> Option<String> {
        let parts: Vec<String> = self
            .option_values
            .as_array()
            .map(|options| {
                options
                    .iter()
                    .filter_map(|option| {
                        let name = option.get("name")?.as_str()?;
                        let value = option.get("value")?.as_str()?;
                        Some(format!("{name}: {value}"))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" / "))
        }
    }
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::skus)]
pub struct CreateSkuEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub code: String,
    pub option_values: Value,
    pub quantity_on_hand: i32,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::price_lists)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PriceListEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::price_lists)]
pub struct CreatePriceListEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_default: bool,
}

#[derive(Queryable, Selectable, Insertable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::prices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PriceEntity {
    pub price_list_id: Uuid,
    pub sku_id: Uuid,
    pub amount_cents: i64,
}

// Customers

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_guest: bool,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::billing_customers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BillingCustomerEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub gateway_customer_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::billing_customers)]
pub struct CreateBillingCustomerEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub gateway_customer_id: String,
}

// Carts

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Open,
    Converted,
}

impl CartStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Converted => "converted",
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartEntity {
    pub fn is_open(&self) -> bool {
        self.status == CartStatus::Open.as_str()
    }
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub cart_id: Uuid,
    pub sku_id: Uuid,
    pub tenant_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItemEntity {
    /// Saturates instead of wrapping. Checkout uses [`Self::checked_line_total_cents`].
    pub fn line_total_cents(&self) -> i64 {
        i64::from(self.quantity).saturating_mul(self.unit_price_cents)
    }

    pub fn checked_line_total_cents(&self) -> Option<i64> {
        i64::from(self.quantity).checked_mul(self.unit_price_cents)
    }
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::carts)]
pub struct CreateCartEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: String,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub cart_id: Uuid,
    pub sku_id: Uuid,
    pub tenant_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub token: String,
    pub cart_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sessions)]
pub struct CreateSessionEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub token: String,
    pub cart_id: Uuid,
}

/// One priced line of a cart summary.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub sku_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

/// Read-only view of a cart. Always derived from the current lines, never stored.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CartSummary {
    pub cart_id: Uuid,
    pub tenant_id: Uuid,
    pub items: Vec<CartLine>,
    pub item_count: i64,
    pub subtotal_cents: i64,
}

impl CartSummary {
    pub fn from_items(cart: &CartEntity, items: &[CartItemEntity]) -> Self {
        let items: Vec<CartLine> = items
            .iter()
            .map(|item| CartLine {
                sku_id: item.sku_id,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                line_total_cents: item.line_total_cents(),
            })
            .collect();

        Self {
            cart_id: cart.id,
            tenant_id: cart.tenant_id,
            item_count: items.iter().map(|line| i64::from(line.quantity)).sum(),
            subtotal_cents: items
                .iter()
                .fold(0, |sum: i64, line| sum.saturating_add(line.line_total_cents)),
            items,
        }
    }
}

// Orders

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses an order may be in for a transition into `self` to be legal.
    pub const fn allowed_sources(self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[],
            Self::Confirmed => &[Self::Pending],
            Self::Shipped => &[Self::Confirmed],
            Self::Delivered => &[Self::Shipped],
            Self::Cancelled => &[Self::Pending, Self::Confirmed],
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status `{other}`")),
        }
    }
}

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub cart_id: Uuid,
    pub payment_reference: String,
    pub status: String,
    pub currency: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    pub payment_id: Uuid,
    pub customer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub cart_id: Uuid,
    pub payment_reference: String,
    pub status: String,
    pub currency: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    pub payment_id: Uuid,
    pub customer_notes: Option<String>,
}

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub tenant_id: Uuid,
    pub line_number: i32,
    pub sku_id: Uuid,
    pub product_name: String,
    pub sku_code: String,
    pub variant_description: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub tenant_id: Uuid,
    pub line_number: i32,
    pub sku_id: Uuid,
    pub product_name: String,
    pub sku_code: String,
    pub variant_description: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::addresses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AddressEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::addresses)]
pub struct CreateAddressEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Option<Uuid>,
    pub payment_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreatePaymentEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub payment_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
}

/// An order with everything it owns, as exposed to order lookups.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderDetail {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub shipping_address: AddressEntity,
    pub billing_address: AddressEntity,
    pub payment: PaymentEntity,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sku(option_values: Value) -> SkuEntity {
        SkuEntity {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            code: "TEE-L-RED".into(),
            option_values,
            quantity_on_hand: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn variant_description_joins_options_in_order() {
        let sku = sku(json!([
            { "name": "Size", "value": "L" },
            { "name": "Color", "value": "Red" }
        ]));
        assert_eq!(sku.variant_description().as_deref(), Some("Size: L / Color: Red"));
    }

    #[test]
    fn variant_description_is_none_without_options() {
        assert_eq!(sku(json!([])).variant_description(), None);
        assert_eq!(sku(json!({ "size": "L" })).variant_description(), None);
    }

    #[test]
    fn cart_summary_sums_lines() {
        let cart = CartEntity {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: None,
            status: CartStatus::Open.as_str().into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let line = |quantity, unit_price_cents| CartItemEntity {
            cart_id: cart.id,
            sku_id: Uuid::new_v4(),
            tenant_id: cart.tenant_id,
            quantity,
            unit_price_cents,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let summary = CartSummary::from_items(&cart, &[line(2, 500), line(1, 1000)]);
        assert_eq!(summary.subtotal_cents, 2000);
        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.items[0].line_total_cents, 1000);
    }

    #[test]
    fn order_status_transitions() {
        assert!(OrderStatus::Confirmed.allowed_sources().contains(&OrderStatus::Pending));
        assert!(!OrderStatus::Delivered.allowed_sources().contains(&OrderStatus::Pending));
        assert!(OrderStatus::Pending.allowed_sources().is_empty());
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
