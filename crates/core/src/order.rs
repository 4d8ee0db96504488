//! Orders and the data captured when one is placed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::PricedCart;
use crate::{Email, Money, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, UserId};

/// A shipping address field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct AddressError {
    pub field: &'static str,
    pub reason: &'static str,
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Trim every field, drop blank optional fields and check required ones.
    ///
    /// # Errors
    ///
    /// Returns the first required field that is blank or too long.
    pub fn normalized(self) -> Result<Self, AddressError> {
        let address = Self {
            line1: self.line1.trim().to_owned(),
            line2: non_blank(self.line2),
            city: self.city.trim().to_owned(),
            state: non_blank(self.state),
            postal_code: self.postal_code.trim().to_owned(),
            country: self.country.trim().to_owned(),
        };

        for (field, value) in [
            ("line1", &address.line1),
            ("city", &address.city),
            ("postal_code", &address.postal_code),
            ("country", &address.country),
        ] {
            if value.is_empty() {
                return Err(AddressError {
                    field,
                    reason: "is required",
                });
            }
            if value.chars().count() > 200 {
                return Err(AddressError {
                    field,
                    reason: "is too long",
                });
            }
        }

        Ok(address)
    }

    /// The address as printable lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.line1.clone()];
        if let Some(line2) = &self.line2 {
            lines.push(line2.clone());
        }
        let locality = match &self.state {
            Some(state) => format!("{}, {state} {}", self.city, self.postal_code),
            None => format!("{} {}", self.city, self.postal_code),
        };
        lines.push(locality);
        lines.push(self.country.clone());
        lines
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// One purchased product, with name and price as they were at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    /// `None` once the product has been deleted from the catalog.
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub user_id: Option<UserId>,
    pub customer_name: String,
    pub customer_email: Email,
    pub customer_phone: Option<String>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Total units across all items.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Whether `email` may view this order without being its owner.
    #[must_use]
    pub fn matches_email(&self, email: &Email) -> bool {
        self.customer_email == *email
    }
}

/// A line of an order about to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemDraft {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

/// Everything needed to insert an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub customer_name: String,
    pub customer_email: Email,
    pub customer_phone: Option<String>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItemDraft>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
}

impl OrderDraft {
    /// Snapshot the lines of a priced cart.
    #[must_use]
    pub fn items_from(cart: &PricedCart) -> Vec<OrderItemDraft> {
        cart.items
            .iter()
            .map(|item| OrderItemDraft {
                product_id: item.product.id,
                product_name: item.product.name.clone(),
                unit_price: item.product.price,
                quantity: item.quantity,
                line_total: item.line_total,
            })
            .collect()
    }
}

/// Build a human-facing order number such as `SF-20250114-7KQ2XM`.
///
/// `suffix` is expected to be random; uniqueness is enforced by the database.
#[must_use]
pub fn order_number(placed_at: DateTime<Utc>, suffix: &str) -> String {
    format!("SF-{}-{}", placed_at.format("%Y%m%d"), suffix.to_uppercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            line1: " 1 Main St ".to_owned(),
            line2: Some("   ".to_owned()),
            city: "Springfield".to_owned(),
            state: Some("IL".to_owned()),
            postal_code: "62701".to_owned(),
            country: "US".to_owned(),
        }
    }

    #[test]
    fn test_normalized_trims_and_drops_blank_optionals() {
        let addr = address().normalized().unwrap();
        assert_eq!(addr.line1, "1 Main St");
        assert_eq!(addr.line2, None);
        assert_eq!(addr.state.as_deref(), Some("IL"));
    }

    #[test]
    fn test_normalized_requires_fields() {
        let err = ShippingAddress {
            city: "  ".to_owned(),
            ..address()
        }
        .normalized()
        .unwrap_err();
        assert_eq!(err.field, "city");
    }

    #[test]
    fn test_address_lines() {
        let lines = address().normalized().unwrap().lines();
        assert_eq!(lines, vec!["1 Main St", "Springfield, IL 62701", "US"]);
    }

    #[test]
    fn test_order_number_format() {
        let at = Utc.with_ymd_and_hms(2025, 1, 14, 9, 30, 0).unwrap();
        assert_eq!(order_number(at, "7kq2xm"), "SF-20250114-7KQ2XM");
    }
}
