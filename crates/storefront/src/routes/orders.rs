//! Order history, tracking and receipts.
//!
//! An order can be viewed by the account that placed it, or by anyone who
//! supplies the email address it was placed with. Both lookups answer 404
//! on a mismatch, so a wrong guess reveals nothing.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use shopfront_core::order::Order;
use shopfront_core::{Email, Page, PageQuery};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::CurrentUser;
use crate::state::AppState;

/// Query parameters for order lookups.
#[derive(Debug, Default, Deserialize)]
pub struct OrderLookupQuery {
    pub email: Option<String>,
}

/// Printable receipt.
#[derive(Template, WebTemplate)]
#[template(path = "invoice.html")]
pub struct InvoiceTemplate {
    pub order: Order,
    pub placed_on: String,
}

/// Whether the visitor may see `order`.
fn can_view(order: &Order, user: Option<&CurrentUser>, email: Option<&str>) -> bool {
    if let Some(user) = user
        && order.user_id == Some(user.id)
    {
        return true;
    }
    email
        .and_then(|raw| Email::parse(raw).ok())
        .is_some_and(|email| order.matches_email(&email))
}

async fn find_visible(
    state: &AppState,
    order_number: &str,
    user: Option<&CurrentUser>,
    email: Option<&str>,
) -> Result<Order> {
    let order = OrderRepository::new(state.pool())
        .get_by_number(order_number.trim())
        .await?
        .filter(|order| can_view(order, user, email));

    order.ok_or_else(|| AppError::NotFound("Order not found".to_owned()))
}

/// The signed-in customer's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id, page.into())
        .await?;
    Ok(Json(orders))
}

/// Track one order.
#[instrument(skip(state, user, query))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(order_number): Path<String>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<Json<Order>> {
    let order = find_visible(&state, &order_number, user.as_ref(), query.email.as_deref()).await?;
    Ok(Json(order))
}

/// Render the receipt as HTML.
#[instrument(skip(state, user, query))]
pub async fn invoice(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(order_number): Path<String>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<InvoiceTemplate> {
    let order = find_visible(&state, &order_number, user.as_ref(), query.email.as_deref()).await?;
    let placed_on = order.created_at.format("%B %-d, %Y").to_string();
    Ok(InvoiceTemplate { order, placed_on })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use shopfront_core::order::{OrderItem, ShippingAddress};
    use shopfront_core::{
        Money, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, UserId, UserRole,
    };

    use super::*;

    fn order(user_id: Option<UserId>) -> Order {
        let placed = Utc.with_ymd_and_hms(2025, 3, 9, 15, 0, 0).unwrap();
        Order {
            id: OrderId::new(1),
            order_number: "SF-20250309-ABCD2345".to_owned(),
            status: OrderStatus::Pending,
            user_id,
            customer_name: "Lin <Admin>".to_owned(),
            customer_email: Email::parse("lin@example.com").unwrap(),
            customer_phone: None,
            shipping_address: ShippingAddress {
                line1: "1 Harbour Rd".to_owned(),
                line2: None,
                city: "Wellington".to_owned(),
                state: None,
                postal_code: "6011".to_owned(),
                country: "NZ".to_owned(),
            },
            payment_method: PaymentMethod::BankTransfer,
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                product_id: Some(ProductId::new(4)),
                product_name: "Enamel mug".to_owned(),
                unit_price: Money::from_cents(1250),
                quantity: 2,
                line_total: Money::from_cents(2500),
            }],
            subtotal: Money::from_cents(2500),
            shipping_cost: Money::from_cents(599),
            total: Money::from_cents(3099),
            created_at: placed,
            updated_at: placed,
        }
    }

    fn signed_in(id: i32) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            name: "Lin".to_owned(),
            email: Email::parse("other@example.com").unwrap(),
            role: UserRole::Customer,
            authenticated_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_can_view() {
        let order = order(Some(UserId::new(5)));
        assert!(can_view(&order, Some(&signed_in(5)), None));
        assert!(!can_view(&order, Some(&signed_in(6)), None));
    }

    #[test]
    fn test_guest_needs_matching_email() {
        let order = order(None);
        assert!(can_view(&order, None, Some("LIN@example.com")));
        assert!(!can_view(&order, None, Some("someone@example.com")));
        assert!(!can_view(&order, None, Some("not an email")));
        assert!(!can_view(&order, None, None));
    }

    #[test]
    fn test_invoice_renders_escaped() {
        let html = InvoiceTemplate {
            order: order(None),
            placed_on: "March 9, 2025".to_owned(),
        }
        .render()
        .unwrap();
        assert!(html.contains("SF-20250309-ABCD2345"));
        assert!(html.contains("$30.99"));
        assert!(html.contains("Lin &#60;Admin&#62;") || html.contains("Lin &lt;Admin&gt;"));
        assert!(html.contains("Bank transfer"));
    }
}
