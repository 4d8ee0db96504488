//! Order queries for the orders tab and the overview.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use shopfront_core::analytics::{DateRange, ItemSnapshot, OrderSnapshot};
use shopfront_core::order::{Order, OrderItem, ShippingAddress};
use shopfront_core::{
    Email, Money, OrderId, OrderItemId, OrderStatus, Page, PageRequest, PaymentMethod, ProductId,
    UserId,
};

use super::{RepositoryError, to_u32};

const ORDER_COLUMNS: &str = "id, order_number, status, user_id, customer_name, customer_email, \
     customer_phone, shipping_address, payment_method, subtotal, shipping_cost, total, \
     created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, product_name, unit_price, quantity, line_total";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    status: OrderStatus,
    user_id: Option<UserId>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    shipping_address: Json<ShippingAddress>,
    payment_method: PaymentMethod,
    subtotal: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: Option<ProductId>,
    product_name: String,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            unit_price: Money::new(row.unit_price),
            quantity: to_u32(row.quantity, "order item quantity")?,
            line_total: Money::new(row.line_total),
        })
    }
}

fn build_order(row: OrderRow, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
    let customer_email = Email::parse(&row.customer_email).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid email on order {}: {e}", row.id))
    })?;

    Ok(Order {
        id: row.id,
        order_number: row.order_number,
        status: row.status,
        user_id: row.user_id,
        customer_name: row.customer_name,
        customer_email,
        customer_phone: row.customer_phone,
        shipping_address: row.shipping_address.0,
        payment_method: row.payment_method,
        items,
        subtotal: Money::new(row.subtotal),
        shipping_cost: Money::new(row.shipping_cost),
        total: Money::new(row.total),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn snapshot(order: Order) -> OrderSnapshot {
    OrderSnapshot {
        created_at: order.created_at,
        status: order.status,
        total: order.total,
        items: order
            .items
            .into_iter()
            .map(|item| ItemSnapshot {
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                line_total: item.line_total,
            })
            .collect(),
    }
}

/// Repository for orders and their items.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List orders, newest first, optionally in one status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM storefront."order" WHERE ($1::storefront.order_status IS NULL OR status = $1)"#,
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM storefront."order"
            WHERE ($1::storefront.order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let orders = self.with_items(rows).await?;
        Ok(Page::new(orders, page, total))
    }

    /// Get an order with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"SELECT {ORDER_COLUMNS} FROM storefront."order" WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Move an order to a new status.
    ///
    /// The order row is locked while the transition is checked. Cancelling
    /// puts every item's quantity back into stock in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist and
    /// `RepositoryError::Conflict` if the transition isn't allowed.
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: OrderStatus = sqlx::query_scalar(
            r#"SELECT status FROM storefront."order" WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if !current.can_transition_to(next) {
            return Err(RepositoryError::Conflict(format!(
                "cannot move order from {current} to {next}"
            )));
        }

        if next == OrderStatus::Cancelled {
            sqlx::query(
                r"
                UPDATE storefront.product p
                SET stock = p.stock + returned.quantity, updated_at = now()
                FROM (
                    SELECT product_id, SUM(quantity)::int AS quantity
                    FROM storefront.order_item
                    WHERE order_id = $1 AND product_id IS NOT NULL
                    GROUP BY product_id
                ) returned
                WHERE p.id = returned.product_id
                ",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(r#"UPDATE storefront."order" SET status = $2, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .bind(next)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Every order placed within `range`, reduced to what the overview needs.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn snapshots(&self, range: DateRange) -> Result<Vec<OrderSnapshot>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM storefront."order"
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY created_at
            "#
        ))
        .bind(range.start_time())
        .bind(range.end_time())
        .fetch_all(self.pool)
        .await?;

        let orders = self.with_items(rows).await?;
        Ok(orders.into_iter().map(snapshot).collect())
    }

    async fn with_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM storefront.order_item WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item_row in item_rows {
            items_by_order
                .entry(item_row.order_id)
                .or_default()
                .push(OrderItem::try_from(item_row)?);
        }

        rows.into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                build_order(row, items)
            })
            .collect()
    }
}
