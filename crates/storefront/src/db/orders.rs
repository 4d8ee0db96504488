//! Order persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use shopfront_core::order::{Order, OrderDraft, OrderItem, OrderItemDraft, ShippingAddress};
use shopfront_core::{
    Email, Money, OrderId, OrderItemId, OrderStatus, Page, PageRequest, PaymentMethod, ProductId,
    UserId,
};

use super::{RepositoryError, to_i32, to_u32};

/// Conflict message when a generated order number is already taken.
pub const DUPLICATE_ORDER_NUMBER: &str = "order number already exists";

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

fn in_lock_order(items: &[OrderItemDraft]) -> Vec<&OrderItemDraft> {
    let mut sorted: Vec<_> = items.iter().collect();
    sorted.sort_by_key(|item| item.product_id);
    sorted
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

    /// Place an order.
    ///
    /// In one transaction: decrements stock for every item (failing if any
    /// product has too little left), inserts the order and its items, and
    /// empties the customer's stored cart. Product rows are locked in id
    /// order so concurrent orders cannot deadlock on them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if stock ran out or the order
    /// number is taken. Nothing is written in that case.
    pub async fn create(
        &self,
        user_id: Option<UserId>,
        order_number: &str,
        draft: &OrderDraft,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for item in in_lock_order(&draft.items) {
            let result = sqlx::query(
                r"
                UPDATE storefront.product
                SET stock = stock - $2, updated_at = now()
                WHERE id = $1 AND stock >= $2
                ",
            )
            .bind(item.product_id)
            .bind(to_i32(item.quantity))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(format!(
                    "not enough stock for {}",
                    item.product_name
                )));
            }
        }

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO storefront."order" (
                order_number, user_id, customer_name, customer_email, customer_phone,
                shipping_address, payment_method, subtotal, shipping_cost, total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_number)
        .bind(user_id)
        .bind(&draft.customer_name)
        .bind(draft.customer_email.as_str())
        .bind(draft.customer_phone.as_deref())
        .bind(Json(&draft.shipping_address))
        .bind(draft.payment_method)
        .bind(draft.subtotal)
        .bind(draft.shipping_cost)
        .bind(draft.total)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique(e, DUPLICATE_ORDER_NUMBER))?;

        let product_ids: Vec<i32> = draft.items.iter().map(|i| i.product_id.as_i32()).collect();
        let names: Vec<String> = draft.items.iter().map(|i| i.product_name.clone()).collect();
        let unit_prices: Vec<Decimal> = draft.items.iter().map(|i| i.unit_price.amount()).collect();
        let quantities: Vec<i32> = draft.items.iter().map(|i| to_i32(i.quantity)).collect();
        let line_totals: Vec<Decimal> = draft.items.iter().map(|i| i.line_total.amount()).collect();

        let item_rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            r"
            INSERT INTO storefront.order_item
                (order_id, product_id, product_name, unit_price, quantity, line_total)
            SELECT $1, * FROM UNNEST($2::int[], $3::text[], $4::numeric[], $5::int[], $6::numeric[])
            RETURNING {ITEM_COLUMNS}
            "
        ))
        .bind(row.id)
        .bind(product_ids)
        .bind(names)
        .bind(unit_prices)
        .bind(quantities)
        .bind(line_totals)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(user_id) = user_id {
            sqlx::query("DELETE FROM storefront.cart_item WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let items = item_rows
            .into_iter()
            .map(OrderItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        build_order(row, items)
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let total: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM storefront."order" WHERE user_id = $1"#)
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM storefront."order"
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let orders = self.with_items(rows).await?;
        Ok(Page::new(orders, page, total))
    }

    /// Look up an order by its public number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"SELECT {ORDER_COLUMNS} FROM storefront."order" WHERE order_number = $1"#
        ))
        .bind(order_number)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
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
            let order_id = item_row.order_id;
            items_by_order
                .entry(order_id)
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
