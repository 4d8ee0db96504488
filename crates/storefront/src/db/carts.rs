//! Persistent carts of signed-in customers.

use sqlx::{PgConnection, PgPool};

use shopfront_core::cart::{Cart, CartLine};
use shopfront_core::{ProductId, UserId};

use super::{RepositoryError, to_i32, to_u32};

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: ProductId,
    quantity: i32,
}

/// Repository for `storefront.cart_item`.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load a user's cart in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn load(&self, user_id: UserId) -> Result<Cart, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_lines(&mut conn, user_id).await
    }

    /// Apply `change` to a user's cart and store the result.
    ///
    /// Runs in one transaction holding the user's row lock, so concurrent
    /// changes to the same cart apply one after the other. Nothing is written
    /// when `change` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `change`, or `RepositoryError::Database` if the
    /// transaction fails.
    pub async fn modify<F, E>(&self, user_id: UserId, change: F) -> Result<Cart, E>
    where
        F: FnOnce(&mut Cart) -> Result<(), E>,
        E: From<RepositoryError>,
    {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query(r#"SELECT id FROM storefront."user" WHERE id = $1 FOR UPDATE"#)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        let mut cart = load_lines(&mut tx, user_id).await?;
        change(&mut cart)?;
        replace_lines(&mut tx, user_id, &cart).await?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(cart)
    }

    /// Remove every line of a user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM storefront.cart_item WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

async fn load_lines(conn: &mut PgConnection, user_id: UserId) -> Result<Cart, RepositoryError> {
    let rows = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT product_id, quantity
        FROM storefront.cart_item
        WHERE user_id = $1
        ORDER BY position
        ",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let lines = rows
        .into_iter()
        .map(|row| {
            Ok(CartLine {
                product_id: row.product_id,
                quantity: to_u32(row.quantity, "cart quantity")?,
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

    Ok(Cart::from_lines(lines))
}

async fn replace_lines(
    conn: &mut PgConnection,
    user_id: UserId,
    cart: &Cart,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM storefront.cart_item WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    if cart.is_empty() {
        return Ok(());
    }

    let product_ids: Vec<i32> = cart.lines().iter().map(|l| l.product_id.as_i32()).collect();
    let quantities: Vec<i32> = cart.lines().iter().map(|l| to_i32(l.quantity)).collect();

    sqlx::query(
        r"
        INSERT INTO storefront.cart_item (user_id, product_id, quantity, position)
        SELECT $1, line.product_id, line.quantity, line.position::int
        FROM UNNEST($2::int[], $3::int[]) WITH ORDINALITY
            AS line(product_id, quantity, position)
        ",
    )
    .bind(user_id)
    .bind(product_ids)
    .bind(quantities)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
