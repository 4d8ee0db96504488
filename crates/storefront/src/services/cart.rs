//! Cart operations for signed-in customers and guests.
//!
//! A signed-in customer's cart lives in `storefront.cart_item`; a guest's
//! cart lives in the session. Stock is always read fresh from the database
//! rather than from the catalog cache.

use sqlx::PgPool;
use thiserror::Error;
use tower_sessions::Session;
use tracing::instrument;

use shopfront_core::cart::{Cart, CartError, PricedCart};
use shopfront_core::{ProductId, UserId};

use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::models::session_keys;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("product not found")]
    ProductNotFound(ProductId),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Cart access for the current visitor.
pub struct CartService<'a> {
    pool: &'a PgPool,
    session: &'a Session,
    user_id: Option<UserId>,
}

impl<'a> CartService<'a> {
    /// Cart of `user_id`, or of the guest owning `session` when `None`.
    #[must_use]
    pub const fn new(pool: &'a PgPool, session: &'a Session, user_id: Option<UserId>) -> Self {
        Self {
            pool,
            session,
            user_id,
        }
    }

    /// The raw cart lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be read.
    pub async fn load(&self) -> Result<Cart, CartServiceError> {
        match self.user_id {
            Some(user_id) => Ok(CartRepository::new(self.pool).load(user_id).await?),
            None => Ok(load_guest_cart(self.session).await?),
        }
    }

    /// The cart joined with current product data.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart or its products cannot be read.
    #[instrument(skip(self), fields(user_id = ?self.user_id))]
    pub async fn priced(&self) -> Result<PricedCart, CartServiceError> {
        let cart = self.load().await?;
        price(self.pool, &cart).await
    }

    /// Add units of a product.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::ProductNotFound` for an unknown product and
    /// `CartServiceError::Cart` when the quantity breaks the stock limit.
    #[instrument(skip(self), fields(user_id = ?self.user_id))]
    pub async fn add(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<PricedCart, CartServiceError> {
        let stock = self.stock_of(product_id).await?;
        let cart = self
            .change(|cart| Ok(cart.add(product_id, stock, quantity)?))
            .await?;
        price(self.pool, &cart).await
    }

    /// Set the quantity of a line; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Cart` when the product is not in the cart
    /// or the quantity breaks the stock limit.
    #[instrument(skip(self), fields(user_id = ?self.user_id))]
    pub async fn set_quantity(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<PricedCart, CartServiceError> {
        let stock = if quantity == 0 {
            0
        } else {
            self.stock_of(product_id).await?
        };
        let cart = self
            .change(|cart| Ok(cart.set_quantity(product_id, stock, quantity)?))
            .await?;
        price(self.pool, &cart).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Cart` when the product is not in the cart.
    #[instrument(skip(self), fields(user_id = ?self.user_id))]
    pub async fn remove(&self, product_id: ProductId) -> Result<PricedCart, CartServiceError> {
        let cart = self
            .change(|cart| {
                if cart.remove(product_id) {
                    Ok(())
                } else {
                    Err(CartError::NotInCart(product_id).into())
                }
            })
            .await?;
        price(self.pool, &cart).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be written.
    pub async fn clear(&self) -> Result<(), CartServiceError> {
        match self.user_id {
            Some(user_id) => CartRepository::new(self.pool).clear(user_id).await?,
            None => {
                self.session
                    .remove::<Cart>(session_keys::GUEST_CART)
                    .await?;
            }
        }
        Ok(())
    }

    async fn stock_of(&self, product_id: ProductId) -> Result<u32, CartServiceError> {
        ProductRepository::new(self.pool)
            .get(product_id)
            .await?
            .map(|product| product.stock)
            .ok_or(CartServiceError::ProductNotFound(product_id))
    }

    async fn change<F>(&self, change: F) -> Result<Cart, CartServiceError>
    where
        F: FnOnce(&mut Cart) -> Result<(), CartServiceError>,
    {
        match self.user_id {
            Some(user_id) => CartRepository::new(self.pool).modify(user_id, change).await,
            None => {
                let mut cart = load_guest_cart(self.session).await?;
                change(&mut cart)?;
                self.session.insert(session_keys::GUEST_CART, &cart).await?;
                Ok(cart)
            }
        }
    }
}

/// Fold the session's guest cart into a customer's stored cart.
///
/// Called right after sign-in. Lines are capped at current stock and the
/// guest cart is removed from the session.
///
/// # Errors
///
/// Returns an error if either cart cannot be read or written.
#[instrument(skip(pool, session))]
pub async fn merge_guest_cart(
    pool: &PgPool,
    session: &Session,
    user_id: UserId,
) -> Result<(), CartServiceError> {
    let Some(guest) = session.remove::<Cart>(session_keys::GUEST_CART).await? else {
        return Ok(());
    };
    if guest.is_empty() {
        return Ok(());
    }

    let ids: Vec<ProductId> = guest.lines().iter().map(|line| line.product_id).collect();
    let products = ProductRepository::new(pool).get_many(&ids).await?;

    CartRepository::new(pool)
        .modify(user_id, |cart| {
            cart.merge(&guest, |id| {
                products.iter().find(|p| p.id == id).map(|p| p.stock)
            });
            Ok::<_, CartServiceError>(())
        })
        .await?;

    tracing::info!(lines = guest.lines().len(), "Merged guest cart");
    Ok(())
}

async fn load_guest_cart(session: &Session) -> Result<Cart, tower_sessions::session::Error> {
    Ok(session
        .get::<Cart>(session_keys::GUEST_CART)
        .await?
        .unwrap_or_default())
}

async fn price(pool: &PgPool, cart: &Cart) -> Result<PricedCart, CartServiceError> {
    if cart.is_empty() {
        return Ok(cart.priced(&[]));
    }
    let ids: Vec<ProductId> = cart.lines().iter().map(|line| line.product_id).collect();
    let products = ProductRepository::new(pool).get_many(&ids).await?;
    Ok(cart.priced(&products))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use shopfront_core::cart::CartLine;
    use sqlx::postgres::PgPoolOptions;
    use tower_sessions::MemoryStore;

    use super::*;

    // Guest paths never reach the database; any query here would fail.
    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://shopfront@127.0.0.1:1/shopfront")
            .unwrap()
    }

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    async fn guest_cart_with(session: &Session, product_id: i32, quantity: u32) {
        let cart = Cart::from_lines([CartLine {
            product_id: ProductId::new(product_id),
            quantity,
        }]);
        session
            .insert(session_keys::GUEST_CART, &cart)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_guest_remove_updates_session() {
        let pool = unreachable_pool();
        let session = session();
        guest_cart_with(&session, 4, 2).await;

        let priced = CartService::new(&pool, &session, None)
            .remove(ProductId::new(4))
            .await
            .unwrap();
        assert!(priced.is_empty());

        let stored = load_guest_cart(&session).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_failed_guest_change_leaves_cart_alone() {
        let pool = unreachable_pool();
        let session = session();
        guest_cart_with(&session, 4, 2).await;

        let err = CartService::new(&pool, &session, None)
            .remove(ProductId::new(9))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CartServiceError::Cart(CartError::NotInCart(id)) if id == ProductId::new(9)
        ));

        let stored = load_guest_cart(&session).await.unwrap();
        assert_eq!(stored.item_count(), 2);
    }

    #[tokio::test]
    async fn test_merge_without_guest_cart_is_a_no_op() {
        let pool = unreachable_pool();
        let session = session();

        merge_guest_cart(&pool, &session, UserId::new(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_consumes_empty_guest_cart() {
        let pool = unreachable_pool();
        let session = session();
        session
            .insert(session_keys::GUEST_CART, Cart::new())
            .await
            .unwrap();

        merge_guest_cart(&pool, &session, UserId::new(1)).await.unwrap();

        let left: Option<Cart> = session.get(session_keys::GUEST_CART).await.unwrap();
        assert!(left.is_none());
    }
}
