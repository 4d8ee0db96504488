//! The shopping cart model.
//!
//! A [`Cart`] is an ordered list of `{product_id, quantity}` lines with at most
//! one line per product. Every mutation that raises a quantity checks it
//! against the product's available stock; a failed mutation leaves the cart
//! untouched.
//!
//! The cart never stores prices. [`Cart::priced`] joins the lines with the
//! current product records when a response or an order needs them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Product;
use crate::{Money, ProductId};

/// Largest quantity of a single product one cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Errors from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity must be at least one.
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// Quantity exceeds the per-line limit.
    #[error("quantity must be at most {MAX_LINE_QUANTITY}")]
    QuantityTooLarge,

    /// Not enough stock to satisfy the requested quantity.
    #[error("only {available} left in stock (requested {requested})")]
    InsufficientStock { requested: u32, available: u32 },

    /// The product has no line in the cart.
    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),
}

/// One cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A cart: lines keyed by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from stored lines.
    ///
    /// Duplicate product ids are folded together and zero quantities dropped,
    /// so a cart loaded from storage always satisfies the uniqueness invariant.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            match cart.line_mut(line.product_id) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .saturating_add(line.quantity)
                        .min(MAX_LINE_QUANTITY);
                }
                None => cart.lines.push(CartLine {
                    quantity: line.quantity.min(MAX_LINE_QUANTITY),
                    ..line
                }),
            }
        }
        cart
    }

    /// The lines, in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Quantity held for a product (zero when absent).
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines
            .iter()
            .find(|line| line.product_id == product_id)
            .map_or(0, |line| line.quantity)
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add `quantity` units of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ZeroQuantity` for a zero quantity,
    /// `CartError::QuantityTooLarge` past the line limit, and
    /// `CartError::InsufficientStock` when the merged quantity exceeds stock.
    pub fn add(
        &mut self,
        product_id: ProductId,
        available_stock: u32,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let requested = self.quantity_of(product_id).saturating_add(quantity);
        check_quantity(requested, available_stock)?;

        match self.line_mut(product_id) {
            Some(line) => line.quantity = requested,
            None => self.lines.push(CartLine {
                product_id,
                quantity: requested,
            }),
        }
        Ok(())
    }

    /// Replace the quantity of an existing line. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product has no line, otherwise
    /// the same stock errors as [`Cart::add`].
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        available_stock: u32,
        quantity: u32,
    ) -> Result<(), CartError> {
        if self.line_mut(product_id).is_none() {
            return Err(CartError::NotInCart(product_id));
        }

        if quantity == 0 {
            self.remove(product_id);
            return Ok(());
        }

        check_quantity(quantity, available_stock)?;
        if let Some(line) = self.line_mut(product_id) {
            line.quantity = quantity;
        }
        Ok(())
    }

    /// Remove a product's line. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.product_id != product_id);
        self.lines.len() != before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Fold another cart (typically the guest cart) into this one.
    ///
    /// Each merged line is capped at the product's available stock as reported
    /// by `stock_of`; products with no stock or unknown to `stock_of` are
    /// dropped rather than failing the merge.
    pub fn merge(&mut self, other: &Self, stock_of: impl Fn(ProductId) -> Option<u32>) {
        for line in &other.lines {
            let Some(available) = stock_of(line.product_id) else {
                continue;
            };
            let cap = available.min(MAX_LINE_QUANTITY);
            let merged = self
                .quantity_of(line.product_id)
                .saturating_add(line.quantity)
                .min(cap);
            if merged == 0 {
                continue;
            }
            match self.line_mut(line.product_id) {
                Some(existing) => existing.quantity = merged,
                None => self.lines.push(CartLine {
                    product_id: line.product_id,
                    quantity: merged,
                }),
            }
        }
    }

    /// Join the lines with product records.
    ///
    /// Lines whose product is missing from `products` (deleted since it was
    /// added) are dropped.
    #[must_use]
    pub fn priced(&self, products: &[Product]) -> PricedCart {
        let by_id: HashMap<ProductId, &Product> =
            products.iter().map(|product| (product.id, product)).collect();

        let items: Vec<CartItem> = self
            .lines
            .iter()
            .filter_map(|line| {
                by_id.get(&line.product_id).map(|product| CartItem {
                    product: (*product).clone(),
                    quantity: line.quantity,
                    line_total: product.price * line.quantity,
                })
            })
            .collect();

        let subtotal = items.iter().map(|item| item.line_total).sum();
        let item_count = items.iter().map(|item| item.quantity).sum();

        PricedCart {
            items,
            subtotal,
            item_count,
        }
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| line.product_id == product_id)
    }
}

fn check_quantity(requested: u32, available_stock: u32) -> Result<(), CartError> {
    if requested > MAX_LINE_QUANTITY {
        return Err(CartError::QuantityTooLarge);
    }
    if requested > available_stock {
        return Err(CartError::InsufficientStock {
            requested,
            available: available_stock,
        });
    }
    Ok(())
}

/// A cart line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u32,
    pub line_total: Money,
}

/// A cart with prices resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedCart {
    pub items: Vec<CartItem>,
    pub subtotal: Money,
    pub item_count: u32,
}

impl PricedCart {
    /// Whether there is nothing to buy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether every line can still be fulfilled from current stock.
    #[must_use]
    pub fn stock_shortfalls(&self) -> Vec<(ProductId, CartError)> {
        self.items
            .iter()
            .filter(|item| item.quantity > item.product.stock)
            .map(|item| {
                (
                    item.product.id,
                    CartError::InsufficientStock {
                        requested: item.quantity,
                        available: item.product.stock,
                    },
                )
            })
            .collect()
    }

    /// A canonical string identifying the cart's contents and prices.
    ///
    /// Two carts with the same products, quantities and unit prices have the
    /// same fingerprint regardless of line order. The checkout uses it to
    /// notice that the cart changed after the review step.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<(ProductId, u32, Money)> = self
            .items
            .iter()
            .map(|item| (item.product.id, item.quantity, item.product.price))
            .collect();
        parts.sort_by_key(|(id, _, _)| *id);
        parts
            .iter()
            .map(|(id, quantity, price)| format!("{id}x{quantity}@{}", price.amount()))
            .collect::<Vec<_>>()
            .join(",")
    }
}
