//! The checkout wizard.
//!
//! Checkout is a linear sequence of four steps:
//!
//! ```text
//! identity ──► shipping ──► review ──► payment ──► (order)
//! ```
//!
//! [`CheckoutSession`] records the wizard position and the data collected so
//! far. A step can only be submitted once every step before it is complete.
//! Submitting (or going back to) an earlier step moves the wizard to it and
//! discards the review confirmation and payment choice, since both depend on
//! what came before.
//!
//! Guests must verify their email with a one-time code before the identity
//! step accepts it. Signed-in customers are trusted for their account email.
//!
//! The review step pins a fingerprint of the priced cart. If the cart changes
//! afterwards (quantities, products, or prices), payment and order submission
//! fail with [`CheckoutError::CartChanged`] and the wizard returns to review.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::PricedCart;
use crate::order::{AddressError, OrderDraft, ShippingAddress};
use crate::{Email, Money, PaymentMethod};

/// Maximum length of a customer name.
pub const MAX_CUSTOMER_NAME_LENGTH: usize = 100;

/// A wizard step, in order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Identity,
    Shipping,
    Review,
    Payment,
}

impl CheckoutStep {
    /// Every step, in order.
    pub const ALL: [Self; 4] = [Self::Identity, Self::Shipping, Self::Review, Self::Payment];

    /// The step after this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Identity => Some(Self::Shipping),
            Self::Shipping => Some(Self::Review),
            Self::Review => Some(Self::Payment),
            Self::Payment => None,
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Identity => "identity",
            Self::Shipping => "shipping",
            Self::Review => "review",
            Self::Payment => "payment",
        };
        f.write_str(name)
    }
}

/// Errors from the checkout wizard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// A guest tried to use an email that has not been verified.
    #[error("email address has not been verified")]
    EmailNotVerified,

    /// An earlier step is incomplete.
    #[error("complete the {current} step first")]
    StepNotReached {
        requested: CheckoutStep,
        current: CheckoutStep,
    },

    /// A submitted field is invalid.
    #[error("{field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    /// The cart no longer matches what was reviewed.
    #[error("cart changed since it was reviewed")]
    CartChanged,

    /// There is nothing to check out.
    #[error("cart is empty")]
    EmptyCart,
}

impl From<AddressError> for CheckoutError {
    fn from(err: AddressError) -> Self {
        Self::InvalidField {
            field: err.field,
            reason: err.reason,
        }
    }
}

/// Who is buying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Identity {
    fn normalized(self) -> Result<Self, CheckoutError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(CheckoutError::InvalidField {
                field: "name",
                reason: "is required",
            });
        }
        if name.chars().count() > MAX_CUSTOMER_NAME_LENGTH {
            return Err(CheckoutError::InvalidField {
                field: "name",
                reason: "is too long",
            });
        }

        let phone = self
            .phone
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty());
        if let Some(phone) = &phone {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            let allowed = phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));
            if !allowed || !(7..=20).contains(&digits) {
                return Err(CheckoutError::InvalidField {
                    field: "phone",
                    reason: "is not a valid phone number",
                });
            }
        }

        Ok(Self {
            name,
            email: self.email,
            phone,
        })
    }
}

/// Shipping cost rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
    /// Charged when the subtotal is below `free_over`.
    pub flat_rate: Money,
    /// Subtotal at or above which shipping is free. `None` never waives it.
    pub free_over: Option<Money>,
}

impl ShippingPolicy {
    /// Shipping cost for a cart.
    #[must_use]
    pub fn cost_for(&self, cart: &PricedCart) -> Money {
        if cart.is_empty() {
            return Money::ZERO;
        }
        match self.free_over {
            Some(threshold) if cart.subtotal >= threshold => Money::ZERO,
            _ => self.flat_rate,
        }
    }
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            flat_rate: Money::from_cents(599),
            free_over: Some(Money::from_cents(7500)),
        }
    }
}

/// State of one shopper's checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    step: CheckoutStep,
    verified_email: Option<Email>,
    identity: Option<Identity>,
    shipping: Option<ShippingAddress>,
    reviewed_cart: Option<String>,
    payment_method: Option<PaymentMethod>,
}

impl CheckoutSession {
    /// A fresh checkout at the identity step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The step the shopper is on.
    #[must_use]
    pub const fn current_step(&self) -> CheckoutStep {
        self.step
    }

    /// The email confirmed by a verification code, if any.
    #[must_use]
    pub const fn verified_email(&self) -> Option<&Email> {
        self.verified_email.as_ref()
    }

    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub const fn shipping(&self) -> Option<&ShippingAddress> {
        self.shipping.as_ref()
    }

    #[must_use]
    pub const fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    /// Whether the review step has been confirmed.
    #[must_use]
    pub const fn is_reviewed(&self) -> bool {
        self.reviewed_cart.is_some()
    }

    /// Whether every step is complete.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.step, CheckoutStep::Payment) && self.payment_method.is_some()
    }

    /// Record that `email` was verified with a one-time code.
    pub fn mark_email_verified(&mut self, email: Email) {
        self.verified_email = Some(email);
    }

    /// Submit the identity step.
    ///
    /// `account_email` is the signed-in customer's email; it counts as
    /// verified. Any other email must match [`Self::verified_email`].
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmailNotVerified` for an unverified guest email
    /// and `CheckoutError::InvalidField` for a bad name or phone.
    pub fn submit_identity(
        &mut self,
        identity: Identity,
        account_email: Option<&Email>,
    ) -> Result<(), CheckoutError> {
        let identity = identity.normalized()?;

        let trusted = account_email == Some(&identity.email)
            || self.verified_email.as_ref() == Some(&identity.email);
        if !trusted {
            return Err(CheckoutError::EmailNotVerified);
        }

        self.identity = Some(identity);
        self.advance_past(CheckoutStep::Identity);
        Ok(())
    }

    /// Submit the shipping step.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::StepNotReached` before identity is complete and
    /// `CheckoutError::InvalidField` for a bad address.
    pub fn submit_shipping(&mut self, address: ShippingAddress) -> Result<(), CheckoutError> {
        self.require(CheckoutStep::Shipping)?;
        self.shipping = Some(address.normalized()?);
        self.advance_past(CheckoutStep::Shipping);
        Ok(())
    }

    /// Confirm the review step against the current cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::StepNotReached` before shipping is complete and
    /// `CheckoutError::EmptyCart` for an empty cart.
    pub fn confirm_review(&mut self, cart: &PricedCart) -> Result<(), CheckoutError> {
        self.require(CheckoutStep::Review)?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.reviewed_cart = Some(cart.fingerprint());
        self.advance_past(CheckoutStep::Review);
        Ok(())
    }

    /// Choose a payment method.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::StepNotReached` before review is confirmed and
    /// `CheckoutError::CartChanged` (moving back to review) when the cart no
    /// longer matches what was reviewed.
    pub fn submit_payment(
        &mut self,
        method: PaymentMethod,
        cart: &PricedCart,
    ) -> Result<(), CheckoutError> {
        self.require(CheckoutStep::Payment)?;
        if !self.review_matches(cart) {
            self.invalidate_review();
            return Err(CheckoutError::CartChanged);
        }
        self.payment_method = Some(method);
        Ok(())
    }

    /// Move back to a step that has already been reached.
    ///
    /// Identity and shipping data are kept so forms can be pre-filled; the
    /// review confirmation and payment choice are discarded as needed.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::StepNotReached` for a step ahead of the
    /// current one.
    pub fn go_to(&mut self, step: CheckoutStep) -> Result<(), CheckoutError> {
        self.require(step)?;
        self.step = step;
        if step <= CheckoutStep::Review {
            self.reviewed_cart = None;
        }
        self.payment_method = None;
        Ok(())
    }

    /// Drop the review confirmation and return to the review step.
    pub fn invalidate_review(&mut self) {
        self.reviewed_cart = None;
        self.payment_method = None;
        if self.step > CheckoutStep::Review {
            self.step = CheckoutStep::Review;
        }
    }

    /// Assemble the order to place.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::StepNotReached` until payment is chosen,
    /// `CheckoutError::EmptyCart` for an empty cart and
    /// `CheckoutError::CartChanged` when the cart differs from the reviewed
    /// one.
    pub fn ready_order(
        &self,
        cart: &PricedCart,
        policy: &ShippingPolicy,
    ) -> Result<OrderDraft, CheckoutError> {
        let (Some(identity), Some(shipping), Some(payment_method), true) = (
            &self.identity,
            &self.shipping,
            self.payment_method,
            self.is_complete(),
        ) else {
            return Err(CheckoutError::StepNotReached {
                requested: CheckoutStep::Payment,
                current: self.step,
            });
        };

        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if !self.review_matches(cart) {
            return Err(CheckoutError::CartChanged);
        }

        let shipping_cost = policy.cost_for(cart);
        Ok(OrderDraft {
            customer_name: identity.name.clone(),
            customer_email: identity.email.clone(),
            customer_phone: identity.phone.clone(),
            shipping_address: shipping.clone(),
            payment_method,
            items: OrderDraft::items_from(cart),
            subtotal: cart.subtotal,
            shipping_cost,
            total: cart.subtotal + shipping_cost,
        })
    }

    fn review_matches(&self, cart: &PricedCart) -> bool {
        self.reviewed_cart.as_deref() == Some(cart.fingerprint().as_str())
    }

    fn require(&self, step: CheckoutStep) -> Result<(), CheckoutError> {
        if step > self.step {
            return Err(CheckoutError::StepNotReached {
                requested: step,
                current: self.step,
            });
        }
        Ok(())
    }

    fn advance_past(&mut self, step: CheckoutStep) {
        self.step = step.next().unwrap_or(CheckoutStep::Payment);
        if step < CheckoutStep::Review {
            self.reviewed_cart = None;
        }
        self.payment_method = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::cart::Cart;
    use crate::catalog::Product;
    use crate::ProductId;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    fn identity(addr: &str) -> Identity {
        Identity {
            name: "Ada Lovelace".to_owned(),
            email: email(addr),
            phone: None,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            line1: "1 Main St".to_owned(),
            line2: None,
            city: "Springfield".to_owned(),
            state: None,
            postal_code: "62701".to_owned(),
            country: "US".to_owned(),
        }
    }

    fn priced(quantity: u32, cents: i64) -> PricedCart {
        let product = Product {
            id: ProductId::new(1),
            name: "Mug".to_owned(),
            description: String::new(),
            price: Money::from_cents(cents),
            stock: 50,
            category: "Kitchen".to_owned(),
            images: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut cart = Cart::new();
        cart.add(product.id, product.stock, quantity).unwrap();
        cart.priced(&[product])
    }

    fn at_payment(cart: &PricedCart) -> CheckoutSession {
        let mut checkout = CheckoutSession::new();
        checkout
            .submit_identity(identity("ada@example.com"), Some(&email("ada@example.com")))
            .unwrap();
        checkout.submit_shipping(address()).unwrap();
        checkout.confirm_review(cart).unwrap();
        checkout
    }

    #[test]
    fn test_guest_needs_verified_email() {
        let mut checkout = CheckoutSession::new();
        assert_eq!(
            checkout.submit_identity(identity("guest@example.com"), None),
            Err(CheckoutError::EmailNotVerified)
        );
        assert_eq!(checkout.current_step(), CheckoutStep::Identity);

        checkout.mark_email_verified(email("guest@example.com"));
        checkout
            .submit_identity(identity("guest@example.com"), None)
            .unwrap();
        assert_eq!(checkout.current_step(), CheckoutStep::Shipping);
    }

    #[test]
    fn test_verified_email_must_match() {
        let mut checkout = CheckoutSession::new();
        checkout.mark_email_verified(email("one@example.com"));
        assert_eq!(
            checkout.submit_identity(identity("two@example.com"), None),
            Err(CheckoutError::EmailNotVerified)
        );
    }

    #[test]
    fn test_signed_in_customer_can_use_other_verified_email() {
        let mut checkout = CheckoutSession::new();
        checkout.mark_email_verified(email("gift@example.com"));
        checkout
            .submit_identity(identity("gift@example.com"), Some(&email("me@example.com")))
            .unwrap();
    }

    #[test]
    fn test_steps_cannot_be_skipped() {
        let mut checkout = CheckoutSession::new();
        assert!(matches!(
            checkout.submit_shipping(address()),
            Err(CheckoutError::StepNotReached {
                requested: CheckoutStep::Shipping,
                current: CheckoutStep::Identity
            })
        ));
        assert!(matches!(
            checkout.confirm_review(&priced(1, 100)),
            Err(CheckoutError::StepNotReached { .. })
        ));
        assert!(matches!(
            checkout.submit_payment(PaymentMethod::Card, &priced(1, 100)),
            Err(CheckoutError::StepNotReached { .. })
        ));
    }

    #[test]
    fn test_invalid_fields() {
        let mut checkout = CheckoutSession::new();
        let bad_name = Identity {
            name: " ".to_owned(),
            ..identity("a@example.com")
        };
        assert!(matches!(
            checkout.submit_identity(bad_name, Some(&email("a@example.com"))),
            Err(CheckoutError::InvalidField { field: "name", .. })
        ));

        let bad_phone = Identity {
            phone: Some("call me".to_owned()),
            ..identity("a@example.com")
        };
        assert!(matches!(
            checkout.submit_identity(bad_phone, Some(&email("a@example.com"))),
            Err(CheckoutError::InvalidField { field: "phone", .. })
        ));

        checkout
            .submit_identity(identity("a@example.com"), Some(&email("a@example.com")))
            .unwrap();
        let err = checkout
            .submit_shipping(ShippingAddress {
                postal_code: String::new(),
                ..address()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidField {
                field: "postal_code",
                ..
            }
        ));
    }

    #[test]
    fn test_review_rejects_empty_cart() {
        let mut checkout = CheckoutSession::new();
        checkout
            .submit_identity(identity("a@example.com"), Some(&email("a@example.com")))
            .unwrap();
        checkout.submit_shipping(address()).unwrap();
        let empty = Cart::new().priced(&[]);
        assert_eq!(checkout.confirm_review(&empty), Err(CheckoutError::EmptyCart));
    }

    #[test]
    fn test_full_flow_produces_order_draft() {
        let cart = priced(2, 1500);
        let mut checkout = at_payment(&cart);
        checkout.submit_payment(PaymentMethod::Card, &cart).unwrap();
        assert!(checkout.is_complete());

        let draft = checkout
            .ready_order(&cart, &ShippingPolicy::default())
            .unwrap();
        assert_eq!(draft.subtotal, Money::from_cents(3000));
        assert_eq!(draft.shipping_cost, Money::from_cents(599));
        assert_eq!(draft.total, Money::from_cents(3599));
        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.customer_email, email("ada@example.com"));
    }

    #[test]
    fn test_cart_change_after_review_returns_to_review() {
        let cart = priced(1, 1000);
        let mut checkout = at_payment(&cart);

        let changed = priced(3, 1000);
        assert_eq!(
            checkout.submit_payment(PaymentMethod::Card, &changed),
            Err(CheckoutError::CartChanged)
        );
        assert_eq!(checkout.current_step(), CheckoutStep::Review);
        assert!(!checkout.is_reviewed());
    }

    #[test]
    fn test_ready_order_detects_price_change() {
        let cart = priced(1, 1000);
        let mut checkout = at_payment(&cart);
        checkout.submit_payment(PaymentMethod::BankTransfer, &cart).unwrap();

        let repriced = priced(1, 1200);
        assert_eq!(
            checkout.ready_order(&repriced, &ShippingPolicy::default()),
            Err(CheckoutError::CartChanged)
        );
    }

    #[test]
    fn test_ready_order_requires_payment() {
        let cart = priced(1, 1000);
        let checkout = at_payment(&cart);
        assert!(matches!(
            checkout.ready_order(&cart, &ShippingPolicy::default()),
            Err(CheckoutError::StepNotReached { .. })
        ));
    }

    #[test]
    fn test_go_back_keeps_data_and_clears_later_steps() {
        let cart = priced(1, 1000);
        let mut checkout = at_payment(&cart);
        checkout.submit_payment(PaymentMethod::Card, &cart).unwrap();

        checkout.go_to(CheckoutStep::Shipping).unwrap();
        assert_eq!(checkout.current_step(), CheckoutStep::Shipping);
        assert!(checkout.shipping().is_some());
        assert!(!checkout.is_reviewed());
        assert_eq!(checkout.payment_method(), None);
    }

    #[test]
    fn test_go_to_future_step_fails() {
        let mut checkout = CheckoutSession::new();
        assert!(matches!(
            checkout.go_to(CheckoutStep::Review),
            Err(CheckoutError::StepNotReached { .. })
        ));
    }

    #[test]
    fn test_resubmitting_identity_resets_progress() {
        let cart = priced(1, 1000);
        let mut checkout = at_payment(&cart);
        checkout
            .submit_identity(identity("ada@example.com"), Some(&email("ada@example.com")))
            .unwrap();
        assert_eq!(checkout.current_step(), CheckoutStep::Shipping);
        assert!(!checkout.is_reviewed());
    }

    #[test]
    fn test_shipping_policy() {
        let policy = ShippingPolicy {
            flat_rate: Money::from_cents(500),
            free_over: Some(Money::from_cents(5000)),
        };
        assert_eq!(policy.cost_for(&priced(1, 4999)), Money::from_cents(500));
        assert_eq!(policy.cost_for(&priced(1, 5000)), Money::ZERO);
        assert_eq!(policy.cost_for(&Cart::new().priced(&[])), Money::ZERO);

        let never_free = ShippingPolicy {
            free_over: None,
            ..policy
        };
        assert_eq!(never_free.cost_for(&priced(10, 5000)), Money::from_cents(500));
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let cart = priced(1, 1000);
        let checkout = at_payment(&cart);
        let json = serde_json::to_string(&checkout).unwrap();
        let back: CheckoutSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkout);
    }
}
