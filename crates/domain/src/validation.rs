//! Order validation and totals calculation.
//!
//! Everything here is pure: no I/O, no clock. Validation collects every
//! violated rule instead of stopping at the first one so a caller can show
//! the customer all problems at once.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{CartItem, CreateOrderRequest, Money, OrderSource};

/// Default platform fee rate (1.5 % of the subtotal).
pub const DEFAULT_PLATFORM_FEE_RATE: f64 = 0.015;

/// A single violated validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "rule", content = "detail", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("Cart cannot be empty")]
    EmptyCart,

    #[error("Customer name is required")]
    MissingCustomerName,

    #[error("Customer phone is required")]
    MissingCustomerPhone,

    #[error("Restaurant ID is required")]
    MissingRestaurant,

    #[error("Table ID is required")]
    MissingTable,

    #[error("Staff ID is required for staff-assisted orders")]
    MissingStaff,

    #[error("Item {0} is missing an ID")]
    MissingItemId(usize),

    #[error("Item '{0}' quantity must be at least 1")]
    InvalidQuantity(String),

    #[error("Item '{0}' price cannot be negative")]
    InvalidPrice(String),

    #[error("Tip cannot be negative")]
    NegativeTip,

    #[error("Discount cannot be negative")]
    NegativeDiscount,

    #[error("Discount cannot exceed the order amount")]
    DiscountExceedsAmount,
}

/// Every rule an order request violated, in the order they were checked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationIssue>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.0.push(issue);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    pub fn contains(&self, issue: &ValidationIssue) -> bool {
        self.0.contains(issue)
    }

    /// Returns the human-readable message of every issue.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationIssue> for ValidationErrors {
    fn from(issue: ValidationIssue) -> Self {
        Self(vec![issue])
    }
}

/// Computed monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub platform_fee: Money,
    pub tip: Money,
    pub discount: Money,
    pub total: Money,
}

/// Computes totals for a cart.
///
/// `subtotal = Σ price × quantity`, `fee = subtotal × fee_rate`,
/// `total = subtotal + fee + tip − discount`.
pub fn calculate_totals(cart: &[CartItem], fee_rate: f64, tip: Money, discount: Money) -> Totals {
    let subtotal: Money = cart.iter().map(CartItem::line_total).sum();
    let platform_fee = subtotal.scale(fee_rate);
    Totals {
        subtotal,
        platform_fee,
        tip,
        discount,
        total: subtotal + platform_fee + tip - discount,
    }
}

/// Checks the cart lines alone.
pub fn validate_cart(cart: &[CartItem]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_cart(cart, &mut errors);
    errors.into_result(())
}

fn check_cart(cart: &[CartItem], errors: &mut ValidationErrors) {
    if cart.is_empty() {
        errors.push(ValidationIssue::EmptyCart);
    }
    for (index, item) in cart.iter().enumerate() {
        let label = if item.name.trim().is_empty() {
            item.item_id.to_string()
        } else {
            item.name.clone()
        };
        if item.item_id.as_str().trim().is_empty() {
            errors.push(ValidationIssue::MissingItemId(index + 1));
        }
        if item.quantity < 1 {
            errors.push(ValidationIssue::InvalidQuantity(label.clone()));
        }
        if item.price.is_invalid_amount() {
            errors.push(ValidationIssue::InvalidPrice(label));
        }
    }
}

/// Validates an order request and computes its totals.
///
/// Returns every violated rule when the request is invalid.
pub fn validate_order(
    request: &CreateOrderRequest,
    fee_rate: f64,
) -> Result<Totals, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    check_cart(&request.cart, &mut errors);

    if request.customer.name.trim().is_empty() {
        errors.push(ValidationIssue::MissingCustomerName);
    }
    if request.customer.phone.trim().is_empty() {
        errors.push(ValidationIssue::MissingCustomerPhone);
    }
    if request.restaurant_id.is_none() {
        errors.push(ValidationIssue::MissingRestaurant);
    }
    if request.table_id.is_none() {
        errors.push(ValidationIssue::MissingTable);
    }
    if request.source == OrderSource::Staff && request.staff_id.is_none() {
        errors.push(ValidationIssue::MissingStaff);
    }
    if request.tip.is_invalid_amount() {
        errors.push(ValidationIssue::NegativeTip);
    }

    let discount = request.discount();
    let totals = calculate_totals(&request.cart, fee_rate, request.tip, discount);
    if discount.is_invalid_amount() {
        errors.push(ValidationIssue::NegativeDiscount);
    } else if discount > totals.subtotal + totals.platform_fee + totals.tip {
        errors.push(ValidationIssue::DiscountExceedsAmount);
    }

    errors.into_result(totals)
}
