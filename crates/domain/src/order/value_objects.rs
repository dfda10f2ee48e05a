//! Value objects for the order domain.

use common::{CustomerId, MenuItemId, StaffId};
use serde::{Deserialize, Serialize};

/// Monetary amount in the restaurant currency's major unit.
///
/// Amounts are kept unrounded so that fee arithmetic stays exact to the
/// rate; use [`Money::rounded`] when presenting a value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(f64);

impl Money {
    /// Creates a new amount.
    pub fn new(amount: f64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the raw amount.
    pub fn amount(&self) -> f64 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    /// Returns true if the amount is negative, infinite or not a number.
    pub fn is_invalid_amount(&self) -> bool {
        !self.0.is_finite() || self.0 < 0.0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0 * f64::from(quantity))
    }

    /// Scales by a rate (e.g. a fee percentage expressed as a fraction).
    pub fn scale(&self, rate: f64) -> Money {
        Money(self.0 * rate)
    }

    /// Returns the amount rounded to two decimal places.
    pub fn rounded(&self) -> Money {
        Money((self.0 * 100.0).round() / 100.0)
    }

    /// Returns true if both amounts are equal within `tolerance`.
    pub fn approx_eq(&self, other: Money, tolerance: f64) -> bool {
        (self.0 - other.0).abs() <= tolerance
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A line in the customer's cart before the order exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Menu item reference.
    pub item_id: MenuItemId,

    /// Item name at the time of ordering.
    pub name: String,

    /// Unit price.
    pub price: Money,

    /// Quantity ordered.
    pub quantity: u32,

    /// Optional per-item instructions ("no onions").
    #[serde(default)]
    pub instructions: Option<String>,
}

impl CartItem {
    /// Creates a new cart item.
    pub fn new(
        item_id: impl Into<MenuItemId>,
        name: impl Into<String>,
        price: f64,
        quantity: u32,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            price: Money::new(price),
            quantity,
            instructions: None,
        }
    }

    /// Adds per-item instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Returns unit price times quantity.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// Contact details captured for the dining customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Registered customer, when the diner is signed in.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
}

impl CustomerInfo {
    /// Creates contact info for an anonymous diner.
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
            customer_id: None,
        }
    }

    /// Links the diner to a registered customer account.
    pub fn with_customer_id(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }
}

/// Who initiated an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    /// The customer ordered from the table.
    Customer,
    /// A staff member placed the order on the customer's behalf.
    Staff,
}

/// How the order is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    StaffAssisted,
}

impl From<OrderSource> for OrderType {
    fn from(source: OrderSource) -> Self {
        match source {
            OrderSource::Customer => OrderType::DineIn,
            OrderSource::Staff => OrderType::StaffAssisted,
        }
    }
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::DineIn => "dine_in",
            OrderType::StaffAssisted => "staff_assisted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Online => "online",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// A discount offer applied to an order at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOffer {
    /// Offer code or identifier as issued by the offer service.
    pub offer_id: String,

    /// Discount amount granted by the offer.
    pub discount: Money,
}

/// Who performed an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer,
    Staff(StaffId),
    Owner,
    System,
}

impl Actor {
    /// Returns the staff ID when the actor is a staff member.
    pub fn staff_id(&self) -> Option<StaffId> {
        match self {
            Actor::Staff(id) => Some(*id),
            _ => None,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer => write!(f, "customer"),
            Actor::Staff(id) => write!(f, "staff:{id}"),
            Actor::Owner => write!(f, "owner"),
            Actor::System => write!(f, "system"),
        }
    }
}
