//! Domain types for the Storeroom rental system.
//!
//! This module contains all value objects and entities shared across the
//! inventory ledger, booking manager, and payment reconciler.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a storage unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(Uuid);

impl UnitId {
    /// Creates a new random `UnitId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UnitId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a payment attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Creates a new random `AttemptId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `AttemptId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
///
/// The payment gateway charges whole shillings, so [`Money::shillings`] is
/// what goes on the wire; cents keep internal arithmetic exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole shillings
    ///
    /// # Panics
    ///
    /// Panics if the conversion would overflow (shillings * 100 > `u64::MAX`).
    /// Use `checked_from_shillings` for non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_shillings(shillings: u64) -> Self {
        match shillings.checked_mul(100) {
            Some(cents) => Self(cents),
            None => panic!("Money::from_shillings overflow"),
        }
    }

    /// Creates a `Money` value from whole shillings with overflow checking
    #[must_use]
    pub const fn checked_from_shillings(shillings: u64) -> Option<Self> {
        match shillings.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in whole shillings (rounded down)
    #[must_use]
    pub const fn shillings(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KES {}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Storage units
// ============================================================================

/// Availability of a storage unit
///
/// A unit has a single binary-ish availability flag: it is either free,
/// held by a booking awaiting payment, or occupied by a paid booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    /// Free to reserve
    Available,
    /// Held by a booking awaiting payment
    Reserved,
    /// Occupied by a paid booking
    Occupied,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Reserved => write!(f, "reserved"),
            Self::Occupied => write!(f, "occupied"),
        }
    }
}

/// A reservable storage unit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageUnit {
    /// Unit ID
    pub id: UnitId,
    /// Human-facing unit number (e.g. "A-12")
    pub unit_number: String,
    /// Site the unit belongs to
    pub site: String,
    /// Monthly rental rate
    pub monthly_rate: Money,
    /// Optional free-form location description
    pub location: Option<String>,
    /// Descriptive features (climate control, drive-up access, ...)
    pub features: Vec<String>,
    /// Current availability
    pub status: UnitStatus,
}

impl StorageUnit {
    /// Creates a new available unit
    #[must_use]
    pub fn new(unit_number: impl Into<String>, site: impl Into<String>, monthly_rate: Money) -> Self {
        Self {
            id: UnitId::new(),
            unit_number: unit_number.into(),
            site: site.into(),
            monthly_rate,
            location: None,
            features: Vec::new(),
            status: UnitStatus::Available,
        }
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// Customer contact details captured with a booking
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerContact {
    /// Full name
    pub full_name: String,
    /// Phone number in international format (e.g. 2547XXXXXXXX)
    pub phone_number: String,
    /// Email address
    pub email: String,
}

/// Half-open rental period `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the rental
    pub start: NaiveDate,
    /// Day the rental ends (exclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new date range
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A range is well-formed when it starts before it ends
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// Whether the rental has started on the given day
    #[must_use]
    pub fn has_started(&self, today: NaiveDate) -> bool {
        self.start <= today
    }
}

/// Lifecycle of a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, no payment attempt opened yet
    Pending,
    /// A payment attempt is in flight
    AwaitingPayment,
    /// Payment confirmed, rental not started yet
    Paid,
    /// Payment confirmed and rental period running
    Active,
    /// Rental period ended
    Completed,
    /// Cancelled before payment (explicitly or by expiry)
    Cancelled,
    /// Payment definitively failed
    Failed,
}

impl BookingStatus {
    /// Terminal statuses cannot transition any further
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::AwaitingPayment => write!(f, "awaiting_payment"),
            Self::Paid => write!(f, "paid"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A reservation of a storage unit for a date range
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// Reserved unit
    pub unit_id: UnitId,
    /// Customer contact details
    pub customer: CustomerContact,
    /// Rental period
    pub range: DateRange,
    /// Cost computed for the full period
    pub total_cost: Money,
    /// Current lifecycle status
    pub status: BookingStatus,
    /// When the booking was created
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Payment attempts
// ============================================================================

/// Lifecycle of one gateway-correlated charge request
///
/// Attempts only ever move forward:
/// `Initiated → Pending → {Completed | Failed}`, or `Pending → Expired`
/// after the configured wait window passes without a callback or a
/// conclusive status query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Charge request built, not yet acknowledged by the gateway
    Initiated,
    /// Gateway accepted the charge; waiting for the customer to confirm
    Pending,
    /// Gateway reported the charge succeeded
    Completed,
    /// Gateway declined or reported the charge failed
    Failed,
    /// Wait window elapsed with no conclusive answer
    Expired,
}

impl AttemptStatus {
    /// Terminal statuses absorb all later events for the attempt
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiated => write!(f, "initiated"),
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// One gateway-correlated charge request tied to a booking
///
/// A booking may accumulate several attempts across retries, but at most one
/// is non-terminal at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Attempt ID
    pub id: AttemptId,
    /// Booking the attempt pays for
    pub booking_id: BookingId,
    /// Amount charged
    pub amount: Money,
    /// Phone number the STK prompt was pushed to
    pub phone_number: String,
    /// Gateway correlation ID, assigned at initiation
    pub checkout_request_id: Option<String>,
    /// Gateway-internal request ID, assigned at initiation
    pub merchant_request_id: Option<String>,
    /// Gateway receipt identifier, present once completed
    pub receipt: Option<String>,
    /// Failure description, present once failed
    pub failure: Option<String>,
    /// Current status
    pub status: AttemptStatus,
    /// When the charge was initiated
    pub initiated_at: DateTime<Utc>,
    /// When the attempt reached a terminal status
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    /// Builds an attempt in the `Initiated` state
    #[must_use]
    pub fn initiated(
        booking_id: BookingId,
        amount: Money,
        phone_number: impl Into<String>,
        initiated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AttemptId::new(),
            booking_id,
            amount,
            phone_number: phone_number.into(),
            checkout_request_id: None,
            merchant_request_id: None,
            receipt: None,
            failure: None,
            status: AttemptStatus::Initiated,
            initiated_at,
            resolved_at: None,
        }
    }

    /// Attaches the correlation identifiers the gateway assigned
    #[must_use]
    pub fn with_gateway_ids(
        mut self,
        checkout_request_id: impl Into<String>,
        merchant_request_id: impl Into<String>,
    ) -> Self {
        self.checkout_request_id = Some(checkout_request_id.into());
        self.merchant_request_id = Some(merchant_request_id.into());
        self
    }
}
