use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Upper bound for a discount percentage.
pub const MAX_DISCOUNT: i32 = 100;

/// Upper bound for a listed price, in minor units.
pub const MAX_PRICE: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Delivery,
    Pickup,
    #[default]
    Both,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Delivery => "delivery",
            DeliveryMethod::Pickup => "pickup",
            DeliveryMethod::Both => "both",
        }
    }
}

impl FromStr for DeliveryMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivery" => Ok(DeliveryMethod::Delivery),
            "pickup" => Ok(DeliveryMethod::Pickup),
            "both" => Ok(DeliveryMethod::Both),
            other => Err(AppError::BadRequest(format!(
                "invalid delivery method '{other}'"
            ))),
        }
    }
}

/// Order-level status. Kept independent from the per-item statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Accepted,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "accepted" => Ok(OrderStatus::Accepted),
            _ => Err(AppError::BadRequest("Invalid order status".into())),
        }
    }
}

/// Fulfillment status of a single order line.
///
/// `Delivered` and `Cancelled` are terminal. Only `pending -> delivered`
/// carries side effects (stock and seller balance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Delivered,
    Cancelled,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Delivered => "delivered",
            ItemStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Delivered | ItemStatus::Cancelled)
    }

    /// Validates a status write requested through the status endpoint.
    pub fn transition(self, next: ItemStatus) -> Result<ItemStatus, AppError> {
        if self.is_terminal() {
            return Err(AppError::Conflict(format!(
                "order item is already {} and cannot become {}",
                self, next
            )));
        }
        Ok(next)
    }

    /// Cancellation is refused only for delivered items.
    pub fn cancel(self) -> Result<ItemStatus, AppError> {
        if self == ItemStatus::Delivered {
            return Err(AppError::Conflict(
                "Delivered items cannot be cancelled".into(),
            ));
        }
        Ok(ItemStatus::Cancelled)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "delivered" => Ok(ItemStatus::Delivered),
            "cancelled" => Ok(ItemStatus::Cancelled),
            _ => Err(AppError::BadRequest("Invalid order item status".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Payment,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Payment => "payment",
        }
    }
}

impl FromStr for EntryType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(EntryType::Payment),
            other => Err(AppError::Internal(anyhow::anyhow!(
                "unknown ledger entry type '{other}'"
            ))),
        }
    }
}

/// Which surface a conversation belongs to. Both kinds share one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// user to user chat
    Direct,
    /// buyer to seller chat about listings
    Product,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Direct => "direct",
            ConversationKind::Product => "product",
        }
    }
}

impl FromStr for ConversationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ConversationKind::Direct),
            "product" => Ok(ConversationKind::Product),
            other => Err(AppError::Internal(anyhow::anyhow!(
                "unknown conversation kind '{other}'"
            ))),
        }
    }
}

/// Unordered pair of conversation participants, stored sorted so that
/// (a, b) and (b, a) share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: Uuid,
    high: Uuid,
}

impl ParticipantPair {
    /// Returns `None` when both sides are the same user.
    pub fn new(a: Uuid, b: Uuid) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.low == id || self.high == id
    }

    pub fn other(&self, id: Uuid) -> Option<Uuid> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

/// Price after discount, rounded half up to the nearest minor unit.
pub fn effective_price(price: i64, discount: i32) -> i64 {
    let discount = discount.clamp(0, MAX_DISCOUNT) as i128;
    let price = price.max(0) as i128;
    // Never exceeds `price`, so it always fits back into i64.
    ((price * (100 - discount) + 50) / 100) as i64
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub university: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub discount: i32,
    pub effective_price: i64,
    pub stock: i32,
    pub category: String,
    pub delivery_method: DeliveryMethod,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SellerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub university: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ProductComment {
    pub id: Uuid,
    pub product_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_image: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub phone_number: String,
    pub selected_bank: String,
    pub address: String,
    pub receipt_image: Option<String>,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub product_name: Option<String>,
    pub product_image: Option<String>,
    pub quantity: i32,
    /// Unit price frozen at checkout.
    pub price: i64,
    pub line_total: i64,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub kind: ConversationKind,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub is_image: bool,
    pub caption: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub reply_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_is_seller: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LastMessage {
    pub id: Uuid,
    pub body: String,
    pub is_image: bool,
    pub caption: Option<String>,
    pub is_read: bool,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PartnerSummary {
    pub partner: SellerSummary,
    pub conversation_id: Uuid,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AccountEntry {
    pub id: Uuid,
    pub amount: i64,
    pub entry_type: EntryType,
    pub reference: String,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: i64,
    pub history: Vec<AccountEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_price_applies_discount() {
        assert_eq!(effective_price(100, 20), 80);
        assert_eq!(effective_price(100, 0), 100);
        assert_eq!(effective_price(100, 100), 0);
        assert_eq!(effective_price(999, 15), 849);
    }

    #[test]
    fn effective_price_never_negative() {
        assert_eq!(effective_price(100, 150), 0);
        assert_eq!(effective_price(-5, 10), 0);
        assert_eq!(effective_price(100, -10), 100);
    }

    #[test]
    fn effective_price_handles_huge_prices() {
        assert_eq!(effective_price(i64::MAX, 0), i64::MAX);
        assert_eq!(effective_price(i64::MAX / 50, 0), i64::MAX / 50);
        assert_eq!(effective_price(i64::MAX, 100), 0);
        assert!(effective_price(i64::MAX, 50) < i64::MAX);
    }

    #[test]
    fn pending_item_can_move_anywhere() {
        for next in [ItemStatus::Pending, ItemStatus::Delivered, ItemStatus::Cancelled] {
            assert_eq!(ItemStatus::Pending.transition(next).unwrap(), next);
        }
    }

    #[test]
    fn terminal_items_reject_every_transition() {
        for from in [ItemStatus::Delivered, ItemStatus::Cancelled] {
            for next in [ItemStatus::Pending, ItemStatus::Delivered, ItemStatus::Cancelled] {
                let err = from.transition(next).unwrap_err();
                assert!(matches!(err, AppError::Conflict(_)), "{from} -> {next}");
            }
        }
    }

    #[test]
    fn cancel_rejects_only_delivered() {
        assert_eq!(ItemStatus::Pending.cancel().unwrap(), ItemStatus::Cancelled);
        assert_eq!(ItemStatus::Cancelled.cancel().unwrap(), ItemStatus::Cancelled);
        assert!(matches!(
            ItemStatus::Delivered.cancel(),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn order_status_accepts_only_pending_and_accepted() {
        assert_eq!("pending".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!("accepted".parse::<OrderStatus>().unwrap(), OrderStatus::Accepted);
        assert!(matches!(
            "shipped".parse::<OrderStatus>(),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn participant_pair_is_commutative() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ab = ParticipantPair::new(a, b).unwrap();
        let ba = ParticipantPair::new(b, a).unwrap();
        assert_eq!(ab, ba);
        assert!(ab.low() < ab.high());
        assert_eq!(ab.other(a), Some(b));
        assert_eq!(ab.other(b), Some(a));
        assert_eq!(ab.other(Uuid::new_v4()), None);
    }

    #[test]
    fn participant_pair_rejects_self_conversation() {
        let a = Uuid::new_v4();
        assert!(ParticipantPair::new(a, a).is_none());
    }

    #[test]
    fn status_strings_round_trip_through_storage_form() {
        for status in [ItemStatus::Pending, ItemStatus::Delivered, ItemStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert_eq!("pickup".parse::<DeliveryMethod>().unwrap(), DeliveryMethod::Pickup);
        assert!("drone".parse::<DeliveryMethod>().is_err());
    }
}
