//! Database record types shared by every backend.
//!
//! These types map 1:1 onto table rows. Aggregates (a bundle order together with its items) and
//! query/request objects live in the [`crate::mke_api`] object modules instead.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mkt_common::{FxAmount, Points};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        Role         ---------------------------------------------------------
/// The three actor roles the engine recognises. Identity and authentication are handled upstream;
/// callers hand the engine a `(user id, Role)` pair and the engine trusts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Role {
    /// An end user who posts purchase requests and pays for them.
    User,
    /// An intermediary who claims orders and researches prices abroad.
    Agent,
    /// A platform administrator who arbitrates payments and disputes.
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Agent => write!(f, "Agent"),
            Role::Admin => write!(f, "Admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            "Agent" => Ok(Self::Agent),
            "Admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Agent | Role::Admin)
    }
}

//--------------------------------------   OrderStatusType    --------------------------------------------------------
/// The status vocabulary shared by single orders, bundle orders and bundle items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Newly created and visible to all agents. No agent is assigned yet.
    Published,
    /// An agent has claimed the order and is researching prices.
    UnderAgentReview,
    /// A price report has been filed; the user must now pay.
    AwaitingUserPayment,
    /// The admin has verified the user's payment. Terminal, successful.
    Completed,
    /// Terminal. Reachable from every non-terminal state under role-specific rules.
    Cancelled,
}

impl OrderStatusType {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Completed | OrderStatusType::Cancelled)
    }

    /// Active states count against the user's concurrent-order quota.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Published => write!(f, "Published"),
            OrderStatusType::UnderAgentReview => write!(f, "UnderAgentReview"),
            OrderStatusType::AwaitingUserPayment => write!(f, "AwaitingUserPayment"),
            OrderStatusType::Completed => write!(f, "Completed"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Published" => Ok(Self::Published),
            "UnderAgentReview" => Ok(Self::UnderAgentReview),
            "AwaitingUserPayment" => Ok(Self::AwaitingUserPayment),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------       OrderId        --------------------------------------------------------
/// The public, opaque identifier of an order or bundle order. Internal numeric row ids never leave
/// the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     UserProfile      --------------------------------------------------------
/// A user/agent/admin profile row. Carries the ledger's only mutable balance (`research_cards`)
/// and, for agents, the performance rollup fields.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub role: Role,
    pub name: String,
    /// Unique. Peer-to-peer card transfers resolve the recipient by phone number.
    pub phone: String,
    pub cargo_name: Option<String>,
    pub email: Option<String>,
    pub email_opt_out: bool,
    pub research_cards: i64,
    pub agent_points: Points,
    /// Blended success rate, 0..=100. See [`crate::mke_api::agent_stats_api`].
    pub success_rate: i64,
    pub total_transactions: i64,
    pub avg_rating: f64,
    /// Admin-assigned top-list position. Not derived from the stats.
    pub rank: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub role: Role,
    pub name: String,
    pub phone: String,
    pub cargo_name: Option<String>,
    pub email: Option<String>,
}

impl NewUserProfile {
    pub fn new<S1: Into<String>, S2: Into<String>>(role: Role, name: S1, phone: S2) -> Self {
        Self { role, name: name.into(), phone: phone.into(), cargo_name: None, email: None }
    }

    pub fn with_cargo<S: Into<String>>(mut self, cargo: S) -> Self {
        self.cargo_name = Some(cargo.into());
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }
}

//--------------------------------------        Order         --------------------------------------------------------
/// A single-product purchase request. `agent_id` is assigned exactly once, by the first agent to
/// claim the order, and is never reassigned.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: i64,
    pub agent_id: Option<i64>,
    pub product_name: String,
    pub description: Option<String>,
    pub image_urls: Json<Vec<String>>,
    pub status: OrderStatusType,
    /// The user's claim that they paid. A request for verification, not verification itself.
    pub user_payment_confirmed: bool,
    pub user_payment_verified: bool,
    pub agent_payment_paid: bool,
    pub track_code: Option<String>,
    pub cancel_reason: Option<String>,
    pub archived_by_user: bool,
    pub archived_by_agent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: i64,
    pub product_name: String,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(order_id: OrderId, user_id: i64, product_name: S) -> Self {
        Self { order_id, user_id, product_name: product_name.into(), description: None, image_urls: Vec::new() }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_urls(mut self, urls: Vec<String>) -> Self {
        self.image_urls = urls;
        self
    }
}

//--------------------------------------     ReportMode       --------------------------------------------------------
/// How an agent prices a bundle order: one aggregate quote, or a quote per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    Single,
    PerItem,
}

impl Display for ReportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportMode::Single => write!(f, "single"),
            ReportMode::PerItem => write!(f, "per_item"),
        }
    }
}

impl FromStr for ReportMode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "per_item" => Ok(Self::PerItem),
            s => Err(ConversionError(format!("Invalid report mode: {s}"))),
        }
    }
}

//--------------------------------------     BundleOrder      --------------------------------------------------------
/// The parent row of a multi-item order. The snapshot fields are a receipt of the user's profile
/// at creation time and are never updated afterwards, even if the profile changes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BundleOrder {
    pub id: i64,
    pub order_id: OrderId,
    pub user_id: i64,
    pub agent_id: Option<i64>,
    pub snapshot_name: String,
    pub snapshot_phone: String,
    pub snapshot_cargo: Option<String>,
    pub status: OrderStatusType,
    pub report_mode: ReportMode,
    pub bundle_report: Option<Json<BundleReport>>,
    pub user_payment_confirmed: bool,
    pub user_payment_verified: bool,
    pub agent_payment_paid: bool,
    pub track_code: Option<String>,
    pub cancel_reason: Option<String>,
    pub archived_by_user: bool,
    pub archived_by_agent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single line item inside a bundle order. Items are owned exclusively by their parent and are
/// only ever mutated through the bundle aggregate's API.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BundleItem {
    pub id: i64,
    pub bundle_id: i64,
    pub product_name: String,
    pub description: Option<String>,
    pub image_urls: Json<Vec<String>>,
    pub status: OrderStatusType,
    pub report: Option<Json<ItemReport>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An agent's per-item price quote, embedded in the item row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub user_amount: FxAmount,
    pub payment_link: Option<String>,
    #[serde(default)]
    pub additional_images: Vec<String>,
    pub additional_description: Option<String>,
    pub quantity: Option<i64>,
}

/// The aggregate quote used in [`ReportMode::Single`]. One price covers every item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleReport {
    pub total_user_amount: FxAmount,
    pub payment_link: Option<String>,
    #[serde(default)]
    pub additional_images: Vec<String>,
    pub additional_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBundleOrder {
    pub order_id: OrderId,
    pub user_id: i64,
    pub report_mode: ReportMode,
    pub items: Vec<NewBundleItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBundleItem {
    pub product_name: String,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
}

impl NewBundleOrder {
    pub fn new(order_id: OrderId, user_id: i64, items: Vec<NewBundleItem>) -> Self {
        Self { order_id, user_id, report_mode: ReportMode::PerItem, items }
    }

    pub fn with_report_mode(mut self, mode: ReportMode) -> Self {
        self.report_mode = mode;
        self
    }
}

impl NewBundleItem {
    pub fn new<S: Into<String>>(product_name: S) -> Self {
        Self { product_name: product_name.into(), description: None, image_urls: Vec::new() }
    }
}

//--------------------------------------     AgentReport      --------------------------------------------------------
/// The price quote an agent files against a single order. 1:1 with the order via the unique
/// `order_id`. `user_amount` is the authoritative current price, in the agent's foreign currency.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentReport {
    pub id: i64,
    pub order_id: OrderId,
    pub agent_id: i64,
    pub user_amount: FxAmount,
    pub payment_link: Option<String>,
    pub additional_images: Json<Vec<String>>,
    pub additional_description: Option<String>,
    pub quantity: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the append-only price-edit trail for an [`AgentReport`].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReportEdit {
    pub id: i64,
    pub order_id: OrderId,
    pub previous_amount: FxAmount,
    pub new_amount: FxAmount,
    pub reason: Option<String>,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgentReport {
    pub user_amount: FxAmount,
    pub payment_link: Option<String>,
    pub additional_images: Vec<String>,
    pub additional_description: Option<String>,
    pub quantity: Option<i64>,
    /// Optional reason recorded in the edit trail when this filing changes an existing price.
    pub edit_reason: Option<String>,
}

impl NewAgentReport {
    pub fn new(user_amount: FxAmount) -> Self {
        Self {
            user_amount,
            payment_link: None,
            additional_images: Vec::new(),
            additional_description: None,
            quantity: None,
            edit_reason: None,
        }
    }

    pub fn with_payment_link<S: Into<String>>(mut self, link: S) -> Self {
        self.payment_link = Some(link.into());
        self
    }

    pub fn with_edit_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.edit_reason = Some(reason.into());
        self
    }
}

//-----------------------------------   CardTransactionType   --------------------------------------------------------
/// Research-card ledger entry types. Stored as snake_case codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CardTransactionType {
    InitialGrant,
    OrderDeduction,
    OrderRefund,
    /// Zero-delta audit record: the card was already spent at bundle creation and removing an item
    /// pre-payment does not return it.
    BundleItemRemoval,
    UserTransfer,
    AgentGift,
    AdminGift,
}

impl CardTransactionType {
    /// Whether entries of this type move any balance at all. Burns are audit-only.
    pub fn moves_balance(&self) -> bool {
        !matches!(self, CardTransactionType::BundleItemRemoval)
    }
}

impl Display for CardTransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CardTransactionType::InitialGrant => "initial_grant",
            CardTransactionType::OrderDeduction => "order_deduction",
            CardTransactionType::OrderRefund => "order_refund",
            CardTransactionType::BundleItemRemoval => "bundle_item_removal",
            CardTransactionType::UserTransfer => "user_transfer",
            CardTransactionType::AgentGift => "agent_gift",
            CardTransactionType::AdminGift => "admin_gift",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CardTransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial_grant" => Ok(Self::InitialGrant),
            "order_deduction" => Ok(Self::OrderDeduction),
            "order_refund" => Ok(Self::OrderRefund),
            "bundle_item_removal" => Ok(Self::BundleItemRemoval),
            "user_transfer" => Ok(Self::UserTransfer),
            "agent_gift" => Ok(Self::AgentGift),
            "admin_gift" => Ok(Self::AdminGift),
            s => Err(ConversionError(format!("Invalid card transaction type: {s}"))),
        }
    }
}

//--------------------------------------   CardTransaction    --------------------------------------------------------
/// An immutable research-card ledger entry. Every change to a profile's `research_cards` balance
/// is paired with exactly one of these in the same database transaction. Credits flow *to*
/// `to_user_id` and *from* `from_user_id`; grants have no source and deductions no destination.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CardTransaction {
    pub id: i64,
    pub from_user_id: Option<i64>,
    pub to_user_id: Option<i64>,
    pub amount: i64,
    pub tx_type: CardTransactionType,
    pub recipient_phone: Option<String>,
    pub order_id: Option<OrderId>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  NotificationType    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderClaimed,
    OrderWithdrawn,
    ReportFiled,
    PaymentRequested,
    PaymentVerified,
    OrderCancelled,
    SettlementPaid,
    CardsReceived,
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationType::OrderClaimed => "order_claimed",
            NotificationType::OrderWithdrawn => "order_withdrawn",
            NotificationType::ReportFiled => "report_filed",
            NotificationType::PaymentRequested => "payment_requested",
            NotificationType::PaymentVerified => "payment_verified",
            NotificationType::OrderCancelled => "order_cancelled",
            NotificationType::SettlementPaid => "settlement_paid",
            NotificationType::CardsReceived => "cards_received",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    Notification      --------------------------------------------------------
/// A per-user notification record. Created as a side effect of a state transition; nothing about
/// it is ever mutated except the `is_read` flip.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub order_id: Option<OrderId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub order_id: Option<OrderId>,
}

impl NewNotification {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        user_id: i64,
        notification_type: NotificationType,
        title: S1,
        message: S2,
    ) -> Self {
        Self { user_id, notification_type, title: title.into(), message: message.into(), order_id: None }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

//--------------------------------------    OutboxStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "Pending"),
            OutboxStatus::Sent => write!(f, "Sent"),
            OutboxStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------    OutboxEmail       --------------------------------------------------------
/// A queued outbound e-mail. Dispatch is decoupled from the request that produced it, so delivery
/// failures are observable and retryable instead of silently dropped.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboxEmail {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     AgentReview      --------------------------------------------------------
/// A star rating (1..=5) left for an agent. Feeds the rating-based half of the success-rate blend.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentReview {
    pub id: i64,
    pub agent_id: i64,
    pub reviewer_id: i64,
    pub rating: i64,
    pub created_at: DateTime<Utc>,
}
