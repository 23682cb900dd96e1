use chrono::Duration;
use mkt_common::Points;
use thiserror::Error;

use crate::{
    db_types::{
        BundleOrder,
        BundleReport,
        ItemReport,
        NewAgentReport,
        NewBundleOrder,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        ReportMode,
        UserProfile,
    },
    mke_api::bundle_objects::FullBundleOrder,
    traits::{ArchiveSide, LedgerError, OrderApiError, OrderManagement, SettingsError, UserApiError},
};

/// The highest-level mutation contract a backend must support.
///
/// Every method is a single atomic unit at the storage layer: the status change, any ledger rows
/// and any counter updates commit together or not at all. Role and ownership gating is the
/// responsibility of the API layer ([`crate::mke_api::order_flow_api`] and
/// [`crate::mke_api::bundle_flow_api`]); the backend enforces the *state* preconditions with
/// conditional updates so that racing requests cannot both win.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone + OrderManagement {
    /// The URL of the database.
    fn url(&self) -> &str;

    //----------------------------------- single orders -----------------------------------------

    /// Inserts a new order with `Published` status and, in the same transaction, deducts
    /// `cards_to_deduct` research cards from the creator (zero for agent/admin creators) and
    /// writes the matching `order_deduction` ledger row.
    async fn insert_order(&self, order: NewOrder, cards_to_deduct: i64) -> Result<Order, OrderFlowError>;

    /// Claims the order for `agent_id`: sets `agent_id` and moves `Published →
    /// UnderAgentReview`, but only if no agent is currently assigned. The conditional update is
    /// what makes concurrent claims safe; the loser gets [`OrderFlowError::AlreadyClaimed`].
    async fn claim_order(&self, order_id: &OrderId, agent_id: i64) -> Result<Order, OrderFlowError>;

    /// Force-moves an order to a new status without side effects. Used for the admin transitions
    /// that mirror agent actions (`Published → UnderAgentReview`, `UnderAgentReview →
    /// AwaitingUserPayment`). Fails unless the order is currently in `expected`.
    async fn force_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<Order, OrderFlowError>;

    /// Creates or updates the agent report for an order. On first filing the order moves
    /// `UnderAgentReview → AwaitingUserPayment`. A later filing that changes the price while the
    /// user has not yet paid appends a row to the edit trail. Editing after payment verification
    /// is rejected.
    async fn upsert_report(
        &self,
        order_id: &OrderId,
        agent_id: i64,
        report: NewAgentReport,
    ) -> Result<Order, OrderFlowError>;

    /// Records the user-side payment confirmation flag. This is a request for verification, not
    /// verification itself; only [`Self::complete_order`] is authoritative.
    async fn confirm_user_payment(&self, order_id: &OrderId) -> Result<Order, OrderFlowError>;

    /// Admin verification of the user's payment: `AwaitingUserPayment → Completed`, setting
    /// `user_payment_verified`.
    async fn complete_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError>;

    /// Settlement: marks the agent payout as paid on a `Completed` order, credits `commission`
    /// points to the assigned agent and refunds `refund_cards` research cards to the buyer (with
    /// its `order_refund` ledger row), all in one transaction. Fails if the order was already
    /// settled, so the refund can never happen twice.
    async fn settle_order(&self, order_id: &OrderId, commission: Points, refund_cards: i64)
        -> Result<Order, OrderFlowError>;

    /// Cancels the order. State preconditions (`expected` states) are checked inside the update;
    /// role rules live in the API layer. Spent research cards are *not* refunded.
    async fn cancel_order(&self, order_id: &OrderId, reason: Option<&str>) -> Result<Order, OrderFlowError>;

    /// Records the shipment tracking code.
    async fn set_track_code(&self, order_id: &OrderId, track_code: &str) -> Result<Order, OrderFlowError>;

    /// Hides the order from one side's listing.
    async fn archive_order(&self, order_id: &OrderId, side: ArchiveSide) -> Result<Order, OrderFlowError>;

    /// Returns orders that have sat in `UnderAgentReview` without a report for longer than
    /// `window` back to `Published`, clearing the agent assignment. Run by a cron-style sweep.
    async fn release_stale_claims(&self, window: Duration) -> Result<Vec<Order>, OrderFlowError>;

    //----------------------------------- bundle orders -----------------------------------------

    /// Inserts a bundle order with its items, snapshotting the creator's profile, deducting one
    /// research card per item (zero for staff creators) and writing the ledger row, atomically.
    /// A bundle with no items is rejected.
    async fn insert_bundle(
        &self,
        bundle: NewBundleOrder,
        cards_to_deduct: i64,
        snapshot: &UserProfile,
    ) -> Result<FullBundleOrder, OrderFlowError>;

    /// Bundle counterpart of [`Self::claim_order`].
    async fn claim_bundle(&self, order_id: &OrderId, agent_id: i64) -> Result<BundleOrder, OrderFlowError>;

    /// Bundle counterpart of [`Self::force_order_status`]. Items are not touched; only
    /// completion and cancellation propagate to them.
    async fn force_bundle_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<BundleOrder, OrderFlowError>;

    /// Switches the reporting mode, clearing the other mode's report data (the aggregate report
    /// when switching to `per_item`; every item report when switching to `single`).
    async fn set_report_mode(&self, order_id: &OrderId, mode: ReportMode) -> Result<FullBundleOrder, OrderFlowError>;

    /// Files the aggregate report in `single` mode: stores it and force-sets every item and the
    /// parent to `AwaitingUserPayment`.
    async fn file_bundle_report(
        &self,
        order_id: &OrderId,
        report: BundleReport,
    ) -> Result<FullBundleOrder, OrderFlowError>;

    /// Files one item's report in `per_item` mode and re-evaluates convergence in the same
    /// transaction: the parent escalates to `AwaitingUserPayment` only once every item has a
    /// report.
    async fn file_item_report(
        &self,
        order_id: &OrderId,
        item_id: i64,
        report: ItemReport,
    ) -> Result<FullBundleOrder, OrderFlowError>;

    /// Removes an item from a bundle, writing the zero-delta `bundle_item_removal` audit row and
    /// re-checking convergence. Removing the last remaining item is forbidden; the state
    /// preconditions are enforced by the API layer and re-checked here.
    async fn remove_bundle_item(&self, order_id: &OrderId, item_id: i64) -> Result<FullBundleOrder, OrderFlowError>;

    /// Bundle counterpart of [`Self::confirm_user_payment`].
    async fn confirm_bundle_user_payment(&self, order_id: &OrderId) -> Result<BundleOrder, OrderFlowError>;

    /// Bundle counterpart of [`Self::complete_order`]: parent and every non-cancelled item move
    /// to `Completed`.
    async fn complete_bundle(&self, order_id: &OrderId) -> Result<BundleOrder, OrderFlowError>;

    /// Bundle counterpart of [`Self::settle_order`].
    async fn settle_bundle(
        &self,
        order_id: &OrderId,
        commission: Points,
        refund_cards: i64,
    ) -> Result<BundleOrder, OrderFlowError>;

    /// Cancels the bundle and propagates `Cancelled` to every item.
    async fn cancel_bundle(&self, order_id: &OrderId, reason: Option<&str>) -> Result<FullBundleOrder, OrderFlowError>;

    /// Bundle counterpart of [`Self::set_track_code`].
    async fn set_bundle_track_code(&self, order_id: &OrderId, track_code: &str) -> Result<BundleOrder, OrderFlowError>;

    /// Bundle counterpart of [`Self::archive_order`].
    async fn archive_bundle(&self, order_id: &OrderId, side: ArchiveSide) -> Result<BundleOrder, OrderFlowError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderFlowError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The bundle item {0} does not exist in this bundle")]
    ItemNotFound(i64),
    #[error("The requested user {0} does not exist")]
    UserNotFound(i64),
    #[error("Order {0} is already claimed by another agent")]
    AlreadyClaimed(OrderId),
    #[error("Illegal status change for this role and state: {0}")]
    InvalidTransition(String),
    #[error("You are not allowed to perform this action: {0}")]
    Forbidden(String),
    #[error("Invalid input: {0}")]
    ValidationError(String),
    #[error("Order limit reached: {0}")]
    LimitExceeded(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Query(#[from] OrderApiError),
    #[error(transparent)]
    User(#[from] UserApiError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}
