//! The single-order state machine.
//!
//! `OrderFlowApi` owns every lifecycle mutation for single-product orders. Role and ownership
//! rules are enforced here, against the pure transition table in [`crate::mke_api::transitions`];
//! the backend re-checks only the state preconditions with conditional updates so that two racing
//! requests cannot both win. Each successful transition publishes an event for the notification
//! fan-out and any host-supplied hooks.

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{NewAgentReport, NewOrder, Order, OrderId, OrderStatusType, Role},
    events::{ClaimEvent, EventProducers, OrderScope, SettlementEvent, StatusChangedEvent},
    mke_api::{
        order_limits::{self, local_midnight},
        transitions::{can_advance, check_cancellation, CancelContext},
    },
    traits::{
        ArchiveSide,
        LedgerManagement,
        MarketplaceDatabase,
        OrderFlowError,
        SettingsManagement,
        UserManagement,
    },
};

pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B: std::fmt::Debug> std::fmt::Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi {{ db: {:?} }}", self.db)
    }
}

impl<B> OrderFlowApi<B>
where B: MarketplaceDatabase + UserManagement + LedgerManagement + SettingsManagement
{
    pub fn new(db: B) -> Self {
        Self { db, producers: EventProducers::default() }
    }

    /// Attaches event producers so transitions made through this API reach the subscribed
    /// handlers.
    pub fn with_producers(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Creates a new order in `Published` state.
    ///
    /// The creator passes the order-limit policy first (end users only), then one research card
    /// is deducted atomically with the insert. Staff creators are quota-exempt and spend no
    /// cards.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        let user = self
            .db
            .fetch_user(order.user_id)
            .await
            .map_err(OrderFlowError::from)?
            .ok_or(OrderFlowError::UserNotFound(order.user_id))?;
        let settings = self.db.fetch_settings().await.map_err(OrderFlowError::from)?;
        if !user.role.is_staff() && settings.order_limit_enabled {
            let created_today = self.db.count_created_since(user.id, local_midnight(Utc::now())).await?;
            let active = self.db.count_active_for_user(user.id).await?;
            order_limits::evaluate(&settings, user.role, created_today, active)
                .map_err(|refusal| OrderFlowError::LimitExceeded(refusal.to_string()))?;
        }
        let cards = if user.role.is_staff() { 0 } else { 1 };
        let order = self.db.insert_order(order, cards).await?;
        info!("🛒️ User {} published order {}", user.id, order.order_id);
        Ok(order)
    }

    /// An agent claims a published order, becoming its permanent `agent_id`. The storage layer's
    /// conditional update resolves concurrent claims; exactly one caller wins and the rest
    /// receive [`OrderFlowError::AlreadyClaimed`].
    pub async fn claim_order(&self, agent_id: i64, role: Role, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        if role != Role::Agent {
            return Err(OrderFlowError::Forbidden("only agents may claim orders".to_string()));
        }
        let order = self.db.claim_order(order_id, agent_id).await?;
        info!("🛒️ Agent {agent_id} claimed order {order_id}");
        let event = ClaimEvent {
            scope: OrderScope::Single,
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            agent_id,
        };
        for producer in &self.producers.claim_producer {
            producer.publish_event(event.clone()).await;
        }
        Ok(order)
    }

    /// Moves an order forward along the lifecycle. Consults the role transition table; the
    /// report-gated `UnderAgentReview → AwaitingUserPayment` hop additionally requires a filed
    /// report, and `AwaitingUserPayment → Completed` is the admin's payment verification.
    pub async fn advance_order(
        &self,
        role: Role,
        order_id: &OrderId,
        new_status: OrderStatusType,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if !can_advance(role, order.status, new_status) {
            return Err(OrderFlowError::InvalidTransition(format!(
                "{role} may not move order {order_id} from {} to {new_status}",
                order.status
            )));
        }
        if new_status == OrderStatusType::AwaitingUserPayment &&
            self.db.fetch_report_for_order(order_id).await?.is_none()
        {
            return Err(OrderFlowError::InvalidTransition(
                "a price report must be filed before requesting payment".to_string(),
            ));
        }
        let old_status = order.status;
        let order = if new_status == OrderStatusType::Completed {
            self.db.complete_order(order_id).await?
        } else {
            self.db.force_order_status(order_id, old_status, new_status).await?
        };
        info!("🛒️ Order {order_id} moved {old_status} -> {new_status}");
        self.publish_status_change(&order, old_status).await;
        Ok(order)
    }

    /// Files (or edits) the price report for an order the agent has claimed. On first filing the
    /// order moves to `AwaitingUserPayment`; price edits before the payment is verified append to
    /// the edit trail instead.
    pub async fn submit_report(
        &self,
        agent_id: i64,
        role: Role,
        order_id: &OrderId,
        report: NewAgentReport,
    ) -> Result<Order, OrderFlowError> {
        if !report.user_amount.is_positive() {
            return Err(OrderFlowError::ValidationError(format!(
                "report amounts must be positive, got {}",
                report.user_amount
            )));
        }
        let order = self.fetch_order(order_id).await?;
        if role != Role::Admin && order.agent_id != Some(agent_id) {
            return Err(OrderFlowError::Forbidden("only the assigned agent may file a report".to_string()));
        }
        match order.status {
            OrderStatusType::UnderAgentReview => {},
            OrderStatusType::AwaitingUserPayment if !order.user_payment_verified => {},
            OrderStatusType::AwaitingUserPayment => {
                return Err(OrderFlowError::InvalidTransition(
                    "the payment has been verified; the report can no longer be edited".to_string(),
                ));
            },
            s => {
                return Err(OrderFlowError::InvalidTransition(format!("cannot file a report for an order in {s}")));
            },
        }
        let old_status = order.status;
        let order = self.db.upsert_report(order_id, agent_id, report).await?;
        if order.status == old_status {
            info!("🛒️ Agent {agent_id} edited the report for order {order_id}");
        } else {
            info!("🛒️ Agent {agent_id} filed a report for order {order_id}; payment is now due");
            self.publish_status_change(&order, old_status).await;
        }
        Ok(order)
    }

    /// The user flags that they have paid. A request for verification only; the admin's
    /// [`Self::advance_order`] to `Completed` remains the authoritative confirmation.
    pub async fn confirm_payment(&self, user_id: i64, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if order.user_id != user_id {
            return Err(OrderFlowError::Forbidden("only the order's creator may confirm payment".to_string()));
        }
        if order.status != OrderStatusType::AwaitingUserPayment {
            return Err(OrderFlowError::InvalidTransition(format!(
                "cannot confirm payment for an order in {}",
                order.status
            )));
        }
        let order = self.db.confirm_user_payment(order_id).await?;
        info!("🛒️ User {user_id} reports payment made for order {order_id}");
        Ok(order)
    }

    /// Settlement: releases the agent's commission and refunds the creator's spent research card.
    ///
    /// Commission is `user_amount × exchange_rate × 5%`. The refund only ever happens here, and
    /// the conditional update on `agent_payment_paid` guarantees it happens at most once per
    /// order.
    pub async fn settle_order(&self, role: Role, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        if role != Role::Admin {
            return Err(OrderFlowError::Forbidden("only admins may settle orders".to_string()));
        }
        let order = self.fetch_order(order_id).await?;
        if order.status != OrderStatusType::Completed {
            return Err(OrderFlowError::InvalidTransition(format!(
                "only completed orders can be settled; order {order_id} is {}",
                order.status
            )));
        }
        if order.agent_payment_paid {
            return Err(OrderFlowError::InvalidTransition(format!("order {order_id} has already been settled")));
        }
        let agent_id = order
            .agent_id
            .ok_or_else(|| OrderFlowError::InvalidTransition("the order has no assigned agent".to_string()))?;
        let report = self
            .db
            .fetch_report_for_order(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::InvalidTransition("the order has no price report".to_string()))?;
        let settings = self.db.fetch_settings().await.map_err(OrderFlowError::from)?;
        let commission = settings.commission_points(report.user_amount);
        let creator = self
            .db
            .fetch_user(order.user_id)
            .await
            .map_err(OrderFlowError::from)?
            .ok_or(OrderFlowError::UserNotFound(order.user_id))?;
        let refund = if creator.role.is_staff() { 0 } else { 1 };
        let order = self.db.settle_order(order_id, commission, refund).await?;
        info!("🛒️ Order {order_id} settled. Agent {agent_id} earned {commission}, {refund} card(s) refunded");
        let event = SettlementEvent {
            scope: OrderScope::Single,
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            agent_id,
            commission,
            refunded_cards: refund,
        };
        for producer in &self.producers.settlement_producer {
            producer.publish_event(event.clone()).await;
        }
        Ok(order)
    }

    /// Cancels an order under the role-gated rules of
    /// [`crate::mke_api::transitions::check_cancellation`]. Spent research cards are not
    /// refunded.
    pub async fn cancel_order(
        &self,
        actor_id: i64,
        role: Role,
        order_id: &OrderId,
        reason: Option<&str>,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let ctx = CancelContext {
            status: order.status,
            user_payment_verified: order.user_payment_verified,
            report_filed: self.db.fetch_report_for_order(order_id).await?.is_some(),
            is_owner: order.user_id == actor_id,
            is_assigned_agent: order.agent_id == Some(actor_id),
        };
        check_cancellation(role, ctx, reason)?;
        let old_status = order.status;
        let order = self.db.cancel_order(order_id, reason).await?;
        info!("🛒️ {role} {actor_id} cancelled order {order_id}");
        self.publish_status_change(&order, old_status).await;
        Ok(order)
    }

    /// Records the shipment tracking code. Assigned agent or admin only.
    pub async fn set_track_code(
        &self,
        actor_id: i64,
        role: Role,
        order_id: &OrderId,
        track_code: &str,
    ) -> Result<Order, OrderFlowError> {
        if track_code.trim().is_empty() {
            return Err(OrderFlowError::ValidationError("the tracking code cannot be empty".to_string()));
        }
        let order = self.fetch_order(order_id).await?;
        let allowed = role == Role::Admin || (role == Role::Agent && order.agent_id == Some(actor_id));
        if !allowed {
            return Err(OrderFlowError::Forbidden(
                "only the assigned agent or an admin may set the tracking code".to_string(),
            ));
        }
        self.db.set_track_code(order_id, track_code.trim()).await
    }

    /// Hides the order from the caller's own listing. Lifecycle state is untouched.
    pub async fn archive_order(
        &self,
        actor_id: i64,
        role: Role,
        order_id: &OrderId,
        side: ArchiveSide,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let allowed = match side {
            ArchiveSide::User => role == Role::Admin || order.user_id == actor_id,
            ArchiveSide::Agent => role == Role::Admin || order.agent_id == Some(actor_id),
        };
        if !allowed {
            return Err(OrderFlowError::Forbidden("you may only archive your own listing".to_string()));
        }
        self.db.archive_order(order_id, side).await
    }

    /// Maintenance sweep: returns orders that were claimed but sat without a report for longer
    /// than `window` back to the published feed, clearing the claim.
    pub async fn release_stale_claims(&self, window: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let released = self.db.release_stale_claims(window).await?;
        if !released.is_empty() {
            info!("🛒️ Released {} stale claim(s) back to the published feed", released.len());
        }
        for order in &released {
            self.publish_status_change(order, OrderStatusType::UnderAgentReview).await;
        }
        Ok(released)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    async fn publish_status_change(&self, order: &Order, old_status: OrderStatusType) {
        let event = StatusChangedEvent {
            scope: OrderScope::Single,
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            agent_id: order.agent_id,
            old_status,
            new_status: order.status,
        };
        for producer in &self.producers.status_changed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}
