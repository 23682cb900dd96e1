//! The bundle-order state machine.
//!
//! Bundles mirror the single-order lifecycle at the parent level, with three twists: the
//! creator's profile is snapshotted onto the bundle at creation, the agent prices either the
//! whole bundle at once (`single` mode) or item by item (`per_item` mode), and in the latter case
//! the parent only escalates to `AwaitingUserPayment` once every item carries a report. That
//! convergence re-check runs inside the same storage transaction as the item mutation that
//! triggered it, so concurrent filings on sibling items cannot leave the parent behind.

use chrono::Utc;
use log::*;

use crate::{
    db_types::{
        BundleOrder,
        BundleReport,
        ItemReport,
        NewBundleOrder,
        OrderId,
        OrderStatusType,
        ReportMode,
        Role,
    },
    events::{ClaimEvent, EventProducers, OrderScope, SettlementEvent, StatusChangedEvent},
    mke_api::{
        bundle_objects::FullBundleOrder,
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

/// Fewest items a bundle must keep: removal below two is a cancellation in disguise and is
/// rejected.
pub const MIN_BUNDLE_ITEMS: usize = 2;

pub struct BundleFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> BundleFlowApi<B>
where B: MarketplaceDatabase + UserManagement + LedgerManagement + SettingsManagement
{
    pub fn new(db: B) -> Self {
        Self { db, producers: EventProducers::default() }
    }

    pub fn with_producers(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Creates a bundle order in `Published` state, snapshotting the creator's profile onto it.
    /// End users pass the shared order-limit policy and spend one research card per item, in the
    /// same transaction as the insert.
    pub async fn create_bundle(&self, bundle: NewBundleOrder) -> Result<FullBundleOrder, OrderFlowError> {
        if bundle.items.is_empty() {
            return Err(OrderFlowError::ValidationError("a bundle order needs at least one item".to_string()));
        }
        if bundle.items.iter().any(|i| i.product_name.trim().is_empty()) {
            return Err(OrderFlowError::ValidationError("every bundle item needs a product name".to_string()));
        }
        let user = self
            .db
            .fetch_user(bundle.user_id)
            .await
            .map_err(OrderFlowError::from)?
            .ok_or(OrderFlowError::UserNotFound(bundle.user_id))?;
        let settings = self.db.fetch_settings().await.map_err(OrderFlowError::from)?;
        if !user.role.is_staff() && settings.order_limit_enabled {
            let created_today = self.db.count_created_since(user.id, local_midnight(Utc::now())).await?;
            let active = self.db.count_active_for_user(user.id).await?;
            order_limits::evaluate(&settings, user.role, created_today, active)
                .map_err(|refusal| OrderFlowError::LimitExceeded(refusal.to_string()))?;
        }
        let cards = if user.role.is_staff() { 0 } else { bundle.items.len() as i64 };
        let full = self.db.insert_bundle(bundle, cards, &user).await?;
        info!(
            "📦️ User {} published bundle {} with {} item(s)",
            user.id,
            full.bundle.order_id,
            full.item_count()
        );
        Ok(full)
    }

    /// An agent claims the whole bundle. Same conditional-update race resolution as single
    /// orders.
    pub async fn claim_bundle(
        &self,
        agent_id: i64,
        role: Role,
        order_id: &OrderId,
    ) -> Result<BundleOrder, OrderFlowError> {
        if role != Role::Agent {
            return Err(OrderFlowError::Forbidden("only agents may claim orders".to_string()));
        }
        let bundle = self.db.claim_bundle(order_id, agent_id).await?;
        info!("📦️ Agent {agent_id} claimed bundle {order_id}");
        let event = ClaimEvent {
            scope: OrderScope::Bundle,
            order_id: bundle.order_id.clone(),
            user_id: bundle.user_id,
            agent_id,
        };
        for producer in &self.producers.claim_producer {
            producer.publish_event(event.clone()).await;
        }
        Ok(bundle)
    }

    /// Switches the pricing mode while the bundle is still under review. The other mode's report
    /// data is cleared so the two can never disagree about the price.
    pub async fn set_report_mode(
        &self,
        agent_id: i64,
        role: Role,
        order_id: &OrderId,
        mode: ReportMode,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        let full = self.fetch_bundle(order_id).await?;
        self.ensure_assigned_agent(&full.bundle, agent_id, role)?;
        if full.bundle.status != OrderStatusType::UnderAgentReview {
            return Err(OrderFlowError::InvalidTransition(format!(
                "the report mode can only change during review; bundle {order_id} is {}",
                full.bundle.status
            )));
        }
        if full.bundle.report_mode == mode {
            return Ok(full);
        }
        let full = self.db.set_report_mode(order_id, mode).await?;
        info!("📦️ Bundle {order_id} switched to {mode} pricing");
        Ok(full)
    }

    /// Files the aggregate quote in `single` mode. The parent and every item move to
    /// `AwaitingUserPayment` at once.
    pub async fn file_bundle_report(
        &self,
        agent_id: i64,
        role: Role,
        order_id: &OrderId,
        report: BundleReport,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        if !report.total_user_amount.is_positive() {
            return Err(OrderFlowError::ValidationError(format!(
                "report amounts must be positive, got {}",
                report.total_user_amount
            )));
        }
        let full = self.fetch_bundle(order_id).await?;
        self.ensure_assigned_agent(&full.bundle, agent_id, role)?;
        self.ensure_reportable(&full.bundle, ReportMode::Single)?;
        let old_status = full.bundle.status;
        let full = self.db.file_bundle_report(order_id, report).await?;
        info!("📦️ Agent {agent_id} filed the aggregate report for bundle {order_id}");
        self.publish_if_changed(&full.bundle, old_status).await;
        Ok(full)
    }

    /// Files one item's quote in `per_item` mode. The parent escalates only once the last
    /// unreported item is filed; until then it stays in `UnderAgentReview`.
    pub async fn file_item_report(
        &self,
        agent_id: i64,
        role: Role,
        order_id: &OrderId,
        item_id: i64,
        report: ItemReport,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        if !report.user_amount.is_positive() {
            return Err(OrderFlowError::ValidationError(format!(
                "report amounts must be positive, got {}",
                report.user_amount
            )));
        }
        let full = self.fetch_bundle(order_id).await?;
        self.ensure_assigned_agent(&full.bundle, agent_id, role)?;
        self.ensure_reportable(&full.bundle, ReportMode::PerItem)?;
        if full.find_item(item_id).is_none() {
            return Err(OrderFlowError::ItemNotFound(item_id));
        }
        let old_status = full.bundle.status;
        let full = self.db.file_item_report(order_id, item_id, report).await?;
        let remaining = full.items_awaiting_report().count();
        if remaining == 0 {
            info!("📦️ All items of bundle {order_id} are priced; payment is now due");
        } else {
            debug!("📦️ Item {item_id} of bundle {order_id} priced; {remaining} item(s) to go");
        }
        self.publish_if_changed(&full.bundle, old_status).await;
        Ok(full)
    }

    /// The user removes an item they no longer want, once the quotes are in but before paying.
    /// The item's research card was spent at creation and is burned, not refunded; an audit
    /// ledger entry records the removal.
    pub async fn remove_item(
        &self,
        actor_id: i64,
        role: Role,
        order_id: &OrderId,
        item_id: i64,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        let full = self.fetch_bundle(order_id).await?;
        if role != Role::Admin && full.bundle.user_id != actor_id {
            return Err(OrderFlowError::Forbidden("only the bundle's creator may remove items".to_string()));
        }
        if full.bundle.status != OrderStatusType::AwaitingUserPayment || full.bundle.user_payment_verified {
            return Err(OrderFlowError::InvalidTransition(
                "items can only be removed while the bundle awaits an unverified payment".to_string(),
            ));
        }
        if full.item_count() < MIN_BUNDLE_ITEMS {
            return Err(OrderFlowError::InvalidTransition(
                "the last item of a bundle cannot be removed; cancel the bundle instead".to_string(),
            ));
        }
        if full.find_item(item_id).is_none() {
            return Err(OrderFlowError::ItemNotFound(item_id));
        }
        let old_status = full.bundle.status;
        let full = self.db.remove_bundle_item(order_id, item_id).await?;
        info!("📦️ User {actor_id} removed item {item_id} from bundle {order_id}. The card is burned, not refunded");
        self.publish_if_changed(&full.bundle, old_status).await;
        Ok(full)
    }

    /// The user flags that they have paid for the bundle. Verification stays with the admin.
    pub async fn confirm_payment(&self, user_id: i64, order_id: &OrderId) -> Result<BundleOrder, OrderFlowError> {
        let full = self.fetch_bundle(order_id).await?;
        if full.bundle.user_id != user_id {
            return Err(OrderFlowError::Forbidden("only the bundle's creator may confirm payment".to_string()));
        }
        if full.bundle.status != OrderStatusType::AwaitingUserPayment {
            return Err(OrderFlowError::InvalidTransition(format!(
                "cannot confirm payment for a bundle in {}",
                full.bundle.status
            )));
        }
        let bundle = self.db.confirm_bundle_user_payment(order_id).await?;
        info!("📦️ User {user_id} reports payment made for bundle {order_id}");
        Ok(bundle)
    }

    /// Moves the bundle forward along the lifecycle, mirroring the single-order table at the
    /// parent level. Completion propagates to every item.
    pub async fn advance_bundle(
        &self,
        role: Role,
        order_id: &OrderId,
        new_status: OrderStatusType,
    ) -> Result<BundleOrder, OrderFlowError> {
        let full = self.fetch_bundle(order_id).await?;
        if !can_advance(role, full.bundle.status, new_status) {
            return Err(OrderFlowError::InvalidTransition(format!(
                "{role} may not move bundle {order_id} from {} to {new_status}",
                full.bundle.status
            )));
        }
        if new_status == OrderStatusType::AwaitingUserPayment && !full.all_items_reported() {
            return Err(OrderFlowError::InvalidTransition(
                "every item needs a report before payment can be requested".to_string(),
            ));
        }
        let old_status = full.bundle.status;
        let bundle = if new_status == OrderStatusType::Completed {
            self.db.complete_bundle(order_id).await?
        } else {
            self.db.force_bundle_status(order_id, old_status, new_status).await?
        };
        info!("📦️ Bundle {order_id} moved {old_status} -> {new_status}");
        self.publish_if_changed(&bundle, old_status).await;
        Ok(bundle)
    }

    /// Settlement for a completed bundle: the agent's commission is 5% of the converted bundle
    /// price (the aggregate quote, or the sum of the item quotes), and the creator's research
    /// cards are refunded, one per item still in the bundle. At most once per bundle.
    pub async fn settle_bundle(&self, role: Role, order_id: &OrderId) -> Result<BundleOrder, OrderFlowError> {
        if role != Role::Admin {
            return Err(OrderFlowError::Forbidden("only admins may settle orders".to_string()));
        }
        let full = self.fetch_bundle(order_id).await?;
        if full.bundle.status != OrderStatusType::Completed {
            return Err(OrderFlowError::InvalidTransition(format!(
                "only completed bundles can be settled; bundle {order_id} is {}",
                full.bundle.status
            )));
        }
        if full.bundle.agent_payment_paid {
            return Err(OrderFlowError::InvalidTransition(format!("bundle {order_id} has already been settled")));
        }
        let agent_id = full
            .bundle
            .agent_id
            .ok_or_else(|| OrderFlowError::InvalidTransition("the bundle has no assigned agent".to_string()))?;
        let total = match full.bundle.report_mode {
            ReportMode::Single => {
                full.bundle
                    .bundle_report
                    .as_ref()
                    .map(|r| r.total_user_amount)
                    .ok_or_else(|| OrderFlowError::InvalidTransition("the bundle has no price report".to_string()))?
            },
            ReportMode::PerItem => {
                if !full.all_items_reported() {
                    return Err(OrderFlowError::InvalidTransition(
                        "every item needs a report before settlement".to_string(),
                    ));
                }
                full.items.iter().filter_map(|i| i.report.as_ref().map(|r| r.user_amount)).sum()
            },
        };
        let settings = self.db.fetch_settings().await.map_err(OrderFlowError::from)?;
        let commission = settings.commission_points(total);
        let creator = self
            .db
            .fetch_user(full.bundle.user_id)
            .await
            .map_err(OrderFlowError::from)?
            .ok_or(OrderFlowError::UserNotFound(full.bundle.user_id))?;
        let refund = if creator.role.is_staff() { 0 } else { full.item_count() as i64 };
        let bundle = self.db.settle_bundle(order_id, commission, refund).await?;
        info!("📦️ Bundle {order_id} settled. Agent {agent_id} earned {commission}, {refund} card(s) refunded");
        let event = SettlementEvent {
            scope: OrderScope::Bundle,
            order_id: bundle.order_id.clone(),
            user_id: bundle.user_id,
            agent_id,
            commission,
            refunded_cards: refund,
        };
        for producer in &self.producers.settlement_producer {
            producer.publish_event(event.clone()).await;
        }
        Ok(bundle)
    }

    /// Cancels the bundle under the shared role rules, propagating `Cancelled` to every item. No
    /// cards are refunded.
    pub async fn cancel_bundle(
        &self,
        actor_id: i64,
        role: Role,
        order_id: &OrderId,
        reason: Option<&str>,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        let full = self.fetch_bundle(order_id).await?;
        let report_filed = full.bundle.bundle_report.is_some() || full.items.iter().any(|i| i.report.is_some());
        let ctx = CancelContext {
            status: full.bundle.status,
            user_payment_verified: full.bundle.user_payment_verified,
            report_filed,
            is_owner: full.bundle.user_id == actor_id,
            is_assigned_agent: full.bundle.agent_id == Some(actor_id),
        };
        check_cancellation(role, ctx, reason)?;
        let old_status = full.bundle.status;
        let full = self.db.cancel_bundle(order_id, reason).await?;
        info!("📦️ {role} {actor_id} cancelled bundle {order_id}");
        self.publish_if_changed(&full.bundle, old_status).await;
        Ok(full)
    }

    /// Records the shipment tracking code. Assigned agent or admin only.
    pub async fn set_track_code(
        &self,
        actor_id: i64,
        role: Role,
        order_id: &OrderId,
        track_code: &str,
    ) -> Result<BundleOrder, OrderFlowError> {
        if track_code.trim().is_empty() {
            return Err(OrderFlowError::ValidationError("the tracking code cannot be empty".to_string()));
        }
        let full = self.fetch_bundle(order_id).await?;
        self.ensure_assigned_agent(&full.bundle, actor_id, role)?;
        self.db.set_bundle_track_code(order_id, track_code.trim()).await
    }

    /// Hides the bundle from the caller's own listing.
    pub async fn archive_bundle(
        &self,
        actor_id: i64,
        role: Role,
        order_id: &OrderId,
        side: ArchiveSide,
    ) -> Result<BundleOrder, OrderFlowError> {
        let full = self.fetch_bundle(order_id).await?;
        let allowed = match side {
            ArchiveSide::User => role == Role::Admin || full.bundle.user_id == actor_id,
            ArchiveSide::Agent => role == Role::Admin || full.bundle.agent_id == Some(actor_id),
        };
        if !allowed {
            return Err(OrderFlowError::Forbidden("you may only archive your own listing".to_string()));
        }
        self.db.archive_bundle(order_id, side).await
    }

    async fn fetch_bundle(&self, order_id: &OrderId) -> Result<FullBundleOrder, OrderFlowError> {
        self.db
            .fetch_bundle_by_order_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    fn ensure_assigned_agent(&self, bundle: &BundleOrder, actor_id: i64, role: Role) -> Result<(), OrderFlowError> {
        let allowed = role == Role::Admin || (role == Role::Agent && bundle.agent_id == Some(actor_id));
        if allowed {
            Ok(())
        } else {
            Err(OrderFlowError::Forbidden("only the assigned agent may do this".to_string()))
        }
    }

    fn ensure_reportable(&self, bundle: &BundleOrder, required_mode: ReportMode) -> Result<(), OrderFlowError> {
        if bundle.report_mode != required_mode {
            return Err(OrderFlowError::InvalidTransition(format!(
                "bundle {} is in {} mode",
                bundle.order_id, bundle.report_mode
            )));
        }
        match bundle.status {
            OrderStatusType::UnderAgentReview => Ok(()),
            OrderStatusType::AwaitingUserPayment if !bundle.user_payment_verified => Ok(()),
            OrderStatusType::AwaitingUserPayment => Err(OrderFlowError::InvalidTransition(
                "the payment has been verified; reports can no longer change".to_string(),
            )),
            s => Err(OrderFlowError::InvalidTransition(format!("cannot file a report for a bundle in {s}"))),
        }
    }

    async fn publish_if_changed(&self, bundle: &BundleOrder, old_status: OrderStatusType) {
        if bundle.status == old_status {
            return;
        }
        let event = StatusChangedEvent {
            scope: OrderScope::Bundle,
            order_id: bundle.order_id.clone(),
            user_id: bundle.user_id,
            agent_id: bundle.agent_id,
            old_status,
            new_status: bundle.status,
        };
        for producer in &self.producers.status_changed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}
