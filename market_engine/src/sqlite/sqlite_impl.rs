//! `SqliteDatabase` is a concrete implementation of a marketplace engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module. Multi-step mutations (a status change plus its ledger rows plus any
//! counter updates) run inside a single transaction; the low-level functions in
//! [`crate::sqlite::db`] all take a connection argument, so they compose into transactions
//! unchanged.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use mkt_common::Points;
use sqlx::SqlitePool;

use super::db::{agent_stats, bundles, db_url, ledger, new_pool, notifications, orders, reports, settings, users};
use crate::{
    db_types::{
        AgentReport,
        AgentReview,
        BundleOrder,
        BundleReport,
        CardTransaction,
        CardTransactionType,
        ItemReport,
        NewAgentReport,
        NewBundleOrder,
        NewNotification,
        NewOrder,
        NewUserProfile,
        Notification,
        Order,
        OrderId,
        OrderStatusType,
        OutboxEmail,
        OutboxStatus,
        ReportEdit,
        ReportMode,
        Role,
        UserProfile,
    },
    mke_api::{
        bundle_objects::FullBundleOrder,
        order_objects::OrderQueryFilter,
        settings_objects::{MarketSettings, MarketSettingsUpdate},
    },
    sqlite::db::ledger::LedgerEntry,
    traits::{
        AgentCounts,
        AgentStatsError,
        AgentStatsManagement,
        ArchiveSide,
        LedgerError,
        LedgerManagement,
        MarketplaceDatabase,
        NewTransfer,
        NotificationError,
        NotificationManagement,
        OrderApiError,
        OrderFlowError,
        OrderManagement,
        SettingsError,
        SettingsManagement,
        UserApiError,
        UserManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database given by the `MKT_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        debug!("🗃️ Connected to database {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder, cards_to_deduct: i64) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        if cards_to_deduct > 0 {
            ledger::adjust_balance(order.user_id, -cards_to_deduct, true, &mut tx).await?;
            ledger::insert_entry(
                LedgerEntry {
                    from_user_id: Some(order.user_id),
                    to_user_id: None,
                    amount: cards_to_deduct,
                    tx_type: CardTransactionType::OrderDeduction,
                    recipient_phone: None,
                    order_id: Some(&order.order_id),
                    note: None,
                },
                &mut tx,
            )
            .await
            .map_err(LedgerError::from)?;
        }
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn claim_order(&self, order_id: &OrderId, agent_id: i64) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::claim_order(order_id, agent_id, &mut conn).await
    }

    async fn force_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_status(order_id, expected, new_status, &mut conn).await
    }

    async fn upsert_report(
        &self,
        order_id: &OrderId,
        agent_id: i64,
        report: NewAgentReport,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        reports::upsert_report(order_id, agent_id, report, &mut tx).await?;
        let order = if order.status == OrderStatusType::UnderAgentReview {
            orders::update_status(order_id, OrderStatusType::UnderAgentReview, OrderStatusType::AwaitingUserPayment, &mut tx)
                .await?
        } else {
            order
        };
        tx.commit().await?;
        Ok(order)
    }

    async fn confirm_user_payment(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::set_user_payment_flag(order_id, &mut conn).await
    }

    async fn complete_order(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::complete_order(order_id, &mut conn).await
    }

    async fn settle_order(
        &self,
        order_id: &OrderId,
        commission: Points,
        refund_cards: i64,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_agent_paid(order_id, &mut tx).await?;
        let agent_id = order
            .agent_id
            .ok_or_else(|| OrderFlowError::InvalidTransition("the order has no assigned agent".to_string()))?;
        ledger::add_agent_points(agent_id, commission, &mut tx).await?;
        if refund_cards > 0 {
            ledger::adjust_balance(order.user_id, refund_cards, false, &mut tx).await?;
            ledger::insert_entry(
                LedgerEntry {
                    from_user_id: None,
                    to_user_id: Some(order.user_id),
                    amount: refund_cards,
                    tx_type: CardTransactionType::OrderRefund,
                    recipient_phone: None,
                    order_id: Some(order_id),
                    note: None,
                },
                &mut tx,
            )
            .await
            .map_err(LedgerError::from)?;
        }
        agent_stats::recompute_rollup(agent_id, &mut tx).await.map_err(|e| OrderFlowError::DatabaseError(e.to_string()))?;
        tx.commit().await?;
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &OrderId, reason: Option<&str>) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::cancel_order(order_id, reason, &mut conn).await
    }

    async fn set_track_code(&self, order_id: &OrderId, track_code: &str) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::set_track_code(order_id, track_code, &mut conn).await
    }

    async fn archive_order(&self, order_id: &OrderId, side: ArchiveSide) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        orders::archive_order(order_id, side, &mut conn).await
    }

    async fn release_stale_claims(&self, window: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let released = orders::release_stale_claims(window, &mut conn).await?;
        Ok(released)
    }

    async fn insert_bundle(
        &self,
        bundle: NewBundleOrder,
        cards_to_deduct: i64,
        snapshot: &UserProfile,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        if cards_to_deduct > 0 {
            ledger::adjust_balance(bundle.user_id, -cards_to_deduct, true, &mut tx).await?;
            ledger::insert_entry(
                LedgerEntry {
                    from_user_id: Some(bundle.user_id),
                    to_user_id: None,
                    amount: cards_to_deduct,
                    tx_type: CardTransactionType::OrderDeduction,
                    recipient_phone: None,
                    order_id: Some(&bundle.order_id),
                    note: None,
                },
                &mut tx,
            )
            .await
            .map_err(LedgerError::from)?;
        }
        let full = bundles::insert_bundle(bundle, snapshot, &mut tx).await?;
        tx.commit().await?;
        Ok(full)
    }

    async fn claim_bundle(&self, order_id: &OrderId, agent_id: i64) -> Result<BundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let bundle = bundles::claim_bundle(order_id, agent_id, &mut tx).await?;
        tx.commit().await?;
        Ok(bundle)
    }

    async fn force_bundle_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<BundleOrder, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        bundles::update_bundle_status(order_id, expected, new_status, &mut conn).await
    }

    async fn set_report_mode(&self, order_id: &OrderId, mode: ReportMode) -> Result<FullBundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let full = bundles::set_report_mode(order_id, mode, &mut tx).await?;
        tx.commit().await?;
        Ok(full)
    }

    async fn file_bundle_report(
        &self,
        order_id: &OrderId,
        report: BundleReport,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let full = bundles::file_bundle_report(order_id, report, &mut tx).await?;
        tx.commit().await?;
        Ok(full)
    }

    async fn file_item_report(
        &self,
        order_id: &OrderId,
        item_id: i64,
        report: ItemReport,
    ) -> Result<FullBundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let full = bundles::file_item_report(order_id, item_id, report, &mut tx).await?;
        tx.commit().await?;
        Ok(full)
    }

    async fn remove_bundle_item(&self, order_id: &OrderId, item_id: i64) -> Result<FullBundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let (removed, full) = bundles::remove_item(order_id, item_id, &mut tx).await?;
        ledger::insert_entry(
            LedgerEntry {
                from_user_id: Some(full.bundle.user_id),
                to_user_id: None,
                amount: 1,
                tx_type: CardTransactionType::BundleItemRemoval,
                recipient_phone: None,
                order_id: Some(order_id),
                note: Some(format!("removed item {}: {}", removed.id, removed.product_name)),
            },
            &mut tx,
        )
        .await
        .map_err(LedgerError::from)?;
        tx.commit().await?;
        Ok(full)
    }

    async fn confirm_bundle_user_payment(&self, order_id: &OrderId) -> Result<BundleOrder, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        bundles::set_user_payment_flag(order_id, &mut conn).await
    }

    async fn complete_bundle(&self, order_id: &OrderId) -> Result<BundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let bundle = bundles::complete_bundle(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(bundle)
    }

    async fn settle_bundle(
        &self,
        order_id: &OrderId,
        commission: Points,
        refund_cards: i64,
    ) -> Result<BundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let bundle = bundles::mark_agent_paid(order_id, &mut tx).await?;
        let agent_id = bundle
            .agent_id
            .ok_or_else(|| OrderFlowError::InvalidTransition("the bundle has no assigned agent".to_string()))?;
        ledger::add_agent_points(agent_id, commission, &mut tx).await?;
        if refund_cards > 0 {
            ledger::adjust_balance(bundle.user_id, refund_cards, false, &mut tx).await?;
            ledger::insert_entry(
                LedgerEntry {
                    from_user_id: None,
                    to_user_id: Some(bundle.user_id),
                    amount: refund_cards,
                    tx_type: CardTransactionType::OrderRefund,
                    recipient_phone: None,
                    order_id: Some(order_id),
                    note: None,
                },
                &mut tx,
            )
            .await
            .map_err(LedgerError::from)?;
        }
        agent_stats::recompute_rollup(agent_id, &mut tx).await.map_err(|e| OrderFlowError::DatabaseError(e.to_string()))?;
        tx.commit().await?;
        Ok(bundle)
    }

    async fn cancel_bundle(&self, order_id: &OrderId, reason: Option<&str>) -> Result<FullBundleOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let full = bundles::cancel_bundle(order_id, reason, &mut tx).await?;
        tx.commit().await?;
        Ok(full)
    }

    async fn set_bundle_track_code(&self, order_id: &OrderId, track_code: &str) -> Result<BundleOrder, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        bundles::set_track_code(order_id, track_code, &mut conn).await
    }

    async fn archive_bundle(&self, order_id: &OrderId, side: ArchiveSide) -> Result<BundleOrder, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        bundles::archive_bundle(order_id, side, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), OrderFlowError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_bundle_by_order_id(&self, order_id: &OrderId) -> Result<Option<FullBundleOrder>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let full = bundles::fetch_full_bundle(order_id, &mut conn).await?;
        Ok(full)
    }

    async fn fetch_report_for_order(&self, order_id: &OrderId) -> Result<Option<AgentReport>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let report = reports::fetch_report_for_order(order_id, &mut conn).await?;
        Ok(report)
    }

    async fn fetch_report_edits(&self, order_id: &OrderId) -> Result<Vec<ReportEdit>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let edits = reports::fetch_edits(order_id, &mut conn).await?;
        Ok(edits)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn search_bundles(&self, query: OrderQueryFilter) -> Result<Vec<BundleOrder>, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let bundles = bundles::search_bundles(query, &mut conn).await?;
        Ok(bundles)
    }

    async fn count_created_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<i64, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let count = orders::count_created_since(user_id, since, &mut conn).await?;
        Ok(count)
    }

    async fn count_active_for_user(&self, user_id: i64) -> Result<i64, OrderApiError> {
        let mut conn = self.pool.acquire().await?;
        let count = orders::count_active_for_user(user_id, &mut conn).await?;
        Ok(count)
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn balance_for_user(&self, user_id: i64) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::balance_for_user(user_id, &mut conn).await
    }

    async fn grant_initial_cards(&self, user_id: i64, amount: i64) -> Result<Option<CardTransaction>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        if ledger::has_initial_grant(user_id, &mut tx).await? {
            return Ok(None);
        }
        ledger::adjust_balance(user_id, amount, false, &mut tx).await?;
        let entry = ledger::insert_entry(
            LedgerEntry {
                from_user_id: None,
                to_user_id: Some(user_id),
                amount,
                tx_type: CardTransactionType::InitialGrant,
                recipient_phone: None,
                order_id: None,
                note: None,
            },
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(Some(entry))
    }

    async fn deduct_cards(&self, user_id: i64, amount: i64, order_id: &OrderId) -> Result<CardTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        ledger::adjust_balance(user_id, -amount, true, &mut tx).await?;
        let entry = ledger::insert_entry(
            LedgerEntry {
                from_user_id: Some(user_id),
                to_user_id: None,
                amount,
                tx_type: CardTransactionType::OrderDeduction,
                recipient_phone: None,
                order_id: Some(order_id),
                note: None,
            },
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn refund_cards(&self, user_id: i64, amount: i64, order_id: &OrderId) -> Result<CardTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        ledger::adjust_balance(user_id, amount, false, &mut tx).await?;
        let entry = ledger::insert_entry(
            LedgerEntry {
                from_user_id: None,
                to_user_id: Some(user_id),
                amount,
                tx_type: CardTransactionType::OrderRefund,
                recipient_phone: None,
                order_id: Some(order_id),
                note: None,
            },
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn burn_for_removed_item(
        &self,
        user_id: i64,
        order_id: &OrderId,
        item_id: i64,
        item_name: &str,
    ) -> Result<CardTransaction, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entry = ledger::insert_entry(
            LedgerEntry {
                from_user_id: Some(user_id),
                to_user_id: None,
                amount: 1,
                tx_type: CardTransactionType::BundleItemRemoval,
                recipient_phone: None,
                order_id: Some(order_id),
                note: Some(format!("removed item {item_id}: {item_name}")),
            },
            &mut conn,
        )
        .await?;
        Ok(entry)
    }

    async fn transfer_cards(&self, transfer: NewTransfer) -> Result<CardTransaction, LedgerError> {
        if transfer.amount <= 0 {
            return Err(LedgerError::InvalidAmount(transfer.amount));
        }
        let mut tx = self.pool.begin().await?;
        let sender = users::fetch_user_by_id(transfer.from_user_id, &mut tx)
            .await?
            .ok_or(LedgerError::SenderNotFound(transfer.from_user_id))?;
        let recipient = users::fetch_user_by_phone(&transfer.recipient_phone, &mut tx)
            .await?
            .ok_or_else(|| LedgerError::RecipientNotFound(transfer.recipient_phone.clone()))?;
        if recipient.id == sender.id {
            return Err(LedgerError::SelfTransferForbidden);
        }
        ledger::adjust_balance(sender.id, -transfer.amount, transfer.enforce_balance, &mut tx).await?;
        ledger::adjust_balance(recipient.id, transfer.amount, false, &mut tx).await?;
        let entry = ledger::insert_entry(
            LedgerEntry {
                from_user_id: Some(sender.id),
                to_user_id: Some(recipient.id),
                amount: transfer.amount,
                tx_type: transfer.tx_type,
                recipient_phone: Some(&transfer.recipient_phone),
                order_id: None,
                note: None,
            },
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn bulk_grant(&self, admin_id: i64, amount: i64) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let n = ledger::bulk_grant(admin_id, amount, &mut tx).await?;
        tx.commit().await?;
        Ok(n)
    }

    async fn ledger_for_user(&self, user_id: i64) -> Result<Vec<CardTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::fetch_ledger_for_user(user_id, &mut conn).await?;
        Ok(entries)
    }
}

impl UserManagement for SqliteDatabase {
    async fn create_user(&self, user: NewUserProfile) -> Result<UserProfile, UserApiError> {
        let mut conn = self.pool.acquire().await?;
        users::insert_user(user, &mut conn).await
    }

    async fn fetch_user(&self, user_id: i64) -> Result<Option<UserProfile>, UserApiError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_id(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, UserApiError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user_by_phone(phone, &mut conn).await?;
        Ok(user)
    }

    async fn fetch_agents(&self) -> Result<Vec<UserProfile>, UserApiError> {
        let mut conn = self.pool.acquire().await?;
        let agents = users::fetch_users_with_role(Role::Agent, &mut conn).await?;
        Ok(agents)
    }

    async fn set_email_opt_out(&self, user_id: i64, opt_out: bool) -> Result<(), UserApiError> {
        let mut conn = self.pool.acquire().await?;
        users::set_email_opt_out(user_id, opt_out, &mut conn).await
    }
}

impl NotificationManagement for SqliteDatabase {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        let record = notifications::insert_notification(notification, &mut conn).await?;
        Ok(record)
    }

    async fn mark_notification_read(&self, id: i64, user_id: i64) -> Result<Notification, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        notifications::mark_read(id, user_id, &mut conn).await
    }

    async fn notifications_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        let records = notifications::fetch_for_user(user_id, unread_only, &mut conn).await?;
        Ok(records)
    }

    async fn enqueue_email(
        &self,
        user_id: i64,
        email: &str,
        subject: &str,
        body: &str,
    ) -> Result<OutboxEmail, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        let record = notifications::enqueue_email(user_id, email, subject, body, &mut conn).await?;
        Ok(record)
    }

    async fn emails_enqueued_since(&self, since: DateTime<Utc>) -> Result<i64, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        let count = notifications::count_enqueued_since(since, &mut conn).await?;
        Ok(count)
    }

    async fn fetch_pending_emails(&self, limit: i64) -> Result<Vec<OutboxEmail>, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        let pending = notifications::fetch_pending(limit, &mut conn).await?;
        Ok(pending)
    }

    async fn mark_email_result(&self, id: i64, status: OutboxStatus) -> Result<(), NotificationError> {
        let mut conn = self.pool.acquire().await?;
        notifications::mark_result(id, status, &mut conn).await?;
        Ok(())
    }
}

impl SettingsManagement for SqliteDatabase {
    async fn fetch_settings(&self) -> Result<MarketSettings, SettingsError> {
        let mut conn = self.pool.acquire().await?;
        let settings = settings::fetch_settings(&mut conn).await?;
        Ok(settings)
    }

    async fn update_settings(&self, update: MarketSettingsUpdate) -> Result<MarketSettings, SettingsError> {
        let mut conn = self.pool.acquire().await?;
        let settings = settings::update_settings(update, &mut conn).await?;
        Ok(settings)
    }
}

impl AgentStatsManagement for SqliteDatabase {
    async fn fetch_agent_counts(&self, agent_id: i64) -> Result<AgentCounts, AgentStatsError> {
        let mut conn = self.pool.acquire().await?;
        let counts = agent_stats::fetch_agent_counts(agent_id, &mut conn).await?;
        Ok(counts)
    }

    async fn avg_rating_for_agent(&self, agent_id: i64) -> Result<Option<f64>, AgentStatsError> {
        let mut conn = self.pool.acquire().await?;
        let avg = agent_stats::avg_rating(agent_id, &mut conn).await?;
        Ok(avg)
    }

    async fn update_agent_stats(
        &self,
        agent_id: i64,
        success_rate: i64,
        total_transactions: i64,
        avg_rating: f64,
    ) -> Result<(), AgentStatsError> {
        let mut conn = self.pool.acquire().await?;
        agent_stats::update_agent_stats(agent_id, success_rate, total_transactions, avg_rating, &mut conn).await
    }

    async fn insert_review(
        &self,
        agent_id: i64,
        reviewer_id: i64,
        rating: i64,
    ) -> Result<AgentReview, AgentStatsError> {
        let mut conn = self.pool.acquire().await?;
        agent_stats::insert_review(agent_id, reviewer_id, rating, &mut conn).await
    }

    async fn delete_review(&self, review_id: i64) -> Result<AgentReview, AgentStatsError> {
        let mut conn = self.pool.acquire().await?;
        agent_stats::delete_review(review_id, &mut conn).await
    }

    async fn set_agent_rank(&self, agent_id: i64, rank: Option<i64>) -> Result<(), AgentStatsError> {
        let mut conn = self.pool.acquire().await?;
        agent_stats::set_agent_rank(agent_id, rank, &mut conn).await
    }

    async fn top_agents(&self, limit: i64) -> Result<Vec<UserProfile>, AgentStatsError> {
        let mut conn = self.pool.acquire().await?;
        let agents = agent_stats::top_agents(limit, &mut conn).await?;
        Ok(agents)
    }
}
