use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{AgentReport, BundleOrder, Order, OrderId, ReportEdit},
    mke_api::{bundle_objects::FullBundleOrder, order_objects::OrderQueryFilter},
};

#[derive(Debug, Clone, Error)]
pub enum OrderApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for OrderApiError {
    fn from(e: sqlx::Error) -> Self {
        OrderApiError::DatabaseError(e.to_string())
    }
}

/// The query-side contract: read-only access to orders, bundles and the aggregate counts the
/// order-limit policy consumes. [`crate::traits::MarketplaceDatabase`] handles mutations.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderApiError>;

    /// Fetches the bundle aggregate (parent row plus all items).
    async fn fetch_bundle_by_order_id(&self, order_id: &OrderId) -> Result<Option<FullBundleOrder>, OrderApiError>;

    async fn fetch_report_for_order(&self, order_id: &OrderId) -> Result<Option<AgentReport>, OrderApiError>;

    /// The append-only price-edit trail for an order's report, oldest first.
    async fn fetch_report_edits(&self, order_id: &OrderId) -> Result<Vec<ReportEdit>, OrderApiError>;

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderApiError>;

    async fn search_bundles(&self, query: OrderQueryFilter) -> Result<Vec<BundleOrder>, OrderApiError>;

    /// Orders plus bundle orders this user created at or after `since`. The daily quota is shared
    /// across both order types, so the count spans both tables.
    async fn count_created_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<i64, OrderApiError>;

    /// Orders plus bundle orders this user created that are currently in a non-terminal status.
    async fn count_active_for_user(&self, user_id: i64) -> Result<i64, OrderApiError>;
}
