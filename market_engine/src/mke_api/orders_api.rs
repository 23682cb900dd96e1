//! Read-side queries over orders and bundles.

use crate::{
    db_types::{AgentReport, BundleOrder, Order, OrderId, OrderStatusType, ReportEdit},
    mke_api::{bundle_objects::FullBundleOrder, order_objects::OrderQueryFilter},
    traits::{OrderApiError, OrderManagement},
};

#[derive(Clone)]
pub struct OrdersApi<B> {
    db: B,
}

impl<B> OrdersApi<B>
where B: OrderManagement + Clone
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderApiError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn fetch_bundle(&self, order_id: &OrderId) -> Result<Option<FullBundleOrder>, OrderApiError> {
        self.db.fetch_bundle_by_order_id(order_id).await
    }

    pub async fn report_for_order(&self, order_id: &OrderId) -> Result<Option<AgentReport>, OrderApiError> {
        self.db.fetch_report_for_order(order_id).await
    }

    pub async fn report_edits(&self, order_id: &OrderId) -> Result<Vec<ReportEdit>, OrderApiError> {
        self.db.fetch_report_edits(order_id).await
    }

    /// The orders a user sees in their own listing. Rows the user archived are hidden.
    pub async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderApiError> {
        self.db.search_orders(OrderQueryFilter::default().with_user_id(user_id)).await
    }

    pub async fn bundles_for_user(&self, user_id: i64) -> Result<Vec<BundleOrder>, OrderApiError> {
        self.db.search_bundles(OrderQueryFilter::default().with_user_id(user_id)).await
    }

    /// The orders an agent has claimed and not archived.
    pub async fn orders_for_agent(&self, agent_id: i64) -> Result<Vec<Order>, OrderApiError> {
        self.db.search_orders(OrderQueryFilter::default().with_agent_id(agent_id)).await
    }

    pub async fn bundles_for_agent(&self, agent_id: i64) -> Result<Vec<BundleOrder>, OrderApiError> {
        self.db.search_bundles(OrderQueryFilter::default().with_agent_id(agent_id)).await
    }

    /// The agents' shared feed: published orders no agent has claimed yet.
    pub async fn available_orders(&self) -> Result<Vec<Order>, OrderApiError> {
        let query = OrderQueryFilter::default().unclaimed().with_status(OrderStatusType::Published);
        self.db.search_orders(query).await
    }

    pub async fn available_bundles(&self) -> Result<Vec<BundleOrder>, OrderApiError> {
        let query = OrderQueryFilter::default().unclaimed().with_status(OrderStatusType::Published);
        self.db.search_bundles(query).await
    }

    pub async fn search(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderApiError> {
        self.db.search_orders(query).await
    }

    pub async fn search_bundles(&self, query: OrderQueryFilter) -> Result<Vec<BundleOrder>, OrderApiError> {
        self.db.search_bundles(query).await
    }
}
