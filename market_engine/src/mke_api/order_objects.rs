use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, OrderStatusType};

/// A query object for searching orders and bundle orders.
///
/// An empty filter matches everything (archived rows excluded). Filters are combined with AND.
/// ```
/// use market_engine::mke_api::order_objects::OrderQueryFilter;
/// use market_engine::db_types::OrderStatusType;
/// let query = OrderQueryFilter::default()
///     .with_user_id(42)
///     .with_status(OrderStatusType::Published);
/// assert_eq!(query.to_string(), "user_id=42,status in [Published]");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub user_id: Option<i64>,
    pub agent_id: Option<i64>,
    /// Only rows with no agent assigned. This is the agents' "available orders" feed.
    pub unclaimed_only: bool,
    pub statuses: Vec<OrderStatusType>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Include rows the queried side has archived.
    pub include_archived: bool,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_agent_id(mut self, agent_id: i64) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn unclaimed(mut self) -> Self {
        self.unclaimed_only = true;
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_created_after(mut self, after: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self
    }

    pub fn with_created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    pub fn include_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.user_id.is_none() &&
            self.agent_id.is_none() &&
            !self.unclaimed_only &&
            self.statuses.is_empty() &&
            self.created_after.is_none() &&
            self.created_before.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "All orders");
        }
        let mut parts = Vec::new();
        if let Some(id) = &self.order_id {
            parts.push(format!("order_id={id}"));
        }
        if let Some(uid) = self.user_id {
            parts.push(format!("user_id={uid}"));
        }
        if let Some(aid) = self.agent_id {
            parts.push(format!("agent_id={aid}"));
        }
        if self.unclaimed_only {
            parts.push("unclaimed".to_string());
        }
        if !self.statuses.is_empty() {
            let statuses = self.statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");
            parts.push(format!("status in [{statuses}]"));
        }
        if let Some(after) = self.created_after {
            parts.push(format!("after={after}"));
        }
        if let Some(before) = self.created_before {
            parts.push(format!("before={before}"));
        }
        write!(f, "{}", parts.join(","))
    }
}
