use mkt_common::Points;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, OrderStatusType};

/// Whether an event concerns a single order or a bundle order. The two state machines are
/// independent entities sharing a status vocabulary, so subscribers usually only need the scope
/// for wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderScope {
    Single,
    Bundle,
}

/// An agent took ownership of an unassigned order. Subscribers withdraw the order from the other
/// agents' feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEvent {
    pub scope: OrderScope,
    pub order_id: OrderId,
    pub user_id: i64,
    pub agent_id: i64,
}

/// An order or bundle changed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub scope: OrderScope,
    pub order_id: OrderId,
    pub user_id: i64,
    pub agent_id: Option<i64>,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
}

/// The admin released agent earnings for a completed order and the buyer's spent cards were
/// refunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub scope: OrderScope,
    pub order_id: OrderId,
    pub user_id: i64,
    pub agent_id: i64,
    pub commission: Points,
    pub refunded_cards: i64,
}
