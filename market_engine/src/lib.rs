//! Marketplace Coordination Engine
//!
//! The engine is the core logic of a three-party marketplace backend: end users post purchase
//! orders, agents claim them and quote prices, and administrators verify payments and settle
//! commissions. This library is transport-agnostic; the HTTP layer, identity and payment rails
//! all live upstream.
//!
//! The library is divided into three main sections:
//! 1. Backend contracts and storage ([`mod@traits`] and [`mod@sqlite`]). A backend is any type
//!    implementing the traits; SQLite is the bundled implementation. You should never need to
//!    access the database directly, but the row types it stores are public in [`mod@db_types`].
//! 2. The engine public API ([`mod@mke_api`]). Order and bundle lifecycle, the research-card
//!    ledger, order limits, notifications, settings and the agent performance rollup. All role
//!    and ownership gating happens here; the backend enforces state preconditions.
//! 3. Events ([`mod@events`]). Claims, status changes and settlements are published on a small
//!    actor-style channel so hosts can hook custom actions in; the bundled notification hooks
//!    use the same mechanism.
pub mod db_types;
pub mod events;
pub mod mke_api;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AgentStatsManagement,
    LedgerManagement,
    MarketplaceDatabase,
    NotificationManagement,
    OrderManagement,
    SettingsManagement,
    UserManagement,
};

pub use mke_api::{
    agent_stats_api::AgentStatsApi,
    bundle_flow_api::BundleFlowApi,
    ledger_api::LedgerApi,
    notification_api::NotificationApi,
    order_flow_api::OrderFlowApi,
    order_objects,
    orders_api::OrdersApi,
    settings_api::SettingsApi,
};
