//! Backend contracts for the marketplace engine.
//!
//! The engine core is storage-agnostic. A backend is any type that implements the traits in this
//! module; the [`crate::sqlite`] module provides the SQLite implementation.
//!
//! * [`MarketplaceDatabase`] is the mutation contract: order and bundle lifecycle transitions,
//!   each one atomic at the storage layer.
//! * [`OrderManagement`] is the query contract: fetching and searching orders, bundles and the
//!   counts the order-limit policy needs.
//! * [`LedgerManagement`] covers the research-card ledger. Every balance change commits together
//!   with exactly one ledger row, or not at all.
//! * [`UserManagement`] covers profile rows (the engine trusts identity; it only stores profiles).
//! * [`NotificationManagement`] covers notification records and the e-mail outbox.
//! * [`SettingsManagement`] covers the single admin-configuration row.
//! * [`AgentStatsManagement`] covers the agent performance rollup inputs and outputs.
mod agent_stats;
mod data_objects;
mod ledger_management;
mod marketplace_database;
mod notification_management;
mod order_management;
mod settings_management;
mod user_management;

pub use agent_stats::{AgentStatsError, AgentStatsManagement};
pub use data_objects::{AgentCounts, ArchiveSide, OutboxRunReport};
pub use ledger_management::{LedgerError, LedgerManagement, NewTransfer};
pub use marketplace_database::{MarketplaceDatabase, OrderFlowError};
pub use notification_management::{Mailer, MailerError, NotificationError, NotificationManagement};
pub use order_management::{OrderApiError, OrderManagement};
pub use settings_management::{SettingsError, SettingsManagement};
pub use user_management::{UserApiError, UserManagement};
