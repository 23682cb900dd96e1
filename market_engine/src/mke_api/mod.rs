//! The public API of the market engine.
//!
//! Hosts (an HTTP server, a bot, a CLI) talk to these API structs rather than to the storage
//! traits directly. Each API struct is generic over the backend trait it needs, carries the
//! role/ownership gating for its operations, and publishes events for the transitions it makes.
//! The pure decision logic (the transition table, the order-limit policy, the success-rate blend)
//! lives in plain functions here so it can be tested without a database.

pub mod agent_stats_api;
pub mod bundle_flow_api;
pub mod bundle_objects;
pub mod ledger_api;
pub mod notification_api;
pub mod order_flow_api;
pub mod order_limits;
pub mod order_objects;
pub mod orders_api;
pub mod settings_api;
pub mod settings_objects;
pub mod transitions;
