//! The order-limit policy: per-user daily and concurrent quotas, consulted before any order or
//! bundle order is created. The counts span both order types; a user's quota is shared, not
//! per-type.

use std::fmt::Display;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};

use crate::{db_types::Role, mke_api::settings_objects::MarketSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitRefusal {
    DailyLimitReached { limit: i64 },
    ActiveLimitReached { limit: i64 },
}

impl Display for LimitRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitRefusal::DailyLimitReached { limit } => write!(f, "daily limit reached ({limit} orders per day)"),
            LimitRefusal::ActiveLimitReached { limit } => write!(f, "active limit reached ({limit} open orders)"),
        }
    }
}

/// Pure admission decision. `created_today` and `active` are the caller-supplied counts of the
/// user's orders plus bundle orders created since local midnight, and in a non-terminal status,
/// respectively.
pub fn evaluate(settings: &MarketSettings, role: Role, created_today: i64, active: i64) -> Result<(), LimitRefusal> {
    // Quotas bind end users only.
    if role.is_staff() || !settings.order_limit_enabled {
        return Ok(());
    }
    if created_today >= settings.max_orders_per_day {
        return Err(LimitRefusal::DailyLimitReached { limit: settings.max_orders_per_day });
    }
    if active >= settings.max_active_orders {
        return Err(LimitRefusal::ActiveLimitReached { limit: settings.max_active_orders });
    }
    Ok(())
}

/// The start of the current calendar day in the server's local timezone, as a UTC instant. The
/// daily quota window resets here, not at UTC midnight.
pub fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    let naive = local.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&naive).earliest() {
        Some(midnight) => midnight.with_timezone(&Utc),
        // A DST gap swallowed local midnight. Fall back to the UTC day boundary.
        None => Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN)),
    }
}
