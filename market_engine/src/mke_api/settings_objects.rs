use mkt_common::{FxAmount, Points};
use serde::{Deserialize, Serialize};

/// Commission released to the agent at settlement, as a percentage of the converted order value.
pub const COMMISSION_PERCENT: i64 = 5;

/// The admin-tunable platform configuration. Stored as a single row; [`Default`] supplies the
/// values used before an admin has ever saved settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSettings {
    /// Master switch for the per-user order quotas.
    pub order_limit_enabled: bool,
    /// Orders (single plus bundle) a user may create per local calendar day.
    pub max_orders_per_day: i64,
    /// Orders a user may have in a non-terminal status at once.
    pub max_active_orders: i64,
    /// Points per unit of foreign currency, used to convert report prices at settlement.
    pub exchange_rate: i64,
    /// The platform bank account users pay into. Display-only.
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub bank: Option<String>,
    /// Maximum outbound e-mails enqueued platform-wide per local calendar day.
    pub email_daily_cap: i64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            order_limit_enabled: true,
            max_orders_per_day: 10,
            max_active_orders: 10,
            exchange_rate: 1,
            account_number: None,
            account_name: None,
            bank: None,
            email_daily_cap: 20,
        }
    }
}

impl MarketSettings {
    /// The agent commission for an order priced at `user_amount` in foreign currency:
    /// `user_amount * exchange_rate * 5%`, truncated towards zero.
    pub fn commission_points(&self, user_amount: FxAmount) -> Points {
        Points::from(user_amount.value() * self.exchange_rate * COMMISSION_PERCENT / 100)
    }
}

/// A partial settings update. Unset fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSettingsUpdate {
    pub order_limit_enabled: Option<bool>,
    pub max_orders_per_day: Option<i64>,
    pub max_active_orders: Option<i64>,
    pub exchange_rate: Option<i64>,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub bank: Option<String>,
    pub email_daily_cap: Option<i64>,
}

impl MarketSettingsUpdate {
    pub fn with_order_limit_enabled(mut self, enabled: bool) -> Self {
        self.order_limit_enabled = Some(enabled);
        self
    }

    pub fn with_max_orders_per_day(mut self, n: i64) -> Self {
        self.max_orders_per_day = Some(n);
        self
    }

    pub fn with_max_active_orders(mut self, n: i64) -> Self {
        self.max_active_orders = Some(n);
        self
    }

    pub fn with_exchange_rate(mut self, rate: i64) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    pub fn with_bank_account<S1, S2, S3>(mut self, number: S1, name: S2, bank: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        self.account_number = Some(number.into());
        self.account_name = Some(name.into());
        self.bank = Some(bank.into());
        self
    }

    pub fn with_email_daily_cap(mut self, cap: i64) -> Self {
        self.email_daily_cap = Some(cap);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_limit_enabled.is_none() &&
            self.max_orders_per_day.is_none() &&
            self.max_active_orders.is_none() &&
            self.exchange_rate.is_none() &&
            self.account_number.is_none() &&
            self.account_name.is_none() &&
            self.bank.is_none() &&
            self.email_daily_cap.is_none()
    }

    /// Folds this update into `current`, returning the merged settings.
    pub fn apply_to(&self, current: &MarketSettings) -> MarketSettings {
        MarketSettings {
            order_limit_enabled: self.order_limit_enabled.unwrap_or(current.order_limit_enabled),
            max_orders_per_day: self.max_orders_per_day.unwrap_or(current.max_orders_per_day),
            max_active_orders: self.max_active_orders.unwrap_or(current.max_active_orders),
            exchange_rate: self.exchange_rate.unwrap_or(current.exchange_rate),
            account_number: self.account_number.clone().or_else(|| current.account_number.clone()),
            account_name: self.account_name.clone().or_else(|| current.account_name.clone()),
            bank: self.bank.clone().or_else(|| current.bank.clone()),
            email_daily_cap: self.email_daily_cap.unwrap_or(current.email_daily_cap),
        }
    }
}
