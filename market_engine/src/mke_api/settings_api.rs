use log::*;

use crate::{
    db_types::Role,
    mke_api::settings_objects::{MarketSettings, MarketSettingsUpdate},
    traits::{SettingsError, SettingsManagement},
};

/// Read/write access to the platform configuration row. Reading is open; writing is admin-only.
#[derive(Clone)]
pub struct SettingsApi<B> {
    db: B,
}

impl<B> SettingsApi<B>
where B: SettingsManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch(&self) -> Result<MarketSettings, SettingsError> {
        self.db.fetch_settings().await
    }

    pub async fn update(&self, role: Role, update: MarketSettingsUpdate) -> Result<MarketSettings, SettingsError> {
        if role != Role::Admin {
            return Err(SettingsError::Forbidden);
        }
        if let Some(n) = update.max_orders_per_day {
            if n < 1 {
                return Err(SettingsError::InvalidValue(format!("max_orders_per_day must be at least 1, got {n}")));
            }
        }
        if let Some(n) = update.max_active_orders {
            if n < 1 {
                return Err(SettingsError::InvalidValue(format!("max_active_orders must be at least 1, got {n}")));
            }
        }
        if let Some(rate) = update.exchange_rate {
            if rate < 1 {
                return Err(SettingsError::InvalidValue(format!("exchange_rate must be positive, got {rate}")));
            }
        }
        if let Some(cap) = update.email_daily_cap {
            if cap < 0 {
                return Err(SettingsError::InvalidValue(format!("email_daily_cap cannot be negative, got {cap}")));
            }
        }
        let settings = self.db.update_settings(update).await?;
        info!("⚙️ Platform settings updated: {settings:?}");
        Ok(settings)
    }
}
