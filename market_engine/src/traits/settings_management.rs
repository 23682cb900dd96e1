use thiserror::Error;

use crate::mke_api::settings_objects::{MarketSettings, MarketSettingsUpdate};

/// The single admin-configuration row: order limits, the settlement exchange rate, the platform
/// bank account surfaced to users, and the daily e-mail cap.
#[allow(async_fn_in_trait)]
pub trait SettingsManagement: Clone {
    /// Fetches the settings, falling back to [`MarketSettings::default`] when the row has never
    /// been written.
    async fn fetch_settings(&self) -> Result<MarketSettings, SettingsError>;

    /// Applies the non-empty fields of `update` and returns the new settings.
    async fn update_settings(&self, update: MarketSettingsUpdate) -> Result<MarketSettings, SettingsError>;
}

#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
    #[error("Only administrators may change platform settings")]
    Forbidden,
}

impl From<sqlx::Error> for SettingsError {
    fn from(e: sqlx::Error) -> Self {
        SettingsError::DatabaseError(e.to_string())
    }
}
