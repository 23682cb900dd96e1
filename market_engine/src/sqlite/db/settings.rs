use sqlx::{FromRow, SqliteConnection};

use crate::mke_api::settings_objects::{MarketSettings, MarketSettingsUpdate};

#[derive(FromRow)]
struct SettingsRow {
    order_limit_enabled: bool,
    max_orders_per_day: i64,
    max_active_orders: i64,
    exchange_rate: i64,
    account_number: Option<String>,
    account_name: Option<String>,
    bank: Option<String>,
    email_daily_cap: i64,
}

impl From<SettingsRow> for MarketSettings {
    fn from(row: SettingsRow) -> Self {
        MarketSettings {
            order_limit_enabled: row.order_limit_enabled,
            max_orders_per_day: row.max_orders_per_day,
            max_active_orders: row.max_active_orders,
            exchange_rate: row.exchange_rate,
            account_number: row.account_number,
            account_name: row.account_name,
            bank: row.bank,
            email_daily_cap: row.email_daily_cap,
        }
    }
}

/// Fetches the single configuration row, falling back to the defaults when no admin has ever
/// saved settings.
pub async fn fetch_settings(conn: &mut SqliteConnection) -> Result<MarketSettings, sqlx::Error> {
    let row: Option<SettingsRow> =
        sqlx::query_as("SELECT * FROM market_settings WHERE id = 1").fetch_optional(conn).await?;
    Ok(row.map(MarketSettings::from).unwrap_or_default())
}

/// Merges `update` over the current settings and writes the result back as the single row.
pub async fn update_settings(
    update: MarketSettingsUpdate,
    conn: &mut SqliteConnection,
) -> Result<MarketSettings, sqlx::Error> {
    let current = fetch_settings(&mut *conn).await?;
    let merged = update.apply_to(&current);
    sqlx::query(
        r#"
            INSERT INTO market_settings
                (id, order_limit_enabled, max_orders_per_day, max_active_orders, exchange_rate,
                 account_number, account_name, bank, email_daily_cap, updated_at)
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, CURRENT_TIMESTAMP)
            ON CONFLICT (id) DO UPDATE SET
                order_limit_enabled = excluded.order_limit_enabled,
                max_orders_per_day = excluded.max_orders_per_day,
                max_active_orders = excluded.max_active_orders,
                exchange_rate = excluded.exchange_rate,
                account_number = excluded.account_number,
                account_name = excluded.account_name,
                bank = excluded.bank,
                email_daily_cap = excluded.email_daily_cap,
                updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(merged.order_limit_enabled)
    .bind(merged.max_orders_per_day)
    .bind(merged.max_active_orders)
    .bind(merged.exchange_rate)
    .bind(&merged.account_number)
    .bind(&merged.account_name)
    .bind(&merged.bank)
    .bind(merged.email_daily_cap)
    .execute(conn)
    .await?;
    Ok(merged)
}
