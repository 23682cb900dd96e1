//! Primitives for the research-card ledger.
//!
//! The balance lives on the `users` row; every change to it must be paired with exactly one
//! `card_transactions` entry. These functions are the two halves of that pairing; the trait
//! implementation composes them inside a single transaction.

use log::trace;
use mkt_common::Points;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CardTransaction, CardTransactionType, OrderId},
    traits::LedgerError,
};

pub struct LedgerEntry<'a> {
    pub from_user_id: Option<i64>,
    pub to_user_id: Option<i64>,
    pub amount: i64,
    pub tx_type: CardTransactionType,
    pub recipient_phone: Option<&'a str>,
    pub order_id: Option<&'a OrderId>,
    pub note: Option<String>,
}

pub async fn balance_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let balance: Option<i64> = sqlx::query_scalar("SELECT research_cards FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    balance.ok_or(LedgerError::UserNotFound(user_id))
}

/// Adds `delta` (which may be negative) to the user's card balance. With `enforce` set, the
/// update is conditional on the balance covering the debit, so a racing debit cannot push the
/// balance negative.
pub async fn adjust_balance(
    user_id: i64,
    delta: i64,
    enforce: bool,
    conn: &mut SqliteConnection,
) -> Result<i64, LedgerError> {
    let guard = if enforce { "AND research_cards + $1 >= 0" } else { "" };
    let q = format!(
        "UPDATE users SET research_cards = research_cards + $1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2 {guard} RETURNING research_cards"
    );
    let new_balance: Option<i64> = sqlx::query_scalar(&q).bind(delta).bind(user_id).fetch_optional(&mut *conn).await?;
    match new_balance {
        Some(balance) => {
            trace!("🪪️ Balance of user {user_id} adjusted by {delta} to {balance}");
            Ok(balance)
        },
        None => {
            let balance = balance_for_user(user_id, conn).await?;
            Err(LedgerError::InsufficientCredit { needed: -delta, balance })
        },
    }
}

pub async fn insert_entry(entry: LedgerEntry<'_>, conn: &mut SqliteConnection) -> Result<CardTransaction, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO card_transactions (from_user_id, to_user_id, amount, tx_type, recipient_phone, order_id, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(entry.from_user_id)
    .bind(entry.to_user_id)
    .bind(entry.amount)
    .bind(entry.tx_type)
    .bind(entry.recipient_phone)
    .bind(entry.order_id.map(|o| o.as_str().to_string()))
    .bind(entry.note)
    .fetch_one(conn)
    .await
}

pub async fn has_initial_grant(user_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM card_transactions WHERE to_user_id = $1 AND tx_type = $2)")
        .bind(user_id)
        .bind(CardTransactionType::InitialGrant)
        .fetch_one(conn)
        .await
}

pub async fn fetch_ledger_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CardTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM card_transactions WHERE from_user_id = $1 OR to_user_id = $1 ORDER BY id")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

/// Tops up every end-user balance by `amount`, one ledger entry per user. Returns the number of
/// users credited.
pub async fn bulk_grant(admin_id: i64, amount: i64, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let users: Vec<(i64, String)> = sqlx::query_as("SELECT id, phone FROM users WHERE role = 'User' ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    for (user_id, phone) in &users {
        adjust_balance(*user_id, amount, false, &mut *conn).await?;
        insert_entry(
            LedgerEntry {
                from_user_id: Some(admin_id),
                to_user_id: Some(*user_id),
                amount,
                tx_type: CardTransactionType::AdminGift,
                recipient_phone: Some(phone.as_str()),
                order_id: None,
                note: Some("bulk promotional grant".to_string()),
            },
            &mut *conn,
        )
        .await?;
    }
    Ok(users.len() as u64)
}

/// Credits settlement commission to the agent's point balance.
pub async fn add_agent_points(agent_id: i64, points: Points, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result =
        sqlx::query("UPDATE users SET agent_points = agent_points + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
            .bind(points)
            .bind(agent_id)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::UserNotFound(agent_id));
    }
    Ok(())
}
