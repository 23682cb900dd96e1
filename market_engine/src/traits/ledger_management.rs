use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{CardTransaction, CardTransactionType, OrderId};

/// A peer-to-peer or administrative card gift, resolved by the recipient's phone number.
///
/// `enforce_balance` is decided by the API layer from the sender's role: end users and agents
/// must cover the amount, admins are an unlimited source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransfer {
    pub from_user_id: i64,
    pub recipient_phone: String,
    pub amount: i64,
    pub tx_type: CardTransactionType,
    pub enforce_balance: bool,
}

/// The research-card ledger contract.
///
/// Every operation that moves a balance commits the balance update and its ledger row in one
/// database transaction. The ledger is append-only; entries are never modified or deleted.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement: Clone {
    /// The user's current research-card balance.
    async fn balance_for_user(&self, user_id: i64) -> Result<i64, LedgerError>;

    /// Grants the initial card allocation to a newly registered end user. Idempotent: if an
    /// `initial_grant` entry already exists for the user, nothing happens and `None` is returned.
    async fn grant_initial_cards(&self, user_id: i64, amount: i64) -> Result<Option<CardTransaction>, LedgerError>;

    /// Atomically decrements the balance by `amount` and logs an `order_deduction` entry.
    /// Fails with [`LedgerError::InsufficientCredit`] if the balance does not cover it.
    async fn deduct_cards(&self, user_id: i64, amount: i64, order_id: &OrderId)
        -> Result<CardTransaction, LedgerError>;

    /// Atomically increments the balance by `amount` and logs an `order_refund` entry. Only ever
    /// invoked from settlement; cancelled or abandoned orders never refund.
    async fn refund_cards(&self, user_id: i64, amount: i64, order_id: &OrderId)
        -> Result<CardTransaction, LedgerError>;

    /// Logs a `bundle_item_removal` audit entry with **no** balance change. The card was spent at
    /// bundle creation; removing an item pre-payment does not return it.
    async fn burn_for_removed_item(
        &self,
        user_id: i64,
        order_id: &OrderId,
        item_id: i64,
        item_name: &str,
    ) -> Result<CardTransaction, LedgerError>;

    /// Moves cards from the sender to the profile matching `recipient_phone`. The balance check,
    /// both balance updates and the ledger row are one transaction.
    async fn transfer_cards(&self, transfer: NewTransfer) -> Result<CardTransaction, LedgerError>;

    /// Adds `amount` cards to every end-user's balance (additive, not a reset), logging one
    /// `admin_gift` entry per user. Returns the number of users topped up.
    async fn bulk_grant(&self, admin_id: i64, amount: i64) -> Result<u64, LedgerError>;

    /// Every ledger entry where the user is source or destination, oldest first.
    async fn ledger_for_user(&self, user_id: i64) -> Result<Vec<CardTransaction>, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Insufficient research cards: need {needed}, balance is {balance}")]
    InsufficientCredit { needed: i64, balance: i64 },
    #[error("The sending user {0} does not exist")]
    SenderNotFound(i64),
    #[error("No user found for phone number {0}")]
    RecipientNotFound(String),
    #[error("You cannot transfer cards to yourself")]
    SelfTransferForbidden,
    #[error("The requested user {0} does not exist")]
    UserNotFound(i64),
    #[error("Card amounts must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("You are not allowed to perform this action: {0}")]
    Forbidden(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
