//! Role-aware entry points to the research-card ledger.

use log::*;

use crate::{
    db_types::{CardTransaction, CardTransactionType, Role, UserProfile},
    traits::{LedgerError, LedgerManagement, NewTransfer, UserManagement},
};

/// Cards handed to every newly registered end user.
pub const INITIAL_CARD_GRANT: i64 = 5;

/// The card economy's API. Storage guarantees atomicity of each balance move; this layer decides
/// who may move what: staff never spend cards, admins are an unlimited gift source, and only end
/// users receive the sign-up grant.
#[derive(Clone)]
pub struct LedgerApi<B> {
    db: B,
}

impl<B> LedgerApi<B>
where B: LedgerManagement + UserManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn balance(&self, user_id: i64) -> Result<i64, LedgerError> {
        self.db.balance_for_user(user_id).await
    }

    /// Whether the actor can cover `n` cards. Agents and admins consume no credits, so they
    /// always pass.
    pub async fn has_enough(&self, user_id: i64, role: Role, n: i64) -> Result<bool, LedgerError> {
        if role.is_staff() {
            return Ok(true);
        }
        let balance = self.db.balance_for_user(user_id).await?;
        Ok(balance >= n)
    }

    /// Hands the sign-up grant to a new end user. A no-op for staff profiles, and idempotent for
    /// users that already received it.
    pub async fn grant_initial(&self, user: &UserProfile) -> Result<Option<CardTransaction>, LedgerError> {
        if user.role.is_staff() {
            return Ok(None);
        }
        let tx = self.db.grant_initial_cards(user.id, INITIAL_CARD_GRANT).await?;
        if tx.is_some() {
            info!("🪪️ Granted {INITIAL_CARD_GRANT} starter research cards to user {}", user.id);
        }
        Ok(tx)
    }

    /// Peer-to-peer card gift, resolved by the recipient's phone number. The ledger entry type
    /// records who gave: `user_transfer`, `agent_gift` or `admin_gift`. Admins are an unlimited
    /// source; everyone else must cover the amount.
    pub async fn transfer(
        &self,
        from_user_id: i64,
        role: Role,
        recipient_phone: &str,
        amount: i64,
    ) -> Result<CardTransaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let tx_type = match role {
            Role::User => CardTransactionType::UserTransfer,
            Role::Agent => CardTransactionType::AgentGift,
            Role::Admin => CardTransactionType::AdminGift,
        };
        let transfer = NewTransfer {
            from_user_id,
            recipient_phone: recipient_phone.to_string(),
            amount,
            tx_type,
            enforce_balance: role != Role::Admin,
        };
        let tx = self.db.transfer_cards(transfer).await?;
        info!("🪪️ User {from_user_id} ({role}) sent {amount} cards to {recipient_phone}");
        Ok(tx)
    }

    /// Adds `amount` cards to every end-user balance. Promotional top-up, admin only.
    pub async fn bulk_grant(&self, admin_id: i64, role: Role, amount: i64) -> Result<u64, LedgerError> {
        if role != Role::Admin {
            return Err(LedgerError::Forbidden("only admins may run a bulk grant".to_string()));
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let n = self.db.bulk_grant(admin_id, amount).await?;
        info!("🪪️ Admin {admin_id} granted {amount} cards to each of {n} users");
        Ok(n)
    }

    /// The user's full ledger history, oldest first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<CardTransaction>, LedgerError> {
        self.db.ledger_for_user(user_id).await
    }
}
