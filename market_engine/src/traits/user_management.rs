use thiserror::Error;

use crate::db_types::{NewUserProfile, UserProfile};

/// Profile storage. Identity and authentication live upstream; the engine stores the profile
/// data the ledger, the snapshots and the rollup need.
#[allow(async_fn_in_trait)]
pub trait UserManagement: Clone {
    /// Inserts a profile. Phone numbers are unique; a duplicate fails with
    /// [`UserApiError::PhoneAlreadyExists`].
    async fn create_user(&self, user: NewUserProfile) -> Result<UserProfile, UserApiError>;

    async fn fetch_user(&self, user_id: i64) -> Result<Option<UserProfile>, UserApiError>;

    async fn fetch_user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, UserApiError>;

    /// All agent profiles. Used for the claim-withdrawal fan-out.
    async fn fetch_agents(&self) -> Result<Vec<UserProfile>, UserApiError>;

    async fn set_email_opt_out(&self, user_id: i64, opt_out: bool) -> Result<(), UserApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum UserApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("A user with phone number {0} already exists")]
    PhoneAlreadyExists(String),
    #[error("The requested user {0} does not exist")]
    UserNotFound(i64),
}

impl From<sqlx::Error> for UserApiError {
    fn from(e: sqlx::Error) -> Self {
        UserApiError::DatabaseError(e.to_string())
    }
}
