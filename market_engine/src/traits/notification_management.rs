use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{NewNotification, Notification, OutboxEmail, OutboxStatus};

/// The outbound-mail collaborator. Implementations wrap whatever SMTP provider the host uses;
/// the engine only ever talks to this trait, and only from the outbox dispatcher.
#[allow(async_fn_in_trait)]
pub trait Mailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError>;
}

#[derive(Debug, Clone, Error)]
#[error("Email delivery failed: {0}")]
pub struct MailerError(pub String);

/// Notification records and the e-mail outbox.
///
/// Notifications are immutable once created, apart from the `is_read` flip. Outbound e-mail is
/// never sent inline with a state transition: eligible mail is enqueued, and a separate dispatch
/// run drains the queue so failures are observable and retryable.
#[allow(async_fn_in_trait)]
pub trait NotificationManagement: Clone {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, NotificationError>;

    /// Flips `is_read`. The notification must belong to `user_id`.
    async fn mark_notification_read(&self, id: i64, user_id: i64) -> Result<Notification, NotificationError>;

    async fn notifications_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotificationError>;

    async fn enqueue_email(
        &self,
        user_id: i64,
        email: &str,
        subject: &str,
        body: &str,
    ) -> Result<OutboxEmail, NotificationError>;

    /// How many e-mails have been enqueued since `since`. Feeds the global daily send cap.
    async fn emails_enqueued_since(&self, since: DateTime<Utc>) -> Result<i64, NotificationError>;

    async fn fetch_pending_emails(&self, limit: i64) -> Result<Vec<OutboxEmail>, NotificationError>;

    /// Records a dispatch attempt's outcome, bumping the attempt counter.
    async fn mark_email_result(&self, id: i64, status: OutboxStatus) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The notification {0} does not exist for this user")]
    NotificationNotFound(i64),
    #[error("The requested user {0} does not exist")]
    UserNotFound(i64),
}

impl From<sqlx::Error> for NotificationError {
    fn from(e: sqlx::Error) -> Self {
        NotificationError::DatabaseError(e.to_string())
    }
}
