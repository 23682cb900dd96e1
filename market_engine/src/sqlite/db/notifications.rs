use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewNotification, Notification, OutboxEmail, OutboxStatus},
    traits::NotificationError,
};

pub async fn insert_notification(
    notification: NewNotification,
    conn: &mut SqliteConnection,
) -> Result<Notification, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO notifications (user_id, notification_type, title, message, order_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(notification.user_id)
    .bind(notification.notification_type)
    .bind(notification.title)
    .bind(notification.message)
    .bind(notification.order_id.map(|o| o.as_str().to_string()))
    .fetch_one(conn)
    .await
}

pub async fn mark_read(id: i64, user_id: i64, conn: &mut SqliteConnection) -> Result<Notification, NotificationError> {
    let updated: Option<Notification> =
        sqlx::query_as("UPDATE notifications SET is_read = 1 WHERE id = $1 AND user_id = $2 RETURNING *")
            .bind(id)
            .bind(user_id)
            .fetch_optional(conn)
            .await?;
    updated.ok_or(NotificationError::NotificationNotFound(id))
}

pub async fn fetch_for_user(
    user_id: i64,
    unread_only: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    let unread_clause = if unread_only { "AND is_read = 0" } else { "" };
    let q = format!("SELECT * FROM notifications WHERE user_id = $1 {unread_clause} ORDER BY id DESC");
    sqlx::query_as(&q).bind(user_id).fetch_all(conn).await
}

pub async fn enqueue_email(
    user_id: i64,
    email: &str,
    subject: &str,
    body: &str,
    conn: &mut SqliteConnection,
) -> Result<OutboxEmail, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO email_outbox (user_id, email, subject, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(subject)
    .bind(body)
    .fetch_one(conn)
    .await
}

pub async fn count_enqueued_since(since: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM email_outbox WHERE datetime(created_at) >= datetime($1)")
        .bind(since)
        .fetch_one(conn)
        .await
}

pub async fn fetch_pending(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<OutboxEmail>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM email_outbox WHERE status = 'Pending' ORDER BY id LIMIT $1")
        .bind(limit)
        .fetch_all(conn)
        .await
}

pub async fn mark_result(id: i64, status: OutboxStatus, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE email_outbox SET status = $1, attempts = attempts + 1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(status)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}
