use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewUserProfile, Role, UserProfile},
    traits::UserApiError,
};

pub async fn insert_user(user: NewUserProfile, conn: &mut SqliteConnection) -> Result<UserProfile, UserApiError> {
    let result = sqlx::query_as::<_, UserProfile>(
        r#"
            INSERT INTO users (role, name, phone, cargo_name, email)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(user.role)
    .bind(&user.name)
    .bind(&user.phone)
    .bind(&user.cargo_name)
    .bind(&user.email)
    .fetch_one(conn)
    .await;
    match result {
        Ok(profile) => {
            debug!("👤️ New {} profile created with id {}", profile.role, profile.id);
            Ok(profile)
        },
        Err(sqlx::Error::Database(de)) if de.is_unique_violation() => Err(UserApiError::PhoneAlreadyExists(user.phone)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_user_by_id(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<UserProfile>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await
}

pub async fn fetch_user_by_phone(phone: &str, conn: &mut SqliteConnection) -> Result<Option<UserProfile>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE phone = $1").bind(phone).fetch_optional(conn).await
}

pub async fn fetch_users_with_role(role: Role, conn: &mut SqliteConnection) -> Result<Vec<UserProfile>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE role = $1 ORDER BY id").bind(role).fetch_all(conn).await
}

pub async fn set_email_opt_out(user_id: i64, opt_out: bool, conn: &mut SqliteConnection) -> Result<(), UserApiError> {
    let result = sqlx::query("UPDATE users SET email_opt_out = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(opt_out)
        .bind(user_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(UserApiError::UserNotFound(user_id));
    }
    Ok(())
}
