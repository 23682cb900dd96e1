#![allow(dead_code)]
pub mod prepare_env;

use market_engine::{
    db_types::{NewUserProfile, Role, UserProfile},
    traits::UserManagement,
    LedgerApi,
    SqliteDatabase,
};

/// A fresh, migrated database on a random path.
pub async fn new_test_db() -> SqliteDatabase {
    let url = prepare_env::random_db_path();
    prepare_env::prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating database")
}

/// Creates a profile and, for end users, hands out the starter research cards.
pub async fn seed_user(db: &SqliteDatabase, role: Role, name: &str, phone: &str) -> UserProfile {
    let user = db.create_user(NewUserProfile::new(role, name, phone)).await.expect("Error creating user");
    if role == Role::User {
        LedgerApi::new(db.clone()).grant_initial(&user).await.expect("Error granting starter cards");
    }
    db.fetch_user(user.id).await.expect("Error fetching user").expect("User vanished after creation")
}
