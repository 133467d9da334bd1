//! Shared fixtures for database tests.

#![allow(dead_code)]

use pulse_db::{Database, DbConfig, FundingRepository, NewUser, UserRepository};
use pulse_models::{CreateDepositRequest, User, UserRole};
use uuid::Uuid;

pub async fn connect() -> Database {
    dotenvy::dotenv().ok();
    let config = DbConfig::from_env().expect("DATABASE_URL must be set");
    Database::connect(&config).await.expect("Failed to connect")
}

/// Insert a fresh user with a random name.
pub async fn new_user(db: &Database) -> User {
    let id = Uuid::new_v4();
    let username = format!("t_{}", &id.simple().to_string()[..12]);
    UserRepository::new(db.clone())
        .ensure(&NewUser {
            id,
            username: &username,
            role: UserRole::User,
        })
        .await
        .expect("Failed to create user")
}

/// Credit `amount` coins through a completed deposit.
pub async fn fund(db: &Database, user_id: Uuid, amount: i64) {
    let funding = FundingRepository::new(db.clone());
    let intent = funding
        .create_deposit(
            user_id,
            &CreateDepositRequest {
                amount,
                provider: "test".into(),
            },
        )
        .await
        .expect("Failed to create deposit");
    funding
        .complete_deposit(intent.deposit.id)
        .await
        .expect("Failed to complete deposit");
}
