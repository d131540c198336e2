//! Database repository for user records.

use crate::database::models::{CreateUser, User};
use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;

const USER_COLUMNS: &str =
    "id, email, phone, password_hash, wechat_open_id, wechat_union_id, created_at";

/// Repository for user database operations.
pub struct UserRepository<'a> {
    /// Shared SQLite connection pool
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a new user in the database.
    ///
    /// Fails with a unique violation when the email, phone or WeChat
    /// identity is taken.
    pub async fn create_user(&self, user: CreateUser) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (email, phone, password_hash, wechat_open_id, wechat_union_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user.email)
            .bind(user.phone)
            .bind(user.password_hash)
            .bind(user.wechat_open_id)
            .bind(user.wechat_union_id)
            .bind(Utc::now())
            .fetch_one(self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(phone)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_wechat_open_id(&self, open_id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE wechat_open_id = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(open_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }
}

/// True when `err` is a UNIQUE constraint failure raised by the database.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => db.is_unique_violation(),
        _ => false,
    }
}
