//! Rust structs that represent database table mappings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub wechat_open_id: Option<String>,
    pub wechat_union_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; at least one of `email`, `phone` or `wechat_open_id` is set.
#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub wechat_open_id: Option<String>,
    pub wechat_union_id: Option<String>,
}
