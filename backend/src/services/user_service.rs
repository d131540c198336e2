//! User business logic service.
//!
//! Password accounts are keyed by email, SMS accounts by phone and WeChat
//! accounts by open id. All of them end up in the same `users` table.

use crate::database::models::{CreateUser, User};
use crate::errors::{ServiceError, ServiceResult};
use crate::repositories::user_repository::{UserRepository, is_unique_violation};
use crate::services::oauth::OAuthIdentity;
use crate::services::sms::mask_recipient;
use bcrypt::{DEFAULT_COST, hash, verify};
use sqlx::SqlitePool;
use tracing::info;

pub struct UserService<'a> {
    /// Shared database connection pool
    pool: &'a SqlitePool,
}

impl<'a> UserService<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers a password account. Input format is checked by the caller.
    ///
    /// # Errors
    /// `AlreadyExists` when the email is taken.
    pub async fn signup(&self, email: &str, password: &str) -> ServiceResult<User> {
        let password_hash = Self::hash_password(password)?;
        let repo = UserRepository::new(self.pool);

        let user = repo
            .create_user(CreateUser {
                email: Some(email.to_string()),
                password_hash: Some(password_hash),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::already_exists("User", email)
                } else {
                    ServiceError::from(e)
                }
            })?;

        info!("User {} signed up", user.id);
        Ok(user)
    }

    /// Checks an email/password pair.
    ///
    /// Unknown email and wrong password are reported the same way.
    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<User> {
        let repo = UserRepository::new(self.pool);
        let user = repo
            .get_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let stored = user
            .password_hash
            .as_deref()
            .ok_or(ServiceError::InvalidCredentials)?;
        if !Self::verify_password(password, stored)? {
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Returns the user owning `phone`, creating one on first sight.
    pub async fn find_or_create_by_phone(&self, phone: &str) -> ServiceResult<User> {
        let repo = UserRepository::new(self.pool);
        if let Some(user) = repo.get_user_by_phone(phone).await? {
            return Ok(user);
        }

        info!("Creating user for phone {}", mask_recipient(phone));
        match repo
            .create_user(CreateUser {
                phone: Some(phone.to_string()),
                ..Default::default()
            })
            .await
        {
            Ok(user) => Ok(user),
            // A concurrent login created it first.
            Err(e) if is_unique_violation(&e) => repo
                .get_user_by_phone(phone)
                .await?
                .ok_or_else(|| ServiceError::not_found("User", mask_recipient(phone))),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the user linked to a WeChat identity, creating one on first sight.
    pub async fn find_or_create_by_oauth(&self, identity: &OAuthIdentity) -> ServiceResult<User> {
        let repo = UserRepository::new(self.pool);
        if let Some(user) = repo.get_user_by_wechat_open_id(&identity.open_id).await? {
            return Ok(user);
        }

        info!("Creating user for a new WeChat identity");
        match repo
            .create_user(CreateUser {
                wechat_open_id: Some(identity.open_id.clone()),
                wechat_union_id: identity.union_id.clone(),
                ..Default::default()
            })
            .await
        {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => repo
                .get_user_by_wechat_open_id(&identity.open_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("User", "wechat identity")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn profile(&self, id: i64) -> ServiceResult<User> {
        let repo = UserRepository::new(self.pool);
        repo.get_user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id.to_string()))
    }

    fn hash_password(password: &str) -> ServiceResult<String> {
        hash(password, DEFAULT_COST)
            .map_err(|e| ServiceError::internal_error(format!("Password hashing failed: {e}")))
    }

    fn verify_password(password: &str, hash: &str) -> ServiceResult<bool> {
        verify(password, hash)
            .map_err(|e| ServiceError::internal_error(format!("Password verification failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    #[tokio::test]
    async fn test_signup_then_login() {
        let pool = test_pool().await;
        let users = UserService::new(&pool);

        let created = users.signup("ada@example.com", "hello#world1").await.unwrap();
        assert_ne!(created.password_hash.as_deref(), Some("hello#world1"));

        let logged_in = users.login("ada@example.com", "hello#world1").await.unwrap();
        assert_eq!(logged_in.id, created.id);

        let err = users.login("ada@example.com", "wrong#pass1").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
        let err = users.login("bob@example.com", "hello#world1").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_duplicate_signup() {
        let pool = test_pool().await;
        let users = UserService::new(&pool);

        users.signup("ada@example.com", "hello#world1").await.unwrap();
        let err = users.signup("ada@example.com", "hello#world2").await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_find_or_create_by_phone_is_stable() {
        let pool = test_pool().await;
        let users = UserService::new(&pool);

        let first = users.find_or_create_by_phone("13800138000").await.unwrap();
        let second = users.find_or_create_by_phone("13800138000").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(users.profile(first.id).await.unwrap().phone.as_deref(), Some("13800138000"));

        // Phone accounts have no password.
        assert!(first.password_hash.is_none());
    }

    #[tokio::test]
    async fn test_find_or_create_by_oauth_is_stable() {
        let pool = test_pool().await;
        let users = UserService::new(&pool);
        let identity = OAuthIdentity {
            open_id: "o-42".to_string(),
            union_id: Some("u-42".to_string()),
        };

        let first = users.find_or_create_by_oauth(&identity).await.unwrap();
        let second = users.find_or_create_by_oauth(&identity).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.wechat_union_id.as_deref(), Some("u-42"));
        assert!(first.email.is_none() && first.phone.is_none());

        let other = users
            .find_or_create_by_oauth(&OAuthIdentity {
                open_id: "o-43".to_string(),
                union_id: None,
            })
            .await
            .unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_profile_of_unknown_user() {
        let pool = test_pool().await;
        let err = UserService::new(&pool).profile(99).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
