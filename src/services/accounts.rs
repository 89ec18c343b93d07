//! User accounts: registration, login, profile management, and the
//! token-based password reset flow. Reset tokens are stored hashed; only the
//! plain token emailed to the user can redeem them.

use chrono::{Duration, Utc};
use rand::Rng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, AuthService};
use crate::db::DbPool;
use crate::entities::{user, User, UserModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const RESET_TOKEN_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

/// Public account shape; never carries the password hash or reset fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub address: String,
    pub phone: String,
    pub is_admin: bool,
}

impl From<UserModel> for ProfileView {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
            address: user.address,
            phone: user.phone,
            is_admin: user.is_admin,
        }
    }
}

/// Registration/login outcome: the profile plus a bearer token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedAccount {
    pub user: ProfileView,
    pub token: String,
}

#[derive(Clone)]
pub struct AccountService {
    db: Arc<DbPool>,
    auth: Arc<AuthService>,
    event_sender: EventSender,
}

impl AccountService {
    pub fn new(db: Arc<DbPool>, auth: Arc<AuthService>, event_sender: EventSender) -> Self {
        Self {
            db,
            auth,
            event_sender,
        }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(
        &self,
        input: RegisterInput,
    ) -> Result<AuthenticatedAccount, ServiceError> {
        input.validate()?;

        if self.find_by_email(&input.email).await?.is_some() {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = auth::hash_password(&input.password)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            email: Set(input.email.to_lowercase()),
            password_hash: Set(password_hash),
            image: Set(None),
            address: Set(String::new()),
            phone: Set(String::new()),
            is_admin: Set(false),
            reset_password_token: Set(None),
            reset_password_expires: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(created.id))
            .await;

        let token = self
            .auth
            .issue_token(&created)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        Ok(AuthenticatedAccount {
            user: created.into(),
            token,
        })
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput) -> Result<AuthenticatedAccount, ServiceError> {
        input.validate()?;

        let user = self
            .find_by_email(&input.email)
            .await?
            .filter(|u| auth::verify_password(&input.password, &u.password_hash))
            .ok_or_else(|| ServiceError::Unauthorized("Invalid email or password".to_string()))?;

        let token = self
            .auth
            .issue_token(&user)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        Ok(AuthenticatedAccount {
            user: user.into(),
            token,
        })
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, user_id: Uuid) -> Result<ProfileView, ServiceError> {
        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;
        Ok(user.into())
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<ProfileView, ServiceError> {
        let existing = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        if let Some(email) = &input.email {
            let email = email.to_lowercase();
            if email != existing.email && self.find_by_email(&email).await?.is_some() {
                return Err(ServiceError::Conflict(
                    "Email is already in use".to_string(),
                ));
            }
        }

        let mut model: user::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(email) = input.email {
            model.email = Set(email.to_lowercase());
        }
        if let Some(image) = input.image {
            model.image = Set(Some(image));
        }
        if let Some(address) = input.address {
            model.address = Set(address);
        }
        if let Some(phone) = input.phone {
            model.phone = Set(phone);
        }
        if let Some(password) = input.password {
            if password.len() < 6 {
                return Err(ServiceError::ValidationError(
                    "password must be at least 6 characters".to_string(),
                ));
            }
            let hash = auth::hash_password(&password)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?;
            model.password_hash = Set(hash);
        }
        model.updated_at = Set(Utc::now());

        Ok(model.update(&*self.db).await?.into())
    }

    /// Start a password reset: generate a token, store its hash with a short
    /// expiry, and return the plain token for delivery to the user.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<String, ServiceError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        let token_bytes: [u8; 20] = rand::thread_rng().gen();
        let token = hex::encode(token_bytes);

        let mut model: user::ActiveModel = user.into();
        model.reset_password_token = Set(Some(hash_reset_token(&token)));
        model.reset_password_expires =
            Set(Some(Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES)));
        model.updated_at = Set(Utc::now());
        model.update(&*self.db).await?;

        Ok(token)
    }

    /// Redeem a reset token. The stored hash must match and must not have
    /// expired; success consumes the token.
    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        if new_password.len() < 6 {
            return Err(ServiceError::ValidationError(
                "password must be at least 6 characters".to_string(),
            ));
        }

        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        let valid = matches!(
            (&user.reset_password_token, &user.reset_password_expires),
            (Some(stored), Some(expires))
                if *stored == hash_reset_token(token) && *expires > Utc::now()
        );
        if !valid {
            return Err(ServiceError::InvalidOperation(
                "Password reset token is invalid or has expired".to_string(),
            ));
        }

        let hash = auth::hash_password(new_password)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let mut model: user::ActiveModel = user.into();
        model.password_hash = Set(hash);
        model.reset_password_token = Set(None);
        model.reset_password_expires = Set(None);
        model.updated_at = Set(Utc::now());
        model.update(&*self.db).await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, ServiceError> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email.to_lowercase()))
            .one(&*self.db)
            .await?)
    }
}

fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_token_hash_is_stable_and_distinct() {
        let a = hash_reset_token("abc");
        assert_eq!(a, hash_reset_token("abc"));
        assert_ne!(a, hash_reset_token("abd"));
        assert_eq!(a.len(), 64);
    }
}
