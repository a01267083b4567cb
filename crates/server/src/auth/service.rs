use crate::auth::password::PasswordHasher;
use crate::auth::token::{Claims, TokenPair, TokenSigner, TokenType};
use crate::entity::user::{self, Role};
use crate::error::{AuthError, StoreError};
use crate::events::{AuthEvent, EventPublisher};
use crate::store::UserStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info};
use utoipa::ToSchema;

const MIN_PASSWORD_CHARS: usize = 8;
const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=32;

#[derive(Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// `customer` (default) or `seller`
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Role,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub user: UserSummary,
}

impl AuthResponse {
    fn new(tokens: TokenPair, user: &user::Model) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            user: user.into(),
        }
    }
}

/// Registration, login and stateless token lifecycle.
///
/// Holds no per-request state. Every storage-touching operation runs under
/// the configured deadline; when it fires, the in-flight storage future is
/// dropped and no partial write survives.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    signer: TokenSigner,
    events: Arc<dyn EventPublisher>,
    deadline: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        signer: TokenSigner,
        events: Arc<dyn EventPublisher>,
        deadline: Duration,
    ) -> Self {
        Self {
            users,
            hasher,
            signer,
            events,
            deadline,
        }
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        tokio::time::timeout(self.deadline, fut).await?
    }

    #[tracing::instrument(skip(self, req), fields(username = %req.username))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        self.with_deadline(self.register_inner(req)).await
    }

    async fn register_inner(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&req.email);
        validate_email(&email)?;
        validate_username(&req.username)?;
        validate_password(&req.password)?;
        let role = match req.role.as_deref() {
            None | Some("") => Role::Customer,
            Some(requested) => Role::parse_self_assignable(requested).ok_or_else(|| {
                AuthError::Validation("role must be customer or seller".into())
            })?,
        };

        // Friendlier errors for the common case; the unique indexes are authoritative.
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }
        if self.users.get_by_username(&req.username).await?.is_some() {
            return Err(AuthError::DuplicateUsername);
        }

        let password_hash = self
            .hasher
            .hash(&req.password)
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let created = self
            .users
            .create(user::Model {
                id: uuid::Uuid::new_v4().to_string(),
                email: email.clone(),
                username: req.username,
                password_hash,
                first_name: non_empty(req.first_name),
                last_name: non_empty(req.last_name),
                role,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await;
        let user = match created {
            Ok(user) => user,
            // A racing duplicate may trip either index first; the email wins.
            Err(StoreError::UniqueViolation { field: "username" }) => {
                return Err(if self.users.get_by_email(&email).await?.is_some() {
                    AuthError::DuplicateEmail
                } else {
                    AuthError::DuplicateUsername
                });
            }
            Err(e) => return Err(e.into()),
        };

        let tokens = self.signer.issue(&user)?;
        self.events.publish(AuthEvent::user_registered(&user));
        info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(AuthResponse::new(tokens, &user))
    }

    #[tracing::instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        self.with_deadline(self.login_inner(email, password)).await
    }

    async fn login_inner(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.users.get_by_email(&email).await? else {
            self.hasher.verify_dummy(password).await;
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash).await {
            debug!(user_id = %user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        let tokens = self.signer.issue(&user)?;
        self.events.publish(AuthEvent::user_logged_in(&user));
        info!(user_id = %user.id, "User logged in");
        Ok(AuthResponse::new(tokens, &user))
    }

    /// Rotates both tokens. The presented refresh token stays valid until its
    /// own expiry; stateless refresh tokens are not revocable.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        self.with_deadline(self.refresh_inner(refresh_token)).await
    }

    async fn refresh_inner(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let claims = self
            .signer
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|e| {
                debug!(error = %e, "Refresh token rejected");
                AuthError::InvalidRefreshToken
            })?;

        let user = self
            .users
            .get_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        let tokens = self.signer.issue(&user)?;
        Ok(AuthResponse::new(tokens, &user))
    }

    /// Acknowledges a logout. Access tokens lapse at their own expiry.
    #[tracing::instrument(skip(self, access_token))]
    pub async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let claims = self.validate_token(access_token)?;
        info!(user_id = %claims.sub, "User logged out");
        Ok(())
    }

    /// Stateless access-token check for the request path. No storage round-trip.
    pub fn validate_token(&self, access_token: &str) -> Result<Claims, AuthError> {
        Ok(self.signer.verify(access_token, TokenType::Access)?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<user::Model, AuthError> {
        self.with_deadline(self.find_user(user_id)).await
    }

    async fn find_user(&self, user_id: &str) -> Result<user::Model, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Username changes follow the registration rules.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<user::Model, AuthError> {
        self.with_deadline(self.update_profile_inner(user_id, update))
            .await
    }

    async fn update_profile_inner(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<user::Model, AuthError> {
        let mut user = self.find_user(user_id).await?;

        if let Some(username) = update.username.filter(|u| *u != user.username) {
            validate_username(&username)?;
            if self.users.get_by_username(&username).await?.is_some() {
                return Err(AuthError::DuplicateUsername);
            }
            user.username = username;
        }
        if let Some(first_name) = update.first_name {
            user.first_name = non_empty(Some(first_name));
        }
        if let Some(last_name) = update.last_name {
            user.last_name = non_empty(Some(last_name));
        }
        user.updated_at = OffsetDateTime::now_utc();

        Ok(self.users.update(user).await?)
    }

    /// Subsequent logins and refreshes fail with `AccountDeactivated`.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_user(&self, user_id: &str) -> Result<user::Model, AuthError> {
        self.with_deadline(self.deactivate_inner(user_id)).await
    }

    async fn deactivate_inner(&self, user_id: &str) -> Result<user::Model, AuthError> {
        let mut user = self.find_user(user_id).await?;
        if !user.is_active {
            return Ok(user);
        }
        user.is_active = false;
        user.updated_at = OffsetDateTime::now_utc();
        let user = self.users.update(user).await?;
        info!(user_id = %user.id, "User deactivated");
        Ok(user)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AuthError::Validation("email address is invalid".into()))
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !USERNAME_CHARS.contains(&len) {
        return Err(AuthError::Validation(format!(
            "username must be {} to {} characters",
            USERNAME_CHARS.start(),
            USERNAME_CHARS.end()
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AuthError::Validation(
            "username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}
