use thiserror::Error;

/// Failures raised by the store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(#[from] sea_orm::DbErr),
    #[error("Unique constraint violated on {field}")]
    UniqueViolation { field: &'static str },
}

impl StoreError {
    /// Classify a database error, lifting unique-constraint violations on
    /// `users.email` / `users.username` into [`StoreError::UniqueViolation`].
    pub fn from_user_write(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) => {
                let field = if detail.contains("username") {
                    "username"
                } else {
                    "email"
                };
                StoreError::UniqueViolation { field }
            }
            _ => StoreError::Unavailable(err),
        }
    }
}

/// Stateless token verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    InvalidSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Token type does not match its use")]
    WrongType,
    #[error("Token is malformed")]
    Malformed,
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Errors surfaced by the auth orchestrator.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Email is already registered")]
    DuplicateEmail,
    #[error("Username is already taken")]
    DuplicateUsername,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is deactivated")]
    AccountDeactivated,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Storage(StoreError),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { field: "username" } => AuthError::DuplicateUsername,
            StoreError::UniqueViolation { .. } => AuthError::DuplicateEmail,
            other => AuthError::Storage(other),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AuthError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AuthError::DeadlineExceeded
    }
}

impl AuthError {
    /// Only infrastructure failures are worth retrying; bad input stays bad.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Storage(_) | AuthError::DeadlineExceeded)
    }
}

/// Errors surfaced by the OAuth grant manager.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Unknown client")]
    UnknownClient,
    #[error("Invalid client credentials")]
    InvalidClientCredentials,
    #[error("Redirect URI is not registered for this client")]
    InvalidRedirectUri,
    #[error("Redirect URI does not match the authorization request")]
    RedirectUriMismatch,
    #[error("Client is not allowed to use grant type {0}")]
    UnauthorizedGrantType(&'static str),
    #[error("Invalid or expired authorization code")]
    InvalidOrExpiredCode,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Account is deactivated")]
    AccountDeactivated,
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("Random source failed: {0}")]
    Entropy(String),
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl From<tokio::time::error::Elapsed> for OAuthError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        OAuthError::DeadlineExceeded
    }
}

impl OAuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OAuthError::Storage(_) | OAuthError::DeadlineExceeded)
    }
}
