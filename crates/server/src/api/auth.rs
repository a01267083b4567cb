//! Bearer-token extractor and the mapping from core errors to HTTP responses.

use crate::AppResources;
use crate::auth::Claims;
use crate::error::{AuthError, OAuthError, TokenError};
use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error code (e.g., "invalid_token", "invalid_grant")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// An error already resolved to a status and body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, description: Option<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                error_description: description,
            },
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            Some(description.into()),
        )
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            Some(description.into()),
        )
    }

    fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "temporarily_unavailable", None)
    }

    fn server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", None)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status == StatusCode::UNAUTHORIZED && self.body.error == "invalid_token" {
            return (
                self.status,
                [(header::WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
                Json(self.body),
            )
                .into_response();
        }
        (self.status, Json(self.body)).into_response()
    }
}

/// Only expired vs. otherwise invalid is exposed, so clients can choose
/// between refreshing and re-authenticating.
impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::new(
                StatusCode::UNAUTHORIZED,
                "token_expired",
                Some("Token has expired".into()),
            ),
            TokenError::Signing(e) => {
                tracing::error!(error = %e, "Token signing failed");
                Self::server_error()
            }
            TokenError::InvalidSignature | TokenError::WrongType | TokenError::Malformed => {
                Self::invalid_token("Token is invalid")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let description = Some(err.to_string());
        match err {
            AuthError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, "invalid_request", description),
            AuthError::DuplicateEmail => Self::new(StatusCode::CONFLICT, "email_taken", description),
            AuthError::DuplicateUsername => {
                Self::new(StatusCode::CONFLICT, "username_taken", description)
            }
            AuthError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_credentials", description)
            }
            AuthError::AccountDeactivated => {
                Self::new(StatusCode::FORBIDDEN, "account_deactivated", description)
            }
            AuthError::UserNotFound => Self::new(StatusCode::NOT_FOUND, "not_found", description),
            AuthError::InvalidRefreshToken => Self::invalid_token("Refresh token is invalid"),
            AuthError::Token(e) => e.into(),
            AuthError::Storage(e) => {
                tracing::warn!(error = %e, "Storage unavailable");
                Self::unavailable()
            }
            AuthError::DeadlineExceeded => {
                tracing::warn!("Request deadline exceeded");
                Self::unavailable()
            }
            AuthError::Hashing(e) => {
                tracing::error!(error = %e, "Password hashing failed");
                Self::server_error()
            }
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        let description = Some(err.to_string());
        match err {
            OAuthError::UnknownClient | OAuthError::InvalidClientCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_client", description)
            }
            OAuthError::InvalidRedirectUri => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
            }
            OAuthError::RedirectUriMismatch | OAuthError::InvalidOrExpiredCode => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_grant", description)
            }
            OAuthError::UnauthorizedGrantType(_) => {
                Self::new(StatusCode::BAD_REQUEST, "unauthorized_client", description)
            }
            OAuthError::InvalidOrExpiredToken => Self::invalid_token("Token is invalid or expired"),
            OAuthError::AccountDeactivated => {
                Self::new(StatusCode::FORBIDDEN, "account_deactivated", description)
            }
            OAuthError::Storage(e) => {
                tracing::warn!(error = %e, "Storage unavailable");
                Self::unavailable()
            }
            OAuthError::DeadlineExceeded => {
                tracing::warn!("Request deadline exceeded");
                Self::unavailable()
            }
            OAuthError::Entropy(e) => {
                tracing::error!(error = %e, "Random source failed");
                Self::server_error()
            }
        }
    }
}

/// Returns the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::invalid_token("Missing Authorization header"))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))
}

/// Axum extractor that verifies a stateless access token.
///
/// No storage round-trip: signature, expiry and type tag only.
///
/// # Example
///
/// ```ignore
/// async fn handler(BearerAuth(claims): BearerAuth) -> impl IntoResponse {
///     format!("Hello, {}", claims.sub)
/// }
/// ```
pub struct BearerAuth(pub Claims);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!("AppResources not found in extensions");
                ApiError::server_error()
            })?;

        let token = bearer_token(&parts.headers)?;
        let claims = resources.auth.validate_token(token)?;
        Ok(BearerAuth(claims))
    }
}
