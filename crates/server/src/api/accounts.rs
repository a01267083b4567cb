//! Account endpoints (/api/auth/*): registration, login, token refresh,
//! logout, stateless validation and the caller's own profile.

use crate::AppResources;
use crate::api::auth::{ApiError, BearerAuth, ErrorResponse, bearer_token};
use crate::auth::{AuthResponse, ProfileUpdate, RegisterRequest};
use crate::entity::user::{self, Role};
use axum::{
    Extension, Json,
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub const AUTH_TAG: &str = "Authentication";

pub(crate) fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
        .routes(routes!(refresh))
        .routes(routes!(logout))
        .routes(routes!(validate))
        .routes(routes!(get_me, update_me))
        .routes(routes!(deactivate_user))
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ValidateRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Expiry as a unix timestamp
    pub exp: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<user::Model> for UserProfile {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/register",
    tag = AUTH_TAG,
    operation_id = "Register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, token pair issued", body = AuthResponse),
        (status = 400, description = "Invalid email, username, password or role", body = ErrorResponse),
        (status = 409, description = "Email or username already in use", body = ErrorResponse),
        (status = 503, description = "Storage unavailable, retry later", body = ErrorResponse)
    )
)]
async fn register(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = resources.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = AuthResponse),
        (status = 401, description = "Unknown email or wrong password", body = ErrorResponse),
        (status = 403, description = "Account deactivated", body = ErrorResponse)
    )
)]
async fn login(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let response = resources
        .auth
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/refresh",
    tag = AUTH_TAG,
    operation_id = "Refresh Token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued", body = AuthResponse),
        (status = 401, description = "Refresh token invalid or expired", body = ErrorResponse),
        (status = 403, description = "Account deactivated", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse)
    )
)]
async fn refresh(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let response = resources.auth.refresh_token(&payload.refresh_token).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = AUTH_TAG,
    operation_id = "Logout",
    security(("Authorization" = [])),
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    )
)]
async fn logout(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    resources.auth.logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stateless access-token check for gateways.
#[utoipa::path(
    post,
    path = "/validate",
    tag = AUTH_TAG,
    operation_id = "Validate Token",
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Token is valid", body = ValidateResponse),
        (status = 401, description = "`token_expired` or `invalid_token`", body = ErrorResponse)
    )
)]
async fn validate(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let claims = resources.auth.validate_token(&payload.token)?;
    Ok(Json(ValidateResponse {
        valid: true,
        user_id: claims.sub,
        email: claims.email,
        username: claims.username,
        role: claims.role,
        exp: claims.exp,
    }))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = AUTH_TAG,
    operation_id = "Get Current User",
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "The caller's profile", body = UserProfile),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse)
    )
)]
async fn get_me(
    Extension(resources): Extension<AppResources>,
    BearerAuth(claims): BearerAuth,
) -> Result<Json<UserProfile>, ApiError> {
    let user = resources.auth.get_user_by_id(&claims.sub).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    patch,
    path = "/me",
    tag = AUTH_TAG,
    operation_id = "Update Current User",
    security(("Authorization" = [])),
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid username", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 409, description = "Username already in use", body = ErrorResponse)
    )
)]
async fn update_me(
    Extension(resources): Extension<AppResources>,
    BearerAuth(claims): BearerAuth,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = resources.auth.update_profile(&claims.sub, payload).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/deactivate",
    tag = AUTH_TAG,
    operation_id = "Deactivate User",
    security(("Authorization" = [])),
    params(("user_id" = String, Path, description = "User to deactivate")),
    responses(
        (status = 200, description = "User deactivated", body = UserProfile),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
async fn deactivate_user(
    Extension(resources): Extension<AppResources>,
    BearerAuth(claims): BearerAuth,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    if claims.role != Some(Role::Admin) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            Some("Admin role required".into()),
        ));
    }
    let user = resources.auth.deactivate_user(&user_id).await?;
    Ok(Json(user.into()))
}
