//! OAuth2 HTTP endpoints.
//!
//! - `GET /oauth2/authorize` - issues an authorization code for the bearer of an access token
//! - `POST /oauth2/token` - `authorization_code` and `refresh_token` grants
//! - `POST /oauth2/revoke` - RFC 7009 revocation
//! - `POST /oauth2/introspect` - RFC 7662 style introspection

use crate::AppResources;
use crate::api::auth::{ApiError, BearerAuth, ErrorResponse};
use crate::oauth2::grant::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, Introspection, OAuthTokens};
use crate::oauth2::OAUTH2_TAG;
use axum::{
    Extension, Form, Json,
    extract::Query,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use base64::Engine;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(revoke))
        .routes(routes!(introspect))
}

/// OAuth2 authorization request parameters.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuthorizeRequest {
    /// Must be "code" for Authorization Code flow
    pub response_type: String,
    /// Client identifier issued during registration
    pub client_id: String,
    /// Redirect URI (must exactly match a registered URI)
    pub redirect_uri: String,
    /// Space-separated list of requested scopes
    pub scope: Option<String>,
    /// Opaque value for CSRF protection, returned unchanged
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    pub token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// OAuth2 Authorization endpoint.
///
/// The resource owner is identified by the access token on the request, so
/// no login page is involved; on success the user agent is sent back to the
/// client with `code` and `state`.
#[tracing::instrument(skip(resources, claims), fields(client_id = %params.client_id))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Issue an authorization code",
    security(("Authorization" = [])),
    params(AuthorizeRequest),
    responses(
        (status = 303, description = "Redirect back to the client with `code` and `state`, or with `error` for an unsupported response type"),
        (status = 400, description = "Redirect URI not registered for this client", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token, or unknown client", body = ErrorResponse),
    )
)]
pub async fn authorize(
    Extension(resources): Extension<AppResources>,
    BearerAuth(claims): BearerAuth,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Response, ApiError> {
    // Never redirect anywhere before the URI has been checked against the client.
    resources
        .oauth2
        .validate_redirect_uri(&params.client_id, &params.redirect_uri)
        .await?;

    if params.response_type != "code" {
        return client_redirect(
            &params.redirect_uri,
            &[("error", "unsupported_response_type")],
            params.state.as_deref(),
        );
    }

    let code = resources
        .oauth2
        .generate_authorization_code(
            &params.client_id,
            &claims.sub,
            &params.redirect_uri,
            params.scope.as_deref(),
        )
        .await?;

    client_redirect(
        &params.redirect_uri,
        &[("code", code.as_str())],
        params.state.as_deref(),
    )
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(resources, headers, params), fields(grant_type = %params.grant_type))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token",
    description = "Client credentials are accepted via HTTP Basic authentication or the \
                   `client_id`/`client_secret` form fields.",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token pair issued", body = OAuthTokens),
        (status = 400, description = "`invalid_request`, `invalid_grant`, `unauthorized_client` or `unsupported_grant_type`", body = ErrorResponse),
        (status = 401, description = "`invalid_client` or `invalid_token`", body = ErrorResponse),
    )
)]
pub async fn token(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, ApiError> {
    let (client_id, client_secret) = require_client_credentials(
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )?;

    let tokens = match params.grant_type.as_str() {
        GRANT_AUTHORIZATION_CODE => {
            let code = required(params.code, "code")?;
            let redirect_uri = required(params.redirect_uri, "redirect_uri")?;
            resources
                .oauth2
                .exchange_code_for_token(&client_id, &client_secret, &code, &redirect_uri)
                .await?
        }
        GRANT_REFRESH_TOKEN => {
            let refresh_token = required(params.refresh_token, "refresh_token")?;
            resources
                .oauth2
                .refresh_access_token(&client_id, &client_secret, &refresh_token)
                .await?
        }
        _ => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                Some(format!("Grant type '{}' is not supported", params.grant_type)),
            ));
        }
    };

    Ok((
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        Json(tokens),
    )
        .into_response())
}

/// OAuth2 Token revocation (RFC 7009).
///
/// Answers 200 whether or not the token existed.
#[tracing::instrument(skip(resources, headers, params))]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke",
    summary = "Revoke an access or refresh token",
    description = "Requires client authentication, like the token endpoint.",
    request_body(content = RevokeRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token revoked or unknown"),
        (status = 401, description = "`invalid_client`", body = ErrorResponse),
        (status = 503, description = "Storage unavailable, retry later", body = ErrorResponse),
    )
)]
pub async fn revoke(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Form(params): Form<RevokeRequest>,
) -> Result<StatusCode, ApiError> {
    authenticate(
        &resources,
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    resources.oauth2.revoke_token(&params.token).await?;
    Ok(StatusCode::OK)
}

/// OAuth2 Token introspection.
#[tracing::instrument(skip(resources, headers, params))]
#[utoipa::path(
    post,
    path = "/introspect",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Introspect",
    summary = "Describe an access token",
    description = "Callers authenticate as a registered client. Unknown and expired tokens \
                   are both reported as `{\"active\": false}`.",
    request_body(content = IntrospectRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Introspection result", body = Introspection),
        (status = 401, description = "`invalid_client`", body = ErrorResponse),
    )
)]
pub async fn introspect(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Form(params): Form<IntrospectRequest>,
) -> Result<Json<Introspection>, ApiError> {
    authenticate(
        &resources,
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .await?;
    Ok(Json(resources.oauth2.introspect_token(&params.token).await?))
}

// =============================================================================
// Helper Functions
// =============================================================================

fn extract_client_credentials(
    headers: &HeaderMap,
    form_id: Option<&str>,
    form_secret: Option<&str>,
) -> (Option<String>, Option<String>) {
    // Try Basic auth first
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(auth)
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (Some(id.to_string()), Some(secret.to_string()));
    }

    // Fall back to form body
    (form_id.map(str::to_string), form_secret.map(str::to_string))
}

fn require_client_credentials(
    headers: &HeaderMap,
    form_id: Option<&str>,
    form_secret: Option<&str>,
) -> Result<(String, String), ApiError> {
    match extract_client_credentials(headers, form_id, form_secret) {
        (Some(id), Some(secret)) => Ok((id, secret)),
        _ => Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            Some("Client authentication required".into()),
        )),
    }
}

async fn authenticate(
    resources: &AppResources,
    headers: &HeaderMap,
    form_id: Option<&str>,
    form_secret: Option<&str>,
) -> Result<(), ApiError> {
    let (client_id, client_secret) = require_client_credentials(headers, form_id, form_secret)?;
    resources
        .oauth2
        .authenticate_client(&client_id, &client_secret)
        .await?;
    Ok(())
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::invalid_request(format!("{name} is required")))
}

/// 303 back to a redirect URI that has already been validated for the client.
fn client_redirect(
    redirect_uri: &str,
    params: &[(&str, &str)],
    state: Option<&str>,
) -> Result<Response, ApiError> {
    let mut url = url::Url::parse(redirect_uri)
        .map_err(|_| ApiError::invalid_request("Registered redirect URI is not absolute"))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(Redirect::to(url.as_str()).into_response())
}
