//! Authorization-code grant tests against a migrated in-memory database.

mod common;

use commerce_auth::AppResources;
use commerce_auth::entity::{oauth2_access_token, oauth2_authorization};
use commerce_auth::error::OAuthError;
use commerce_auth::store::{DbGrantStore, GrantStore, now_utc};
use common::{
    CLIENT_ID, CLIENT_SCOPES, CLIENT_SECRET, REDIRECT_URI, seed_client_with_id, seed_user,
    test_resources,
};
use sea_orm::EntityTrait;

const USER_ID: &str = "user-1";

async fn resources() -> AppResources {
    let resources = test_resources().await;
    seed_user(&resources, USER_ID).await;
    resources
}

async fn issue_code(resources: &AppResources, scope: Option<&str>) -> String {
    resources
        .oauth2
        .generate_authorization_code(CLIENT_ID, USER_ID, REDIRECT_URI, scope)
        .await
        .unwrap()
}

async fn exchange(
    resources: &AppResources,
    code: &str,
) -> Result<commerce_auth::oauth2::OAuthTokens, OAuthError> {
    resources
        .oauth2
        .exchange_code_for_token(CLIENT_ID, CLIENT_SECRET, code, REDIRECT_URI)
        .await
}

#[tokio::test]
async fn code_exchange_issues_bearer_pair() {
    let resources = resources().await;
    let code = issue_code(&resources, Some("orders:read")).await;

    let tokens = exchange(&resources, &code).await.unwrap();
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, 3600);
    assert_eq!(tokens.scope, "orders:read");
    assert_ne!(tokens.access_token, tokens.refresh_token);

    let access = resources
        .oauth2
        .validate_access_token(&tokens.access_token)
        .await
        .unwrap();
    assert_eq!(access.user_id, USER_ID);
    assert_eq!(access.client_id, CLIENT_ID);
    assert!(access.has_scope("orders:read"));
    assert!(!access.has_scope("orders:write"));
}

#[tokio::test]
async fn code_is_single_use() {
    let resources = resources().await;
    let code = issue_code(&resources, None).await;

    exchange(&resources, &code).await.unwrap();
    assert!(matches!(
        exchange(&resources, &code).await,
        Err(OAuthError::InvalidOrExpiredCode)
    ));
}

#[tokio::test]
async fn concurrent_exchanges_mint_one_pair() {
    let resources = resources().await;
    let code = issue_code(&resources, None).await;

    let (a, b) = tokio::join!(exchange(&resources, &code), exchange(&resources, &code));

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(OAuthError::InvalidOrExpiredCode)))
    );
    let tokens = oauth2_access_token::Entity::find()
        .all(resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(tokens.len(), 1);
}

#[tokio::test]
async fn redirect_uri_must_match_the_code() {
    let resources = resources().await;
    let code = issue_code(&resources, None).await;

    let err = resources
        .oauth2
        .exchange_code_for_token(CLIENT_ID, CLIENT_SECRET, &code, "https://shop.example/other")
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::RedirectUriMismatch));
}

#[tokio::test]
async fn unregistered_redirect_uri_gets_no_code() {
    let resources = resources().await;

    for uri in [
        "https://evil.example/callback",
        "https://shop.example/callback/extra",
        "https://shop.example/callback?x=1",
    ] {
        let err = resources
            .oauth2
            .generate_authorization_code(CLIENT_ID, USER_ID, uri, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidRedirectUri), "{uri}");
    }
    assert!(
        oauth2_authorization::Entity::find()
            .all(resources.db.as_ref())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn client_authentication_is_enforced() {
    let resources = resources().await;
    let code = issue_code(&resources, None).await;

    let wrong_secret = resources
        .oauth2
        .exchange_code_for_token(CLIENT_ID, "guess", &code, REDIRECT_URI)
        .await
        .unwrap_err();
    assert!(matches!(wrong_secret, OAuthError::InvalidClientCredentials));

    let unknown = resources
        .oauth2
        .exchange_code_for_token("ghost", CLIENT_SECRET, &code, REDIRECT_URI)
        .await
        .unwrap_err();
    assert!(matches!(unknown, OAuthError::UnknownClient));

    // A failed attempt does not burn the code
    assert!(exchange(&resources, &code).await.is_ok());
}

#[tokio::test]
async fn code_is_bound_to_its_client() {
    let resources = resources().await;
    seed_client_with_id(&resources, "other-app", "authorization_code refresh_token").await;
    let code = issue_code(&resources, None).await;

    let err = resources
        .oauth2
        .exchange_code_for_token("other-app", CLIENT_SECRET, &code, REDIRECT_URI)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::InvalidOrExpiredCode));
}

#[tokio::test]
async fn expired_code_is_rejected() {
    let resources = resources().await;
    let grants = DbGrantStore::new(resources.db.clone());
    let now = now_utc();
    grants
        .create_authorization_code(oauth2_authorization::Model {
            code: "stale-code".into(),
            client_id: CLIENT_ID.into(),
            user_id: USER_ID.into(),
            redirect_uri: REDIRECT_URI.into(),
            scope: "profile".into(),
            expires_at: now - time::Duration::minutes(1),
            created_at: now - time::Duration::minutes(11),
        })
        .await
        .unwrap();

    assert!(matches!(
        exchange(&resources, "stale-code").await,
        Err(OAuthError::InvalidOrExpiredCode)
    ));
}

#[tokio::test]
async fn scope_is_negotiated_against_the_client() {
    let resources = resources().await;

    let code = issue_code(&resources, Some("orders:write admin:all")).await;
    assert_eq!(exchange(&resources, &code).await.unwrap().scope, "orders:write");

    let code = issue_code(&resources, Some("admin:all")).await;
    assert_eq!(exchange(&resources, &code).await.unwrap().scope, CLIENT_SCOPES);

    let code = issue_code(&resources, None).await;
    assert_eq!(exchange(&resources, &code).await.unwrap().scope, CLIENT_SCOPES);
}

#[tokio::test]
async fn grant_types_are_per_client() {
    let resources = resources().await;
    seed_client_with_id(&resources, "refresh-only", "refresh_token").await;
    seed_client_with_id(&resources, "code-only", "authorization_code").await;

    let err = resources
        .oauth2
        .generate_authorization_code("refresh-only", USER_ID, REDIRECT_URI, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OAuthError::UnauthorizedGrantType("authorization_code")
    ));

    let code = resources
        .oauth2
        .generate_authorization_code("code-only", USER_ID, REDIRECT_URI, None)
        .await
        .unwrap();
    let tokens = resources
        .oauth2
        .exchange_code_for_token("code-only", CLIENT_SECRET, &code, REDIRECT_URI)
        .await
        .unwrap();
    let err = resources
        .oauth2
        .refresh_access_token("code-only", CLIENT_SECRET, &tokens.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::UnauthorizedGrantType("refresh_token")));
}

#[tokio::test]
async fn refresh_rotates_the_pair() {
    let resources = resources().await;
    let code = issue_code(&resources, Some("orders:read profile")).await;
    let original = exchange(&resources, &code).await.unwrap();

    let rotated = resources
        .oauth2
        .refresh_access_token(CLIENT_ID, CLIENT_SECRET, &original.refresh_token)
        .await
        .unwrap();
    assert_eq!(rotated.scope, "orders:read profile");
    assert_ne!(rotated.access_token, original.access_token);
    assert_ne!(rotated.refresh_token, original.refresh_token);

    // The old pair is gone
    assert!(matches!(
        resources
            .oauth2
            .refresh_access_token(CLIENT_ID, CLIENT_SECRET, &original.refresh_token)
            .await,
        Err(OAuthError::InvalidOrExpiredToken)
    ));
    assert!(
        resources
            .oauth2
            .validate_access_token(&original.access_token)
            .await
            .is_err()
    );
    assert!(
        resources
            .oauth2
            .validate_access_token(&rotated.access_token)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn revoking_access_token_takes_refresh_token_with_it() {
    let resources = resources().await;
    let code = issue_code(&resources, None).await;
    let tokens = exchange(&resources, &code).await.unwrap();

    assert!(resources.oauth2.revoke_token(&tokens.access_token).await.unwrap());

    assert!(matches!(
        resources.oauth2.validate_access_token(&tokens.access_token).await,
        Err(OAuthError::InvalidOrExpiredToken)
    ));
    assert!(matches!(
        resources
            .oauth2
            .refresh_access_token(CLIENT_ID, CLIENT_SECRET, &tokens.refresh_token)
            .await,
        Err(OAuthError::InvalidOrExpiredToken)
    ));
}

#[tokio::test]
async fn revoking_refresh_token_takes_access_token_with_it() {
    let resources = resources().await;
    let code = issue_code(&resources, None).await;
    let tokens = exchange(&resources, &code).await.unwrap();

    assert!(resources.oauth2.revoke_token(&tokens.refresh_token).await.unwrap());
    assert!(
        resources
            .oauth2
            .validate_access_token(&tokens.access_token)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn revoking_unknown_token_is_not_an_error() {
    let resources = resources().await;
    assert!(!resources.oauth2.revoke_token("never-issued").await.unwrap());
}

#[tokio::test]
async fn introspection_reports_live_tokens_only() {
    let resources = resources().await;
    let code = issue_code(&resources, Some("profile")).await;
    let tokens = exchange(&resources, &code).await.unwrap();

    let live = resources
        .oauth2
        .introspect_token(&tokens.access_token)
        .await
        .unwrap();
    assert!(live.active);
    assert_eq!(live.client_id.as_deref(), Some(CLIENT_ID));
    assert_eq!(live.user_id.as_deref(), Some(USER_ID));
    assert_eq!(live.scope.as_deref(), Some("profile"));
    assert!(live.exp.unwrap() > now_utc().unix_timestamp());

    // Refresh tokens are not bearer credentials
    let refresh = resources
        .oauth2
        .introspect_token(&tokens.refresh_token)
        .await
        .unwrap();
    assert!(!refresh.active);

    resources.oauth2.revoke_token(&tokens.access_token).await.unwrap();
    let revoked = resources
        .oauth2
        .introspect_token(&tokens.access_token)
        .await
        .unwrap();
    assert_eq!(revoked, Default::default());
}

#[tokio::test]
async fn deactivated_account_loses_oauth_access() {
    let resources = resources().await;
    let tokens = exchange(&resources, &issue_code(&resources, None).await)
        .await
        .unwrap();
    let pending = issue_code(&resources, None).await;

    resources.auth.deactivate_user(USER_ID).await.unwrap();

    assert!(matches!(
        resources
            .oauth2
            .generate_authorization_code(CLIENT_ID, USER_ID, REDIRECT_URI, None)
            .await,
        Err(OAuthError::AccountDeactivated)
    ));
    assert!(matches!(
        exchange(&resources, &pending).await,
        Err(OAuthError::AccountDeactivated)
    ));
    assert!(matches!(
        resources
            .oauth2
            .refresh_access_token(CLIENT_ID, CLIENT_SECRET, &tokens.refresh_token)
            .await,
        Err(OAuthError::AccountDeactivated)
    ));
    assert!(matches!(
        resources.oauth2.validate_access_token(&tokens.access_token).await,
        Err(OAuthError::InvalidOrExpiredToken)
    ));
    let introspection = resources
        .oauth2
        .introspect_token(&tokens.access_token)
        .await
        .unwrap();
    assert_eq!(introspection, Default::default());
}

#[tokio::test]
async fn codes_are_not_issued_for_unknown_accounts() {
    let resources = resources().await;
    assert!(matches!(
        resources
            .oauth2
            .generate_authorization_code(CLIENT_ID, "no-such-user", REDIRECT_URI, None)
            .await,
        Err(OAuthError::InvalidOrExpiredToken)
    ));
}
