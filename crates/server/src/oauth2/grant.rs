//! Authorization-code grant with stateful, revocable OAuth2 tokens.

use crate::config::OAuth2Config;
use crate::entity::{oauth2_access_token, oauth2_authorization, oauth2_client, oauth2_refresh_token};
use crate::error::OAuthError;
use crate::store::{ClientStore, GrantStore, IssuedGrant, UserStore, now_utc};
use base64::Engine;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info};
use utoipa::ToSchema;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Lifetimes of the rows minted by the grant manager.
#[derive(Clone, Copy, Debug)]
pub struct GrantLifetimes {
    pub authorization_code: time::Duration,
    pub access_token: time::Duration,
    pub refresh_token: time::Duration,
}

impl From<&OAuth2Config> for GrantLifetimes {
    fn from(config: &OAuth2Config) -> Self {
        let secs = |s: u64| time::Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX));
        Self {
            authorization_code: secs(config.authorization_code_ttl_secs),
            access_token: secs(config.access_token_ttl_secs),
            refresh_token: secs(config.refresh_token_ttl_secs),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct OAuthTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    pub scope: String,
}

/// Introspection result. Unknown and expired tokens both report `active: false`
/// with no further fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct Introspection {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expiry as a unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Generate an opaque token: 32 bytes from the OS RNG, base64url without padding.
pub fn generate_token() -> Result<String, OAuthError> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| OAuthError::Entropy(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Issues, exchanges, rotates, revokes and introspects OAuth2 grants.
pub struct GrantManager {
    clients: Arc<dyn ClientStore>,
    grants: Arc<dyn GrantStore>,
    users: Arc<dyn UserStore>,
    lifetimes: GrantLifetimes,
    deadline: std::time::Duration,
}

impl GrantManager {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        grants: Arc<dyn GrantStore>,
        users: Arc<dyn UserStore>,
        lifetimes: GrantLifetimes,
        deadline: std::time::Duration,
    ) -> Self {
        Self {
            clients,
            grants,
            users,
            lifetimes,
            deadline,
        }
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, OAuthError>>,
    ) -> Result<T, OAuthError> {
        tokio::time::timeout(self.deadline, fut).await?
    }

    #[tracing::instrument(skip(self))]
    pub async fn validate_client(&self, client_id: &str) -> Result<oauth2_client::Model, OAuthError> {
        self.with_deadline(self.load_client(client_id)).await
    }

    async fn load_client(&self, client_id: &str) -> Result<oauth2_client::Model, OAuthError> {
        self.clients
            .get_client(client_id)
            .await?
            .ok_or(OAuthError::UnknownClient)
    }

    /// Checks a confidential client's credentials.
    #[tracing::instrument(skip(self, client_secret))]
    pub async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<oauth2_client::Model, OAuthError> {
        self.with_deadline(self.verify_client(client_id, client_secret))
            .await
    }

    /// The URI must be an exact member of the client's registered set.
    #[tracing::instrument(skip(self))]
    pub async fn validate_redirect_uri(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<(), OAuthError> {
        let client = self.validate_client(client_id).await?;
        check_redirect_uri(&client, redirect_uri)
    }

    /// Persists a fresh single-use code bound to client, user, redirect URI
    /// and the negotiated scope.
    #[tracing::instrument(skip(self))]
    pub async fn generate_authorization_code(
        &self,
        client_id: &str,
        user_id: &str,
        redirect_uri: &str,
        scope: Option<&str>,
    ) -> Result<String, OAuthError> {
        self.with_deadline(self.generate_code_inner(client_id, user_id, redirect_uri, scope))
            .await
    }

    async fn generate_code_inner(
        &self,
        client_id: &str,
        user_id: &str,
        redirect_uri: &str,
        scope: Option<&str>,
    ) -> Result<String, OAuthError> {
        let client = self.load_client(client_id).await?;
        check_redirect_uri(&client, redirect_uri)?;
        check_grant_type(&client, GRANT_AUTHORIZATION_CODE)?;
        self.ensure_active_user(user_id, OAuthError::InvalidOrExpiredToken)
            .await?;

        let scope = client.negotiate_scope(scope);
        let code = generate_token()?;
        let now = now_utc();
        self.grants
            .create_authorization_code(oauth2_authorization::Model {
                code: code.clone(),
                client_id: client.id,
                user_id: user_id.to_string(),
                redirect_uri: redirect_uri.to_string(),
                scope,
                expires_at: now + self.lifetimes.authorization_code,
                created_at: now,
            })
            .await?;

        debug!("Authorization code issued");
        Ok(code)
    }

    /// Single-use exchange: the code row is deleted in the same transaction
    /// that inserts the token pair.
    #[tracing::instrument(skip(self, client_secret, code))]
    pub async fn exchange_code_for_token(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        self.with_deadline(self.exchange_inner(client_id, client_secret, code, redirect_uri))
            .await
    }

    async fn exchange_inner(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        let client = self.verify_client(client_id, client_secret).await?;
        check_grant_type(&client, GRANT_AUTHORIZATION_CODE)?;

        let now = now_utc();
        let authorization = self
            .grants
            .find_authorization_code(code, now)
            .await?
            .filter(|a| a.client_id == client.id)
            .ok_or(OAuthError::InvalidOrExpiredCode)?;

        if authorization.redirect_uri != redirect_uri {
            return Err(OAuthError::RedirectUriMismatch);
        }
        self.ensure_active_user(&authorization.user_id, OAuthError::InvalidOrExpiredCode)
            .await?;

        let (grant, tokens) = self.mint_pair(
            &client.id,
            &authorization.user_id,
            &authorization.scope,
            now,
        )?;
        if !self.grants.redeem_authorization_code(code, grant).await? {
            return Err(OAuthError::InvalidOrExpiredCode);
        }

        info!(client_id = %client.id, user_id = %authorization.user_id, "Authorization code exchanged");
        Ok(tokens)
    }

    /// Rotates a refresh token: the old pair is removed and a new one inserted
    /// atomically, keeping the original scope.
    #[tracing::instrument(skip(self, client_secret, refresh_token))]
    pub async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        self.with_deadline(self.refresh_inner(client_id, client_secret, refresh_token))
            .await
    }

    async fn refresh_inner(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        let client = self.verify_client(client_id, client_secret).await?;
        check_grant_type(&client, GRANT_REFRESH_TOKEN)?;

        let now = now_utc();
        let existing = self
            .grants
            .find_refresh_token(refresh_token, now)
            .await?
            .filter(|r| r.client_id == client.id)
            .ok_or(OAuthError::InvalidOrExpiredToken)?;
        self.ensure_active_user(&existing.user_id, OAuthError::InvalidOrExpiredToken)
            .await?;

        let (grant, tokens) = self.mint_pair(&client.id, &existing.user_id, &existing.scope, now)?;
        if !self.grants.rotate_refresh_token(&existing.id, grant).await? {
            return Err(OAuthError::InvalidOrExpiredToken);
        }

        info!(client_id = %client.id, user_id = %existing.user_id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Stateful lookup; a revoked or expired token is simply absent, and a
    /// token whose owner has been deactivated is treated the same way.
    #[tracing::instrument(skip(self, token))]
    pub async fn validate_access_token(
        &self,
        token: &str,
    ) -> Result<oauth2_access_token::Model, OAuthError> {
        self.with_deadline(self.find_live_access_token(token)).await
    }

    async fn find_live_access_token(
        &self,
        token: &str,
    ) -> Result<oauth2_access_token::Model, OAuthError> {
        let access = self
            .grants
            .find_access_token(token, now_utc())
            .await?
            .ok_or(OAuthError::InvalidOrExpiredToken)?;
        self.ensure_active_user(&access.user_id, OAuthError::InvalidOrExpiredToken)
            .await
            .map_err(|e| match e {
                OAuthError::AccountDeactivated => OAuthError::InvalidOrExpiredToken,
                other => other,
            })?;
        Ok(access)
    }

    /// Revokes an access or refresh token together with its linked partner.
    /// Returns whether anything was removed.
    #[tracing::instrument(skip(self, token))]
    pub async fn revoke_token(&self, token: &str) -> Result<bool, OAuthError> {
        self.with_deadline(self.revoke_inner(token)).await
    }

    async fn revoke_inner(&self, token: &str) -> Result<bool, OAuthError> {
        let revoked = self.grants.revoke_access_token(token).await?
            || self.grants.revoke_refresh_token(token).await?;
        if revoked {
            info!("Token revoked");
        }
        Ok(revoked)
    }

    #[tracing::instrument(skip(self, token))]
    pub async fn introspect_token(&self, token: &str) -> Result<Introspection, OAuthError> {
        self.with_deadline(self.introspect_inner(token)).await
    }

    async fn introspect_inner(&self, token: &str) -> Result<Introspection, OAuthError> {
        let introspection = match self.find_live_access_token(token).await {
            Ok(access) => Introspection {
                active: true,
                exp: Some(access.expires_at.unix_timestamp()),
                client_id: Some(access.client_id),
                user_id: Some(access.user_id),
                scope: Some(access.scope),
            },
            Err(OAuthError::InvalidOrExpiredToken) => Introspection::default(),
            Err(e) => return Err(e),
        };
        Ok(introspection)
    }

    async fn verify_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<oauth2_client::Model, OAuthError> {
        let client = self.load_client(client_id).await?;
        if !client.secret_matches(client_secret) {
            return Err(OAuthError::InvalidClientCredentials);
        }
        Ok(client)
    }

    /// Grants are only issued to, and honoured for, existing active accounts.
    /// A missing account yields `missing`.
    async fn ensure_active_user(
        &self,
        user_id: &str,
        missing: OAuthError,
    ) -> Result<(), OAuthError> {
        match self.users.get_by_id(user_id).await? {
            Some(user) if user.is_active => Ok(()),
            Some(_) => {
                debug!(user_id, "Grant refused for deactivated account");
                Err(OAuthError::AccountDeactivated)
            }
            None => Err(missing),
        }
    }

    fn mint_pair(
        &self,
        client_id: &str,
        user_id: &str,
        scope: &str,
        now: OffsetDateTime,
    ) -> Result<(IssuedGrant, OAuthTokens), OAuthError> {
        let access = oauth2_access_token::Model {
            id: uuid::Uuid::new_v4().to_string(),
            token: generate_token()?,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            expires_at: now + self.lifetimes.access_token,
            created_at: now,
        };
        let refresh = oauth2_refresh_token::Model {
            id: uuid::Uuid::new_v4().to_string(),
            token: generate_token()?,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            access_token_id: access.id.clone(),
            scope: scope.to_string(),
            expires_at: now + self.lifetimes.refresh_token,
            created_at: now,
        };
        let tokens = OAuthTokens {
            access_token: access.token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: self.lifetimes.access_token.whole_seconds().unsigned_abs(),
            refresh_token: refresh.token.clone(),
            scope: scope.to_string(),
        };
        Ok((IssuedGrant { access, refresh }, tokens))
    }
}

fn check_redirect_uri(client: &oauth2_client::Model, redirect_uri: &str) -> Result<(), OAuthError> {
    if client.is_redirect_uri_allowed(redirect_uri) {
        Ok(())
    } else {
        Err(OAuthError::InvalidRedirectUri)
    }
}

fn check_grant_type(client: &oauth2_client::Model, grant_type: &'static str) -> Result<(), OAuthError> {
    if client.is_grant_type_allowed(grant_type) {
        Ok(())
    } else {
        Err(OAuthError::UnauthorizedGrantType(grant_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_url_safe_and_unique() {
        let token1 = generate_token().unwrap();
        let token2 = generate_token().unwrap();

        assert_ne!(token1, token2);
        assert!(!token1.contains('+'));
        assert!(!token1.contains('/'));
        assert!(!token1.contains('='));
        // 32 bytes base64url encoded without padding
        assert_eq!(token1.len(), 43);
    }

    #[test]
    fn lifetimes_from_config() {
        let lifetimes = GrantLifetimes::from(&OAuth2Config::default());
        assert_eq!(lifetimes.authorization_code, time::Duration::minutes(10));
        assert_eq!(lifetimes.access_token, time::Duration::hours(1));
        assert_eq!(lifetimes.refresh_token, time::Duration::days(7));
    }
}
