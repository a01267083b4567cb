//! Stateless access/refresh token signing and verification (HS256).

use crate::config::JwtConfig;
use crate::entity::user::{self, Role};
use crate::error::TokenError;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token, so two pairs minted in the same second differ.
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Holds the signing secret for the lifetime of the process.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl: Duration::seconds(ttl_secs(config.access_token_ttl_secs)),
            refresh_ttl: Duration::seconds(ttl_secs(config.refresh_token_ttl_secs)),
        }
    }

    /// Mints an access/refresh pair for `user`.
    pub fn issue(&self, user: &user::Model) -> Result<TokenPair, TokenError> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        user: &user::Model,
        now: OffsetDateTime,
    ) -> Result<TokenPair, TokenError> {
        let iat = now.unix_timestamp();

        let access = Claims {
            sub: user.id.clone(),
            token_type: TokenType::Access,
            iat,
            exp: (now + self.access_ttl).unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            email: Some(user.email.clone()),
            username: Some(user.username.clone()),
            role: Some(user.role),
        };
        let refresh = Claims {
            sub: user.id.clone(),
            token_type: TokenType::Refresh,
            iat,
            exp: (now + self.refresh_ttl).unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            email: None,
            username: None,
            role: None,
        };

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            expires_in: self.access_ttl.whole_seconds().unsigned_abs(),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Pure check of signature, algorithm, expiry and type tag. No I/O.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed,
            }
        })?;

        if data.claims.token_type != expected {
            return Err(TokenError::WrongType);
        }
        Ok(data.claims)
    }
}

fn ttl_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
