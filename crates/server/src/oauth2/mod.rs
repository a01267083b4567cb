//! OAuth2 authorization-code grant.
//!
//! ## Supported Flows
//!
//! - Authorization Code
//! - Refresh Token (rotating)
//!
//! ## Endpoints
//!
//! - `GET /oauth2/authorize` - Authorization endpoint
//! - `POST /oauth2/token` - Token endpoint
//! - `POST /oauth2/revoke` - Token revocation
//! - `POST /oauth2/introspect` - Token introspection

pub mod endpoints;
pub mod grant;

pub use endpoints::router;
pub use grant::{GrantLifetimes, GrantManager, Introspection, OAuthTokens, generate_token};

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
