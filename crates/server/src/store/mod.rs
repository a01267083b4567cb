//! Storage contracts consumed by the auth orchestrator, the grant manager and
//! the expiry reclaimer, plus their sea-orm implementations.
//!
//! Every method is a future; dropping it (request deadline, client
//! disconnect) cancels the in-flight statement, and an uncommitted
//! transaction rolls back when dropped.

use crate::entity::{
    oauth2_access_token, oauth2_authorization, oauth2_client, oauth2_refresh_token, user,
};
use crate::error::StoreError;
use async_trait::async_trait;
use time::OffsetDateTime;

pub mod client;
pub mod grant;
pub mod user_store;

pub use client::DbClientStore;
pub use grant::DbGrantStore;
pub use user_store::DbUserStore;

/// Credential store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user. A clash on `email` or `username` surfaces as
    /// [`StoreError::UniqueViolation`].
    async fn create(&self, user: user::Model) -> Result<user::Model, StoreError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<user::Model>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError>;
    async fn get_by_username(&self, username: &str) -> Result<Option<user::Model>, StoreError>;
    /// Overwrites every column of an existing user.
    async fn update(&self, user: user::Model) -> Result<user::Model, StoreError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Registered OAuth2 clients. Read-only.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get_client(&self, client_id: &str)
    -> Result<Option<oauth2_client::Model>, StoreError>;
}

/// An access/refresh pair minted together.
#[derive(Clone, Debug)]
pub struct IssuedGrant {
    pub access: oauth2_access_token::Model,
    pub refresh: oauth2_refresh_token::Model,
}

/// Rows removed by one expiry sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpiredCounts {
    pub authorization_codes: u64,
    pub access_tokens: u64,
    pub refresh_tokens: u64,
}

impl ExpiredCounts {
    pub fn total(&self) -> u64 {
        self.authorization_codes + self.access_tokens + self.refresh_tokens
    }
}

/// Authorization codes and stateful OAuth2 tokens.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn create_authorization_code(
        &self,
        code: oauth2_authorization::Model,
    ) -> Result<(), StoreError>;

    /// Looks up a code that is still live at `now`.
    async fn find_authorization_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<Option<oauth2_authorization::Model>, StoreError>;

    /// Deletes the code and inserts the token pair in one transaction.
    /// Returns `false` (and writes nothing) when the code was already gone.
    async fn redeem_authorization_code(
        &self,
        code: &str,
        grant: IssuedGrant,
    ) -> Result<bool, StoreError>;

    async fn find_access_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<oauth2_access_token::Model>, StoreError>;

    async fn find_refresh_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<oauth2_refresh_token::Model>, StoreError>;

    /// Replaces the refresh row `refresh_id` and its linked access row with a
    /// new pair in one transaction. Returns `false` when the old row was gone.
    async fn rotate_refresh_token(
        &self,
        refresh_id: &str,
        grant: IssuedGrant,
    ) -> Result<bool, StoreError>;

    /// Deletes the access row and its linked refresh row together.
    async fn revoke_access_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Deletes the refresh row and its linked access row together.
    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Deletes every code and token with `expires_at < cutoff` in one transaction.
    async fn delete_expired(&self, cutoff: OffsetDateTime) -> Result<ExpiredCounts, StoreError>;
}

/// Current UTC time at whole-second precision.
///
/// Grant timestamps are created and compared at this precision so SQLite's
/// textual timestamps order the same way PostgreSQL's native ones do.
pub fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}
