//! Authentication and token lifecycle engine for a multi-tenant commerce platform.
//!
//! Password registration and login with stateless JWT access/refresh tokens,
//! an OAuth2 authorization-code grant backed by revocable stored tokens, and a
//! background reclaimer for expired grants.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::auth::{AuthService, PasswordHasher, TokenSigner, password::HashingError};
use crate::config::AppConfig;
use crate::events::EventPublisher;
use crate::oauth2::{GrantLifetimes, GrantManager};
use crate::reclaimer::ExpiryReclaimer;
use crate::store::{DbClientStore, DbGrantStore, DbUserStore};

pub mod api;
pub mod auth;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod oauth2;
pub mod reclaimer;
pub mod store;

#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub oauth2: Arc<GrantManager>,
    pub reclaimer: Arc<ExpiryReclaimer>,
}

impl AppResources {
    /// Wires the sea-orm stores into the services.
    ///
    /// Fails only when the configured Argon2 parameters are rejected.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, HashingError> {
        let deadline = config.request_timeout();
        let grants = Arc::new(DbGrantStore::new(db.clone()));
        let users = Arc::new(DbUserStore::new(db.clone()));

        let auth = AuthService::new(
            users.clone(),
            PasswordHasher::new(&config.password)?,
            TokenSigner::new(&config.jwt),
            events,
            deadline,
        );
        let oauth2 = GrantManager::new(
            Arc::new(DbClientStore::new(db.clone())),
            grants.clone(),
            users,
            GrantLifetimes::from(&config.oauth2),
            deadline,
        );
        let grace = time::Duration::seconds(
            i64::try_from(config.reclaimer.grace_period_secs).unwrap_or(i64::MAX),
        );
        let reclaimer = ExpiryReclaimer::new(grants, grace);

        Ok(Self {
            db,
            config,
            auth: Arc::new(auth),
            oauth2: Arc::new(oauth2),
            reclaimer: Arc::new(reclaimer),
        })
    }
}
