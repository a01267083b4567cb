//! Shared fixtures: a migrated in-memory SQLite database, a cheap test
//! configuration and a seeded OAuth2 client.

#![allow(dead_code)]

use commerce_auth::AppResources;
use commerce_auth::config::{
    AppConfig, EventsConfig, JwtConfig, OAuth2Config, PasswordConfig, ReclaimerConfig,
};
use commerce_auth::entity::{oauth2_client, user};
use commerce_auth::events::{AuthEvent, EventPublisher, NoopEventPublisher};
use commerce_auth::store::now_utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::sync::{Arc, Mutex};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub const CLIENT_ID: &str = "shop-app";
pub const CLIENT_SECRET: &str = "shop-app-secret";
pub const REDIRECT_URI: &str = "https://shop.example/callback";
pub const CLIENT_SCOPES: &str = "orders:read orders:write profile";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        max_db_connections: 1,
        request_timeout_secs: 5,
        jwt: JwtConfig {
            secret: TEST_SECRET.into(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
        },
        oauth2: OAuth2Config::default(),
        // Keeps hashing fast; production defaults are far stronger.
        password: PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        reclaimer: ReclaimerConfig::default(),
        events: EventsConfig::default(),
    }
}

/// One pooled connection, so every query sees the same in-memory database.
pub async fn test_db() -> Arc<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("connect");
    Migrator::up(&db, None).await.expect("run migrations");
    Arc::new(db)
}

pub async fn test_resources() -> AppResources {
    test_resources_with(Arc::new(NoopEventPublisher)).await
}

pub async fn test_resources_with(events: Arc<dyn EventPublisher>) -> AppResources {
    let db = test_db().await;
    let resources =
        AppResources::new(db, Arc::new(test_config()), events).expect("build resources");
    seed_client(&resources, "authorization_code refresh_token").await;
    resources
}

pub async fn seed_client(resources: &AppResources, grant_types: &str) {
    seed_client_with_id(resources, CLIENT_ID, grant_types).await;
}

pub async fn seed_client_with_id(resources: &AppResources, id: &str, grant_types: &str) {
    let now = now_utc();
    oauth2_client::ActiveModel {
        id: Set(id.to_string()),
        secret: Set(CLIENT_SECRET.to_string()),
        name: Set("Shop storefront".to_string()),
        redirect_uris: Set(serde_json::json!([REDIRECT_URI]).to_string()),
        grant_types: Set(grant_types.to_string()),
        scopes: Set(CLIENT_SCOPES.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed client");
}

/// Inserts an active customer directly, for grant tests that do not go
/// through registration.
pub async fn seed_user(resources: &AppResources, id: &str) {
    let now = now_utc();
    user::ActiveModel {
        id: Set(id.to_string()),
        email: Set(format!("{id}@example.com")),
        username: Set(id.replace('-', "_")),
        password_hash: Set("$argon2id$v=19$m=1024,t=1,p=1$c2VlZA$c2VlZA".to_string()),
        first_name: Set(None),
        last_name: Set(None),
        role: Set(user::Role::Customer),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed user");
}

/// Collects every published event.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<AuthEvent>>,
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: AuthEvent) {
        self.events.lock().unwrap().push(event);
    }
}
