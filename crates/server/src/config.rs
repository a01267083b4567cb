use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Upper bound for authorization code lifetime.
pub const MAX_AUTHORIZATION_CODE_TTL_SECS: u64 = 600;
const MIN_JWT_SECRET_LEN: usize = 32;
/// Ten years; keeps timestamp arithmetic in range.
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    /// HMAC signing secret. Required, no default.
    pub secret: String,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_secs: u64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    #[serde(default = "default_authorization_code_ttl")]
    pub authorization_code_ttl_secs: u64,
    #[serde(default = "default_oauth2_access_token_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_secs: u64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            authorization_code_ttl_secs: default_authorization_code_ttl(),
            access_token_ttl_secs: default_oauth2_access_token_ttl(),
            refresh_token_ttl_secs: default_refresh_token_ttl(),
        }
    }
}

/// Argon2id work factor.
#[derive(Clone, Debug, Deserialize)]
pub struct PasswordConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReclaimerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reclaim_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reclaim_interval(),
            grace_period_secs: default_grace_period(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Caps the pool shared by request handlers and the reclaimer.
    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    #[serde(default)]
    pub password: PasswordConfig,
    #[serde(default)]
    pub reclaimer: ReclaimerConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Validation(format!(
                "jwt.secret must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }

        let ttls = [
            ("jwt.access_token_ttl_secs", self.jwt.access_token_ttl_secs),
            ("jwt.refresh_token_ttl_secs", self.jwt.refresh_token_ttl_secs),
            (
                "oauth2.authorization_code_ttl_secs",
                self.oauth2.authorization_code_ttl_secs,
            ),
            ("oauth2.access_token_ttl_secs", self.oauth2.access_token_ttl_secs),
            (
                "oauth2.refresh_token_ttl_secs",
                self.oauth2.refresh_token_ttl_secs,
            ),
            ("request_timeout_secs", self.request_timeout_secs),
            ("reclaimer.interval_secs", self.reclaimer.interval_secs),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Validation(format!("{name} must be > 0")));
        }
        let grace = ("reclaimer.grace_period_secs", self.reclaimer.grace_period_secs);
        if let Some((name, _)) = ttls
            .iter()
            .chain(std::iter::once(&grace))
            .find(|(_, v)| *v > MAX_DURATION_SECS)
        {
            return Err(ConfigError::Validation(format!(
                "{name} must be <= {MAX_DURATION_SECS}"
            )));
        }

        if self.oauth2.authorization_code_ttl_secs > MAX_AUTHORIZATION_CODE_TTL_SECS {
            return Err(ConfigError::Validation(format!(
                "oauth2.authorization_code_ttl_secs must be <= {MAX_AUTHORIZATION_CODE_TTL_SECS}"
            )));
        }

        if self.max_db_connections == 0 {
            return Err(ConfigError::Validation(
                "max_db_connections must be > 0".into(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "events.channel_capacity must be > 0".into(),
            ));
        }

        argon2::Params::new(
            self.password.memory_kib,
            self.password.iterations,
            self.password.parallelism,
            None,
        )
        .map_err(|e| ConfigError::Validation(format!("password parameters rejected: {e}")))?;

        Ok(())
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".into()
}
fn default_max_db_connections() -> u32 {
    20
}
fn default_request_timeout() -> u64 {
    10
}
fn default_access_token_ttl() -> u64 {
    900
}
fn default_refresh_token_ttl() -> u64 {
    7 * 24 * 60 * 60
}
fn default_authorization_code_ttl() -> u64 {
    MAX_AUTHORIZATION_CODE_TTL_SECS
}
fn default_oauth2_access_token_ttl() -> u64 {
    3600
}
fn default_memory_kib() -> u32 {
    65536
}
fn default_iterations() -> u32 {
    3
}
fn default_parallelism() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_reclaim_interval() -> u64 {
    3600
}
fn default_grace_period() -> u64 {
    24 * 60 * 60
}
fn default_channel_capacity() -> usize {
    1024
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// The file is optional. Any environment variable matching the key path
/// separated by double underscores (e.g. `JWT__SECRET`, `RECLAIMER__ENABLED`)
/// overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}
