use color_eyre::eyre::WrapErr;
use commerce_auth::AppResources;
use commerce_auth::api::start_webserver;
use commerce_auth::config::load_config;
use commerce_auth::events::{ChannelEventPublisher, spawn_event_log_sink};
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "commerce_auth=info,sea_orm=warn,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    initialize_standard_tracing();

    // A missing or short signing secret is fatal here
    let config = Arc::new(load_config().wrap_err("Failed to load configuration")?);

    let mut options = ConnectOptions::new(config.database_url.clone());
    options
        .max_connections(config.max_db_connections)
        .sqlx_logging(false);
    let db = Arc::new(
        Database::connect(options)
            .await
            .wrap_err("Failed to connect to database")?,
    );

    let (publisher, events) = ChannelEventPublisher::new(config.events.channel_capacity);
    spawn_event_log_sink(events);

    let resources = AppResources::new(db, config.clone(), Arc::new(publisher))
        .wrap_err("Failed to initialise password hasher")?;

    tracing::info!(
        enabled = config.reclaimer.enabled,
        interval_secs = config.reclaimer.interval_secs,
        grace_period_secs = config.reclaimer.grace_period_secs,
        "expiry reclaimer configuration"
    );
    if config.reclaimer.enabled {
        resources
            .reclaimer
            .clone()
            .spawn(Duration::from_secs(config.reclaimer.interval_secs));
    }

    start_webserver(resources).await?;
    Ok(())
}
