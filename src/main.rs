use std::sync::Arc;

use siscom_hazards::alerts::AlertGenerator;
use siscom_hazards::config::AppConfig;
use siscom_hazards::db;
use siscom_hazards::notify::{DispatchPass, ExpoPushGateway, NotificationDispatcher};
use siscom_hazards::orchestrator::{Orchestrator, ALERT_CADENCE, FEED_CADENCE, SEISMIC_CADENCE};
use siscom_hazards::sources::{self, FloodSource, SeismicSource, TsunamiSource, WildfireSource};
use siscom_hazards::store::PgStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Siscom Hazards Service...");

    // Init DB
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;
    info!("Connected to database");

    let store = Arc::new(PgStore::new(pool));
    let client = sources::build_http_client(config.http_timeout_secs)?;

    let seismic = SeismicSource::new(store.clone(), client.clone(), &config.seismic_feed_url);
    let wildfire = WildfireSource::new(store.clone(), client.clone(), &config.wildfire_feed_url);
    let flood = FloodSource::new(
        store.clone(),
        store.clone(),
        client.clone(),
        &config.flood_api_url,
        config.flood_watch_points.clone(),
    );
    let tsunami = TsunamiSource::new(store.clone(), client.clone(), config.tsunami_feed_urls.clone());

    let generator = AlertGenerator::new(store.clone(), store.clone(), store.clone())
        .with_lookback_minutes(config.alert_lookback_minutes)
        .with_radius(config.match_radius());

    let gateway = ExpoPushGateway::new(client, &config.push_gateway_url, config.push_batch_size);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        store.clone(),
        Arc::new(gateway),
    ));

    let mut orchestrator = Orchestrator::new();
    orchestrator
        .register("seismic", SEISMIC_CADENCE, Arc::new(seismic))
        .register("wildfire", FEED_CADENCE, Arc::new(wildfire))
        .register("flood", FEED_CADENCE, Arc::new(flood))
        .register("tsunami", FEED_CADENCE, Arc::new(tsunami))
        .register("alerts", ALERT_CADENCE, Arc::new(generator))
        .register("proximity_push", ALERT_CADENCE, Arc::new(dispatcher.task(DispatchPass::Proximity)))
        .register("geofence", ALERT_CADENCE, Arc::new(dispatcher.task(DispatchPass::Geofence)));

    let handles = orchestrator.start();
    info!("Started {} tasks", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}
