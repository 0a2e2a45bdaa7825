mod config;
mod io_limits;

use std::sync::Arc;

use anyhow::Context;
use citadel_directory::CitadelDirectory;
use config::Config;
use esi::EsiClient;
use location_cache::LocationCache;
use market_types::MarketTypeDirectory;
use publisher::Publisher;
use region_directory::RegionDirectory;
use scheduler::Scheduler;
use scraper_core::Scraper;
use tracing::info;
use tracing_subscriber::EnvFilter;

const UPLOADER_NAME: &str = "market-streamer";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let max_connections = io_limits::init_io();

    let client = Arc::new(EsiClient::new(UPLOADER_NAME, std::env::consts::OS, max_connections));
    client
        .load_auth_tok(&config.refresh_token, &config.client_id, &config.secret_key)
        .await
        .context("bootstrapping OAuth access token")?;

    let locations = Arc::new(LocationCache::new(config.location_service_url.clone()));
    let regions = Arc::new(RegionDirectory::new(client.clone()).await);
    let citadels = Arc::new(CitadelDirectory::new(client.clone(), locations.clone()).await);
    let market_types = Arc::new(MarketTypeDirectory::new(client.clone()).await);

    let scraper = Arc::new(Scraper::new(
        client.clone(),
        locations.clone(),
        citadels.clone(),
        market_types.clone(),
        UPLOADER_NAME,
    ));

    // A bind failure here is fatal at startup, per the exit-code contract.
    let publisher = Arc::new(Publisher::bind(&config.zmq_bind_endpoint).context("binding publish socket")?);

    tokio::spawn(regions.clone().run_refresh_loop());
    tokio::spawn(citadels.clone().run_refresh_loop());
    tokio::spawn(citadels.clone().run_blacklist_wipe_loop());
    tokio::spawn(market_types.clone().run_refresh_loop());

    let scheduler = Arc::new(Scheduler::new(regions, scraper, publisher));

    info!("market-streamer started");
    scheduler.run().await;

    Ok(())
}
