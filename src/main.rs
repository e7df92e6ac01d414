//! Wayfarer - travel photos, country basics and weather from the command line
//!
//! Prints JSON on stdout. Logs go to stderr and are controlled with `RUST_LOG`.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wayfarer::cache::{Sweeper, TtlCache, DEFAULT_SWEEP_INTERVAL};
use wayfarer::cli::{Cli, Command, PhotoArgs};
use wayfarer::config::Config;
use wayfarer::geo::GeoService;
use wayfarer::media::MediaOrchestrator;
use wayfarer::weather::WeatherService;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wayfarer=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env();

    let cache = Arc::new(TtlCache::new());
    let sweeper = Sweeper::spawn(&cache, DEFAULT_SWEEP_INTERVAL);

    let result = run(cli.command, &config, cache).await;
    sweeper.shutdown().await;

    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    result
}

async fn run(
    command: Command,
    config: &Config,
    cache: Arc<TtlCache>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Weather(args) => {
            let options = args.options()?;
            let service = WeatherService::new(&config.weather, cache);
            let response = service.get_by_lat_lng(args.lat, args.lng, &options).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Geo(args) => {
            let service = GeoService::new(&config.geo, cache);
            let response = service.get_basics(&args.params()).await?;
            if response.is_none() {
                tracing::info!("No country matched");
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Photo(args) => photo(&args, config).await?,
    }
    Ok(())
}

async fn photo(args: &PhotoArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let request = args.request()?;
    let orchestrator = MediaOrchestrator::from_config(config);
    tracing::debug!(providers = ?orchestrator.enabled_providers(), "Enabled image providers");

    let asset = match &args.location_id {
        Some(location_id) => orchestrator.primary_location_photo(location_id, &request).await?,
        None => orchestrator.fetch(&request).await?,
    };

    if let Some(out) = &args.out {
        std::fs::write(out, &asset.image.buffer)?;
        tracing::info!(path = %out.display(), bytes = asset.image.buffer.len(), "Wrote image");
    }

    let summary = serde_json::json!({
        "attribution": asset.attribution,
        "meta": asset.image.meta,
        "content_type": asset.image.content_type,
        "bytes": asset.image.buffer.len(),
        "cache_hit": asset.cache_hit,
        "out": args.out,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
