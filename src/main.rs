//! magdec - Look up magnetic declination for coordinates
//!
//! A small command-line front end for the declination lookup pipeline. All
//! lookups print a value: the fetched or cached declination, or the
//! configured fallback when the lookup yields nothing.

use chrono::Utc;
use clap::Parser;
use futures::future::join_all;

use magdec::breaker::read_snapshot;
use magdec::cli::{Cli, Command};
use magdec::{resolve_declination, BreakerPhase, DeclinationClient, DeclinationConfig, GeoCache};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "magdec=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = DeclinationConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Lookup { coordinates, api_key } => {
            if let Some(key) = api_key {
                config.api_key = key;
            }
            if config.api_key.trim().is_empty() {
                tracing::warn!("no API key configured, using fallback declination");
            }

            let client = DeclinationClient::from_config(&config)?;
            let now = Utc::now();
            let results = join_all(
                coordinates
                    .iter()
                    .map(|coord| client.lookup(coord.lat, coord.lon, &config.api_key, now)),
            )
            .await;

            for (coord, result) in coordinates.iter().zip(results) {
                let source = if result.is_some() { "lookup" } else { "fallback" };
                let value = resolve_declination(result, config.fallback_declination);
                println!("{}\t{:.4}\t{}", coord, value, source);
            }
        }
        Command::Status => {
            let path = config.resolved_breaker_state_file();
            let snapshot = read_snapshot(&path)?.unwrap_or_default();
            println!("state file: {}", path.display());
            println!("phase: {}", snapshot.phase);
            println!(
                "consecutive transient failures: {}",
                snapshot.consecutive_transient_failures
            );
            if snapshot.phase == BreakerPhase::Open {
                if let Some(until) = snapshot.open_until(config.breaker_config().cooldown) {
                    println!("breaker OPEN until {}", until.to_rfc3339());
                }
            }
        }
        Command::CachePath { coordinate } => {
            let cache = GeoCache::with_dir(config.resolved_cache_dir());
            println!("{}", cache.entry_path(&coordinate).display());
        }
    }

    Ok(())
}
