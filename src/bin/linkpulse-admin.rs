use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use linkpulse::analytics::{open_analytics_store, AnalyticsRepository};
use linkpulse::config::{AnalyticsServiceConfig, CacheConfig, Config};
use linkpulse::rpc::DisabledRecorder;
use linkpulse::shortener::ShortenerService;
use linkpulse::storage::{open_url_store, UrlRepository};
use linkpulse::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "linkpulse-admin")]
#[command(about = "LinkPulse management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all short links
    List,
    /// Shorten a URL without going through the HTTP API
    Shorten {
        /// Absolute http(s) URL
        url: String,
    },
    /// Delete a short link
    Delete {
        /// 8-character short code
        code: String,
    },
    /// Show the click history of a short link
    Analytics {
        /// 8-character short code
        code: String,
        /// Print only the aggregated counts
        #[arg(long)]
        summary: bool,
    },
}

async fn shortener() -> Result<ShortenerService> {
    let config = Config::from_env()?;
    let store = open_url_store(&config.database)
        .await
        .context("failed to open URL store")?;
    let cache = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };

    // Clicks are not reported from the CLI
    Ok(ShortenerService::new(
        Arc::new(UrlRepository::new(store, &cache)),
        Arc::new(DisabledRecorder),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&linkpulse::config::LogConfig {
        level: "warn".to_string(),
        ..Default::default()
    });

    match cli.command {
        Commands::List => {
            let records = shortener().await?.list().await?;
            if records.is_empty() {
                println!("No short links found.");
            } else {
                println!("{:<10} {:<26} {}", "Code", "Created", "Target");
                println!("{}", "-".repeat(80));
                for record in records {
                    println!(
                        "{:<10} {:<26} {}",
                        record.short_code,
                        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        record.target_url
                    );
                }
            }
        }
        Commands::Shorten { url } => {
            let record = shortener().await?.shorten(&url).await?;
            println!("✓ {} -> {}", record.short_code, record.target_url);
        }
        Commands::Delete { code } => {
            shortener().await?.delete(&code).await?;
            println!("✓ Deleted short link '{}'", code);
        }
        Commands::Analytics { code, summary } => {
            let config = AnalyticsServiceConfig::from_env()?;
            let store = open_analytics_store(&config.database)
                .await
                .context("failed to open analytics store")?;
            let repo = AnalyticsRepository::new(store);

            if summary {
                match repo.summary(&code).await? {
                    Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                    None => println!("⚠ No analytics entry for short link '{}'", code),
                }
            } else {
                match repo.get(&code).await? {
                    Some(record) => {
                        println!("Short link: {}", record.short_link);
                        println!("Last click: {}", record.updated_at);
                        println!("{:<40} {:<20} {:<8} {}", "IP", "City", "Country", "Time");
                        println!("{}", "-".repeat(90));
                        for click in record.clicks {
                            println!(
                                "{:<40} {:<20} {:<8} {}",
                                click.ip, click.city, click.country, click.created_at
                            );
                        }
                    }
                    None => println!("⚠ No analytics entry for short link '{}'", code),
                }
            }
        }
    }

    Ok(())
}
