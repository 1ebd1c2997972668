mod api;
mod cache;
mod error;
mod extractor;
mod pipeline;
mod settings;
mod summarizer;
mod validate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::api::Envelope;
use crate::cache::Cache;
use crate::extractor::Extractor;
use crate::pipeline::Pipeline;
use crate::summarizer::Summarizer;

#[derive(Parser)]
#[command(name = "news_summarizer", about = "Fetch, summarize and cache news articles")]
struct Cli {
    /// Settings file (without extension); missing file is fine
    #[arg(short, long, default_value = settings::DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize one URL and print the response envelope
    Summarize {
        url: String,
    },
    /// Serve the summarize endpoint over HTTP
    Serve {
        /// Listen address (default: server.addr from settings)
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Show cache statistics
    Stats,
    /// Delete cache entries past their hard expiry
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = settings::load(&cli.config)?;
    info!(settings = ?settings, "Settings loaded");

    let cache = Cache::open(&settings.db_path)?;

    let result = match cli.command {
        Commands::Summarize { url } => {
            let pipeline = build_pipeline(cache, &settings)?;
            let result = pipeline.run(Some(&url)).await;
            let (status, envelope) = Envelope::from_result(&result);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if status != 200 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| settings.server.addr.clone());
            let purged = cache.purge_expired(chrono::Utc::now())?;
            if purged > 0 {
                info!("Purged {} expired cache entries", purged);
            }
            let pipeline = Arc::new(build_pipeline(cache, &settings)?);
            api::serve(pipeline, &addr).await
        }
        Commands::Stats => {
            let s = cache.stats(chrono::Utc::now())?;
            println!("Total:   {}", s.total);
            println!("Fresh:   {}", s.fresh);
            println!("Stale:   {}", s.stale);
            println!("Expired: {}", s.expired);
            Ok(())
        }
        Commands::Purge => {
            let removed = cache.purge_expired(chrono::Utc::now())?;
            println!("Removed {} expired entries.", removed);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// One HTTP client shared by the extractor and summarizer.
fn build_pipeline(cache: Cache, settings: &settings::Settings) -> anyhow::Result<Pipeline> {
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let extractor = Extractor::new(
        client.clone(),
        settings.fetch.user_agent.clone(),
        Duration::from_secs(settings.fetch.timeout_secs),
    );
    let summarizer = Summarizer::new(client, settings.summary.clone());
    Ok(Pipeline::new(cache, extractor, summarizer))
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
