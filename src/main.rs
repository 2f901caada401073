use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use ioc_crawler::app::CrawlUseCase;
use ioc_crawler::config::Config;
use ioc_crawler::logging;
use ioc_crawler::observability::metrics;
use ioc_crawler::pipeline::CrawlSummary;

#[derive(Parser)]
#[command(name = "ioc_crawler")]
#[command(about = "OTX pulse and indicator crawler")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the subscribed pulse feed, store new documents and publish them
    Subscribed {
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep documents in memory and only log publications
        #[arg(long)]
        dry_run: bool,
    },
    /// Report how many feed pages a crawl would visit
    Pages {
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn print_summary(summary: &CrawlSummary) {
    println!("\n📊 Crawl results:");
    println!("   Pages: {}/{}", summary.pages_processed, summary.total_pages);
    println!("   Pulses: {}", summary.pulses);
    println!("   Indicators: {} ({} rejected)", summary.indicators, summary.rejected_indicators);
    println!("   Published batches: {}", summary.units.published);
    println!("   Skipped batches: {}", summary.units.skipped);
    println!("   Documents written: {}", summary.units.documents_written);
    if summary.units.write_failed + summary.units.publish_failed > 0 {
        println!(
            "   ⚠️  Write failures: {}, publish failures: {}",
            summary.units.write_failed, summary.units.publish_failed
        );
    }
    println!("   Duration: {:.2}s", summary.duration_secs);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();
    metrics::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Subscribed { config, dry_run } => {
            let config = Config::load(config.as_deref()).context("loading configuration")?;
            let use_case = CrawlUseCase::from_config(&config, dry_run)
                .context("building crawl adapters")?;

            println!("🔄 Crawling subscribed pulses...");
            info!(dry_run, "Starting subscribed crawl");
            let summary = use_case.crawl().await;
            print_summary(&summary);

            if let Some(err) = &summary.error {
                error!("Crawl failed: {}", err);
                anyhow::bail!("crawl failed: {}", err);
            }
            println!("✅ Crawl completed");
        }
        Commands::Pages { config } => {
            let config = Config::load(config.as_deref()).context("loading configuration")?;
            let use_case = CrawlUseCase::from_config(&config, true)
                .context("building crawl adapters")?;
            let pages = use_case.count_pages().await;
            println!("📄 {} pages of {} pulses", pages, use_case.settings().page_size);
        }
    }

    Ok(())
}
