use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use pricedrop_watcher::browser::BrowserManager;
use pricedrop_watcher::catalog::{CatalogStore, SqliteCatalog};
use pricedrop_watcher::chrome::ChromeEngine;
use pricedrop_watcher::config::{AppConfig, DatabaseConfig, MetricsConfig};
use pricedrop_watcher::engine::LaunchSettings;
use pricedrop_watcher::extractor::PriceExtractor;
use pricedrop_watcher::job::JobRunner;
use pricedrop_watcher::models::NewTrackedItem;
use pricedrop_watcher::notifier::EmailNotifier;
use pricedrop_watcher::scheduler::PriceCheckScheduler;
use pricedrop_watcher::session::PageSession;
use pricedrop_watcher::utils::logging::init_tracing;
use pricedrop_watcher::utils::shutdown::ShutdownSignal;

#[derive(Parser)]
#[command(name = "pricedrop-watcher")]
#[command(about = "Watches product pages and emails owners when prices drop")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until Ctrl-C or SIGTERM (default)
    Serve,

    /// Check the whole catalog once and print the run report as JSON
    RunOnce,

    /// Add a product to the catalog
    Track {
        #[arg(long)]
        url: String,
        /// Target price; an alert is sent at or below it
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        email: String,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Fetch one product page and print what was extracted
    Probe { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::RunOnce => run_once(config).await,
        Commands::Track {
            url,
            price,
            email,
            user_id,
            name,
        } => track(config, url, price, email, user_id, name).await,
        Commands::Probe { url } => probe(config, url).await,
    }
}

async fn open_catalog(config: &DatabaseConfig) -> Result<Arc<SqliteCatalog>> {
    if let Some(path) = sqlite_file(&config.url) {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
    }

    Ok(Arc::new(SqliteCatalog::connect(config).await?))
}

/// File path part of a `sqlite://` URL, if it points at a file.
fn sqlite_file(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

fn install_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config.listen_address.parse()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

async fn build_runner(config: &AppConfig) -> Result<Arc<JobRunner<ChromeEngine>>> {
    let catalog: Arc<dyn CatalogStore> = open_catalog(&config.database).await?;
    let notifier = Arc::new(EmailNotifier::new(&config.notifications.smtp)?);
    let engine = Arc::new(ChromeEngine::new(config.scraper.liveness_timeout()));

    Ok(Arc::new(JobRunner::from_config(config, engine, catalog, notifier)))
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting Price Drop Watcher...");
    install_metrics(&config.metrics)?;

    let mut signal = ShutdownSignal::install()?;
    let runner = build_runner(&config).await?;
    let mut scheduler = PriceCheckScheduler::new(runner, config.scheduler.clone()).await?;
    scheduler.start().await?;

    let received = signal.recv().await?;
    info!("Received {}, shutting down...", received);
    scheduler.shutdown().await?;

    Ok(())
}

async fn run_once(config: AppConfig) -> Result<()> {
    install_metrics(&config.metrics)?;

    let runner = build_runner(&config).await?;
    let report = runner.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn track(
    config: AppConfig,
    url: String,
    price: Decimal,
    email: String,
    user_id: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let catalog = open_catalog(&config.database).await?;
    let item = catalog
        .insert(NewTrackedItem {
            url,
            name,
            desired_price: price,
            user_id,
            user_email: Some(email),
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&item)?);
    catalog.close().await;
    Ok(())
}

async fn probe(config: AppConfig, url: String) -> Result<()> {
    let engine = Arc::new(ChromeEngine::new(config.scraper.liveness_timeout()));
    let browsers = BrowserManager::new(
        Arc::clone(&engine),
        LaunchSettings::from_config(&config.scraper),
        std::time::Duration::from_millis(config.scraper.launch_retry_delay_ms),
    );
    let session = PageSession::new(&config.scraper, PriceExtractor::default());

    let browser = browsers.ensure_browser(None).await?;
    let outcome = session.fetch_product(engine.as_ref(), &browser, &url).await;
    browsers.close_browser(browser).await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
