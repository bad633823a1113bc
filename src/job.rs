use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::browser::BrowserManager;
use crate::catalog::CatalogStore;
use crate::config::AppConfig;
use crate::engine::{LaunchSettings, RenderingEngine};
use crate::extractor::{ExtractionResult, PriceExtractor};
use crate::models::{ItemUpdate, RunReport, TrackedItem};
use crate::notifier::{AlertMessage, Notifier};
use crate::session::PageSession;
use crate::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    FetchingCatalog,
    /// `index` is 1-based.
    Processing { index: usize, total: usize },
    Summarizing,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Pause between two items. Not applied after the last one.
    pub pacing: Duration,
    pub send_timeout: Duration,
    pub currency_symbol: String,
}

impl RunnerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pacing: config.scraper.pacing_delay(),
            send_timeout: config.notifications.send_timeout(),
            currency_symbol: config.notifications.currency_symbol.clone(),
        }
    }
}

/// One pass over the catalog: check every item, alert on drops, write back.
pub struct JobRunner<E: RenderingEngine> {
    catalog: Arc<dyn CatalogStore>,
    notifier: Arc<dyn Notifier>,
    browsers: BrowserManager<E>,
    session: PageSession,
    options: RunnerOptions,
    phase: RwLock<RunPhase>,
}

impl<E: RenderingEngine> JobRunner<E> {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        notifier: Arc<dyn Notifier>,
        browsers: BrowserManager<E>,
        session: PageSession,
        options: RunnerOptions,
    ) -> Self {
        Self {
            catalog,
            notifier,
            browsers,
            session,
            options,
            phase: RwLock::new(RunPhase::Idle),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        engine: Arc<E>,
        catalog: Arc<dyn CatalogStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let browsers = BrowserManager::new(
            engine,
            LaunchSettings::from_config(&config.scraper),
            Duration::from_millis(config.scraper.launch_retry_delay_ms),
        );
        let session = PageSession::new(&config.scraper, PriceExtractor::default());

        Self::new(catalog, notifier, browsers, session, RunnerOptions::from_config(config))
    }

    pub async fn phase(&self) -> RunPhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: RunPhase) {
        *self.phase.write().await = phase;
    }

    /// Checks every tracked item once.
    ///
    /// Per-item failures end up in the report. An unreachable catalog or a
    /// browser that cannot be launched aborts the run with an error instead.
    pub async fn run_once(&self) -> Result<RunReport> {
        let mut report = RunReport::start();
        metrics::counter!("pricedrop_runs_total").increment(1);
        tracing::info!(run_id = %report.run_id, "Price check run started");

        self.set_phase(RunPhase::FetchingCatalog).await;
        let items = match self.catalog.list_all().await {
            Ok(items) => items,
            Err(e) => {
                self.set_phase(RunPhase::Idle).await;
                let e = match e {
                    AppError::CatalogUnavailable(_) => e,
                    other => AppError::CatalogUnavailable(other.to_string()),
                };
                tracing::error!(run_id = %report.run_id, error = %e, "Failed to load catalog, aborting run");
                return Err(e);
            }
        };

        report.total_items = items.len();
        if items.is_empty() {
            tracing::info!(run_id = %report.run_id, "No products to check");
            report.finish();
            self.set_phase(RunPhase::Idle).await;
            return Ok(report);
        }

        tracing::info!(run_id = %report.run_id, total = items.len(), "Checking products");

        let mut browser: Option<E::Browser> = None;
        let outcome = self.process_items(&items, &mut browser, &mut report).await;

        if let Some(browser) = browser.take() {
            self.browsers.close_browser(browser).await;
        }

        self.set_phase(RunPhase::Summarizing).await;
        report.finish();
        record_metrics(&report);

        let result = match outcome {
            Ok(()) => {
                tracing::info!(
                    run_id = %report.run_id,
                    processed = report.processed,
                    failed = report.failed,
                    notifications_sent = report.notifications_sent,
                    duration_secs = report.duration_secs(),
                    "Job summary: {} products processed, {} emails sent",
                    report.processed,
                    report.notifications_sent
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    run_id = %report.run_id,
                    processed = report.processed,
                    error = %e,
                    "Run aborted"
                );
                Err(e)
            }
        };

        self.set_phase(RunPhase::Idle).await;
        result
    }

    async fn process_items(
        &self,
        items: &[TrackedItem],
        browser: &mut Option<E::Browser>,
        report: &mut RunReport,
    ) -> Result<()> {
        let total = items.len();

        for (position, item) in items.iter().enumerate() {
            self.set_phase(RunPhase::Processing {
                index: position + 1,
                total,
            })
            .await;

            let handle = self.browsers.ensure_browser(browser.take()).await?;
            tracing::debug!(item_id = %item.id, url = %item.url, "Processing item");

            let fetched = self
                .session
                .fetch_product(self.browsers.engine(), &handle, &item.url)
                .await;
            *browser = Some(handle);

            match fetched {
                Ok(result) => self.complete_item(item, result, report, position + 1, total).await,
                Err(e) => {
                    tracing::warn!(item_id = %item.id, url = %item.url, error = %e, "Failed to process product");
                    report.record_failure(&item.id, &item.url, &e);
                }
            }

            if position + 1 < total && !self.options.pacing.is_zero() {
                tokio::time::sleep(self.options.pacing).await;
            }
        }

        Ok(())
    }

    async fn complete_item(
        &self,
        item: &TrackedItem,
        result: ExtractionResult,
        report: &mut RunReport,
        index: usize,
        total: usize,
    ) {
        let price = result.price;
        let title = match result.title {
            Some(title) => title,
            None => {
                let fallback = item.fallback_title();
                tracing::warn!(item_id = %item.id, url = %item.url, fallback = %fallback, "No title found on page");
                fallback
            }
        };

        if item.is_price_drop(price) {
            self.notify(item, &title, price, report).await;
        }

        let update = ItemUpdate {
            price,
            title,
            checked_at: Utc::now(),
        };

        match self.catalog.update(&item.id, &update).await {
            Ok(()) => {
                report.processed += 1;
                tracing::info!(
                    item_id = %item.id,
                    price = %update.price,
                    "Processed {}/{}: {}",
                    index,
                    total,
                    update.title
                );
            }
            Err(e) => {
                tracing::error!(item_id = %item.id, url = %item.url, error = %e, "Failed to save product");
                report.record_failure(&item.id, &item.url, &e);
            }
        }
    }

    async fn notify(&self, item: &TrackedItem, title: &str, price: rust_decimal::Decimal, report: &mut RunReport) {
        let message = AlertMessage::price_drop(item, title, price, &self.options.currency_symbol);

        match tokio::time::timeout(self.options.send_timeout, self.notifier.send(&message)).await {
            Ok(Ok(())) => {
                report.notifications_sent += 1;
                tracing::info!(item_id = %item.id, to = %message.to, "Price drop notification sent for {}", title);
            }
            Ok(Err(e)) => {
                report.notification_failures += 1;
                tracing::warn!(item_id = %item.id, to = %message.to, error = %e, "Failed to send notification");
            }
            Err(_) => {
                report.notification_failures += 1;
                tracing::warn!(
                    item_id = %item.id,
                    to = %message.to,
                    timeout_secs = self.options.send_timeout.as_secs(),
                    "Notification timed out"
                );
            }
        }
    }
}

fn record_metrics(report: &RunReport) {
    metrics::counter!("pricedrop_items_processed_total").increment(report.processed as u64);
    metrics::counter!("pricedrop_items_failed_total").increment(report.failed as u64);
    metrics::counter!("pricedrop_notifications_sent_total").increment(report.notifications_sent as u64);
    metrics::histogram!("pricedrop_run_duration_seconds").record(report.duration_secs());
}
