// Shared helpers for the integration tests

pub mod catalog_tests;
pub mod extraction_tests;
pub mod run_tests;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use pricedrop_watcher::catalog::SqliteCatalog;
use pricedrop_watcher::engine::{ClientIdentity, LaunchSettings, RenderingEngine};
use pricedrop_watcher::notifier::{AlertMessage, Notifier};
use pricedrop_watcher::{AppError, Result};
use sqlx::sqlite::SqlitePoolOptions;

pub fn fixture(name: &str) -> String {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "fixtures", name].iter().collect();
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e))
}

pub async fn memory_catalog() -> anyhow::Result<SqliteCatalog> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let catalog = SqliteCatalog::from_pool(pool);
    catalog.migrate().await?;
    Ok(catalog)
}

/// Serves fixture markup per URL. Unknown URLs time out.
#[derive(Default)]
pub struct FixtureEngine {
    pages: Mutex<HashMap<String, String>>,
    closed_pages: Mutex<usize>,
    closed_browsers: Mutex<usize>,
}

impl FixtureEngine {
    pub fn serve(&self, url: &str, fixture_name: &str) {
        self.pages.lock().unwrap().insert(url.to_string(), fixture(fixture_name));
    }

    pub fn closed_pages(&self) -> usize {
        *self.closed_pages.lock().unwrap()
    }

    pub fn closed_browsers(&self) -> usize {
        *self.closed_browsers.lock().unwrap()
    }
}

pub struct FixturePage {
    url: Mutex<String>,
}

#[async_trait]
impl RenderingEngine for FixtureEngine {
    type Browser = ();
    type Page = FixturePage;

    async fn launch(&self, _settings: &LaunchSettings) -> Result<()> {
        Ok(())
    }

    async fn is_connected(&self, _browser: &()) -> bool {
        true
    }

    async fn close_browser(&self, _browser: ()) -> Result<()> {
        *self.closed_browsers.lock().unwrap() += 1;
        Ok(())
    }

    async fn open_page(&self, _browser: &(), _identity: &ClientIdentity) -> Result<FixturePage> {
        Ok(FixturePage {
            url: Mutex::new(String::new()),
        })
    }

    async fn navigate(&self, page: &FixturePage, url: &str, timeout: Duration) -> Result<()> {
        if !self.pages.lock().unwrap().contains_key(url) {
            return Err(AppError::NavigationTimeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        *page.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn wait_for_selector(&self, page: &FixturePage, _selector: &str, _timeout: Duration) -> Result<bool> {
        let html = self.content(page).await?;
        Ok(html.contains(r#"id="productTitle""#))
    }

    async fn content(&self, page: &FixturePage) -> Result<String> {
        let url = page.url.lock().unwrap().clone();
        Ok(self.pages.lock().unwrap().get(&url).cloned().unwrap_or_default())
    }

    async fn current_url(&self, page: &FixturePage) -> Result<String> {
        Ok(page.url.lock().unwrap().clone())
    }

    async fn close_page(&self, _page: FixturePage) -> Result<()> {
        *self.closed_pages.lock().unwrap() += 1;
        Ok(())
    }
}

/// Keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<AlertMessage>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
