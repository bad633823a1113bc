use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::ScraperConfig;
use crate::engine::{ClientIdentity, RenderingEngine};
use crate::extractor::{ExtractionResult, PriceExtractor};
use crate::{AppError, Result};

/// Element that marks a fully rendered product page.
pub const CONTENT_MARKER: &str = "#productTitle";

const BLOCKED_URL_MARKERS: &[&str] = &["/errors/validatecaptcha", "captcha", "/ap/signin"];

const BLOCKED_PAGE_MARKERS: &[(&str, &str)] = &[
    ("validatecaptcha", "captcha challenge"),
    ("enter the characters you see below", "captcha challenge"),
    ("type the characters you see in this image", "captcha challenge"),
    ("robot check", "robot check"),
    ("not a robot", "robot check"),
    ("api-services-support@amazon.com", "automated access blocked"),
    ("page not found", "page not found"),
    ("looking for something?", "page not found"),
    ("sorry! something went wrong", "service error"),
];

static PRICE_HINT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[class*="price"], [id*="price"], [class*="Price"], [id*="Price"]"#)
        .expect("price hint selector is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// No content marker, but the page still looks like a product page.
    AlternateLayout,
    Blocked { reason: String },
}

/// Decides what to do with a page whose content marker never appeared.
pub fn diagnose_page(final_url: &str, html: &str) -> PageState {
    let url = final_url.to_lowercase();
    if let Some(marker) = BLOCKED_URL_MARKERS.iter().find(|m| url.contains(*m)) {
        return PageState::Blocked {
            reason: format!("redirected to {}", marker.trim_start_matches('/')),
        };
    }

    let body = html.to_lowercase();
    if let Some((_, reason)) = BLOCKED_PAGE_MARKERS.iter().find(|(m, _)| body.contains(m)) {
        return PageState::Blocked { reason: reason.to_string() };
    }

    if Html::parse_document(html).select(&PRICE_HINT).next().is_some() {
        PageState::AlternateLayout
    } else {
        PageState::Blocked {
            reason: "no product content".to_string(),
        }
    }
}

/// Runs one product check in its own tab.
pub struct PageSession {
    identity: ClientIdentity,
    navigation_timeout: Duration,
    content_wait: Duration,
    extractor: PriceExtractor,
}

impl PageSession {
    pub fn new(config: &ScraperConfig, extractor: PriceExtractor) -> Self {
        Self {
            identity: ClientIdentity::from_config(config),
            navigation_timeout: config.navigation_timeout(),
            content_wait: config.content_wait(),
            extractor,
        }
    }

    /// Opens a tab, loads `url`, extracts title and price, and closes the tab
    /// again whatever happened in between.
    pub async fn fetch_product<E: RenderingEngine>(
        &self,
        engine: &E,
        browser: &E::Browser,
        url: &str,
    ) -> Result<ExtractionResult> {
        let page = engine.open_page(browser, &self.identity).await?;
        let outcome = self.inspect(engine, &page, url).await;

        if let Err(e) = engine.close_page(page).await {
            tracing::warn!(url = %url, error = %e, "Failed to close tab");
        }

        outcome
    }

    async fn inspect<E: RenderingEngine>(&self, engine: &E, page: &E::Page, url: &str) -> Result<ExtractionResult> {
        engine.navigate(page, url, self.navigation_timeout).await?;
        tracing::debug!(url = %url, "Page loaded");

        let marker_found = engine
            .wait_for_selector(page, CONTENT_MARKER, self.content_wait)
            .await?;
        let html = engine.content(page).await?;

        if !marker_found {
            let final_url = engine
                .current_url(page)
                .await
                .unwrap_or_else(|_| url.to_string());

            match diagnose_page(&final_url, &html) {
                PageState::AlternateLayout => {
                    tracing::debug!(url = %url, "Content marker missing, trying alternate layout");
                }
                PageState::Blocked { reason } => {
                    return Err(AppError::PageUnavailable {
                        url: url.to_string(),
                        reason,
                    });
                }
            }
        }

        let result = self.extractor.extract_html(&html)?;
        tracing::debug!(
            url = %url,
            price = %result.price,
            strategy = %result.debug.price_strategy,
            "Scraped product"
        );
        Ok(result)
    }
}
