use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::engine::{LaunchSettings, RenderingEngine};
use crate::{AppError, Result};

/// Owns the launch policy for the one browser process a run works with.
///
/// The handle itself is owned by the caller and passed back in on every
/// `ensure_browser`, so there is never more than one live process per run.
pub struct BrowserManager<E: RenderingEngine> {
    engine: Arc<E>,
    settings: LaunchSettings,
    retry_delay: Duration,
}

impl<E: RenderingEngine> BrowserManager<E> {
    pub fn new(engine: Arc<E>, settings: LaunchSettings, retry_delay: Duration) -> Self {
        Self {
            engine,
            settings,
            retry_delay,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns a usable browser, reusing `existing` when it still answers.
    ///
    /// A stale handle is closed (errors ignored) before a fresh one is launched.
    /// Launching is attempted twice; the second failure is `BrowserLaunchFailed`.
    pub async fn ensure_browser(&self, existing: Option<E::Browser>) -> Result<E::Browser> {
        if let Some(browser) = existing {
            if self.engine.is_connected(&browser).await {
                return Ok(browser);
            }
            tracing::warn!("Browser disconnected, relaunching");
            self.close_browser(browser).await;
        }

        self.launch().await
    }

    /// Best-effort release. Failures are logged and swallowed.
    pub async fn close_browser(&self, browser: E::Browser) {
        match self.engine.close_browser(browser).await {
            Ok(()) => tracing::debug!("Browser closed"),
            Err(e) => tracing::warn!(error = %e, "Error closing browser"),
        }
    }

    async fn launch(&self) -> Result<E::Browser> {
        let strategy = FixedInterval::new(self.retry_delay).take(1);
        let mut attempt = 0u32;

        let launched = Retry::start(strategy, || {
            attempt += 1;
            let current = attempt;
            async move {
                let result = self.engine.launch(&self.settings).await;
                if let Err(e) = &result {
                    tracing::warn!(attempt = current, error = %e, "Browser launch attempt failed");
                }
                result
            }
        })
        .await;

        match launched {
            Ok(browser) => {
                tracing::info!("Browser launched successfully");
                Ok(browser)
            }
            Err(AppError::BrowserLaunchFailed(message)) => Err(AppError::BrowserLaunchFailed(message)),
            Err(e) => Err(AppError::BrowserLaunchFailed(e.to_string())),
        }
    }
}
