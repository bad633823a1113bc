//! `RenderingEngine` backed by a local Chrome/Chromium over the DevTools protocol.
//!
//! `headless_chrome` is synchronous, so every protocol call runs on the
//! blocking pool and is raced against a deadline. A call that loses the race
//! keeps running in the background until the tab is closed, which is why
//! sessions always close their tab on the way out.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::error::Elapsed;

use crate::engine::{ClientIdentity, LaunchSettings, RenderingEngine};
use crate::{AppError, Result};

const WELL_KNOWN_EXECUTABLES: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/opt/google/chrome/chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const CONTENT_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
// Chrome is killed if it sees no protocol traffic for this long.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ChromeBrowser {
    inner: Arc<Browser>,
}

pub struct ChromeEngine {
    liveness_timeout: Duration,
}

impl ChromeEngine {
    pub fn new(liveness_timeout: Duration) -> Self {
        Self { liveness_timeout }
    }
}

/// Picks the binary to launch: an explicit path if it exists, then whatever
/// `headless_chrome` detects, then a list of common install locations.
/// `None` leaves the choice to the environment default.
pub fn resolve_executable(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "Configured Chrome executable not found, falling back to detection");
    }

    if let Ok(path) = headless_chrome::browser::default_executable() {
        return Some(path);
    }

    let detected = WELL_KNOWN_EXECUTABLES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists());

    if detected.is_none() {
        tracing::debug!("No Chrome executable detected, using environment default");
    }
    detected
}

async fn blocking<T, F>(limit: Duration, f: F) -> std::result::Result<Result<T>, Elapsed>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::time::timeout(limit, async move {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result.map_err(|e| AppError::from_engine(format!("{:#}", e))),
            Err(join_error) => Err(AppError::Internal(format!("Browser task failed: {}", join_error))),
        }
    })
    .await
}

fn apply_identity(tab: &Tab, identity: &ClientIdentity) -> anyhow::Result<()> {
    tab.set_user_agent(
        &identity.user_agent,
        Some(&identity.accept_language),
        identity.platform.as_deref(),
    )?;

    let mut headers = HashMap::new();
    headers.insert("Accept-Language", identity.accept_language.as_str());
    tab.set_extra_http_headers(headers)?;
    Ok(())
}

/// Meeting point between a blocking call that produces a resource and a
/// caller that may stop waiting for it. Whichever side comes second owns
/// the cleanup.
struct Handoff<T> {
    state: Mutex<HandoffState<T>>,
}

struct HandoffState<T> {
    abandoned: bool,
    delivered: Option<T>,
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(HandoffState { abandoned: false, delivered: None }),
        }
    }
}

impl<T> Handoff<T> {
    /// Producer side. Hands the value back if the caller already gave up.
    fn deliver(&self, value: T) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.abandoned {
            Some(value)
        } else {
            state.delivered = Some(value);
            None
        }
    }

    /// Caller side. Returns a value that was delivered but never collected.
    fn abandon(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.abandoned = true;
        state.delivered.take()
    }
}

fn is_timeout_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out") || lower.contains("never came")
}

#[async_trait]
impl RenderingEngine for ChromeEngine {
    type Browser = ChromeBrowser;
    type Page = Arc<Tab>;

    async fn launch(&self, settings: &LaunchSettings) -> Result<ChromeBrowser> {
        let settings = settings.clone();

        let launched = blocking(LAUNCH_TIMEOUT, move || {
            let args: Vec<&OsStr> = settings.args.iter().map(OsStr::new).collect();
            let mut launch_options = LaunchOptions::default_builder()
                .headless(settings.headless)
                .sandbox(settings.sandbox)
                .args(args)
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to create launch options: {}", e))?;

            launch_options.path = resolve_executable(settings.executable.as_deref());
            launch_options.window_size = Some(settings.window_size);
            launch_options.idle_browser_timeout = IDLE_BROWSER_TIMEOUT;

            Browser::new(launch_options)
        })
        .await;

        match launched {
            Ok(Ok(browser)) => Ok(ChromeBrowser { inner: Arc::new(browser) }),
            Ok(Err(e)) => Err(AppError::BrowserLaunchFailed(e.to_string())),
            Err(_) => Err(AppError::BrowserLaunchFailed(format!(
                "Chrome did not start within {}s",
                LAUNCH_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn is_connected(&self, browser: &ChromeBrowser) -> bool {
        let inner = Arc::clone(&browser.inner);
        matches!(
            blocking(self.liveness_timeout, move || inner.get_version().map(|_| ())).await,
            Ok(Ok(()))
        )
    }

    async fn close_browser(&self, browser: ChromeBrowser) -> Result<()> {
        // Dropping the last handle kills the Chrome process and reaps it.
        match blocking(CLOSE_TIMEOUT, move || {
            drop(browser);
            Ok(())
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::Browser("Timed out waiting for Chrome to exit".to_string())),
        }
    }

    async fn open_page(&self, browser: &ChromeBrowser, identity: &ClientIdentity) -> Result<Arc<Tab>> {
        let inner = Arc::clone(&browser.inner);
        let identity = identity.clone();
        let handoff = Arc::new(Handoff::default());
        let slot = Arc::clone(&handoff);

        let opened = blocking(CONTENT_TIMEOUT, move || {
            let tab = inner.new_tab()?;
            if let Err(e) = apply_identity(&tab, &identity) {
                let _ = tab.close(false);
                return Err(e);
            }
            if let Some(orphan) = slot.deliver(Arc::clone(&tab)) {
                let _ = orphan.close(false);
                anyhow::bail!("Tab opened after the caller stopped waiting");
            }
            Ok(tab)
        })
        .await;

        match opened {
            Ok(result) => result,
            Err(_) => {
                if let Some(tab) = handoff.abandon() {
                    tokio::task::spawn_blocking(move || {
                        let _ = tab.close(false);
                    });
                }
                Err(AppError::Browser("Timed out opening a new tab".to_string()))
            }
        }
    }

    async fn navigate(&self, page: &Arc<Tab>, url: &str, timeout: Duration) -> Result<()> {
        let tab = Arc::clone(page);
        let target = url.to_string();
        let timeout_secs = timeout.as_secs();

        let navigated = blocking(timeout, move || {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await;

        match navigated {
            Ok(Ok(())) => Ok(()),
            Ok(Err(AppError::Browser(message))) if is_timeout_message(&message) => {
                Err(AppError::NavigationTimeout { url: url.to_string(), timeout_secs })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::NavigationTimeout { url: url.to_string(), timeout_secs }),
        }
    }

    async fn wait_for_selector(&self, page: &Arc<Tab>, selector: &str, timeout: Duration) -> Result<bool> {
        let tab = Arc::clone(page);
        let selector = selector.to_string();

        // Give the inner wait a chance to give up on its own before the outer deadline fires.
        let waited = blocking(timeout + Duration::from_secs(2), move || {
            tab.wait_for_element_with_custom_timeout(&selector, timeout).map(|_| ())
        })
        .await;

        match waited {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) if e.is_browser_failure() => Err(e),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }

    async fn content(&self, page: &Arc<Tab>) -> Result<String> {
        let tab = Arc::clone(page);
        blocking(CONTENT_TIMEOUT, move || tab.get_content())
            .await
            .unwrap_or_else(|_| {
                Err(AppError::Browser(format!(
                    "get_content hard timeout after {}s",
                    CONTENT_TIMEOUT.as_secs()
                )))
            })
    }

    async fn current_url(&self, page: &Arc<Tab>) -> Result<String> {
        Ok(page.get_url())
    }

    async fn close_page(&self, page: Arc<Tab>) -> Result<()> {
        blocking(CLOSE_TIMEOUT, move || page.close(false).map(|_| ()))
            .await
            .unwrap_or_else(|_| Err(AppError::Browser("Timed out closing tab".to_string())))
    }
}
