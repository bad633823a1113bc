use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ScraperConfig;
use crate::Result;

/// Chromium flags for restricted hosting environments (containers, PaaS dynos).
pub const LAUNCH_FLAGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-first-run",
    "--no-zygote",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub headless: bool,
    pub sandbox: bool,
    pub executable: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub args: Vec<String>,
}

/// What a page session presents itself as to the remote site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub accept_language: String,
    pub platform: Option<String>,
}

impl LaunchSettings {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            headless: true,
            sandbox: false,
            executable: config.chrome_path.as_ref().map(PathBuf::from),
            window_size: (config.viewport_width, config.viewport_height),
            args: LAUNCH_FLAGS.iter().map(|flag| flag.to_string()).collect(),
        }
    }
}

impl ClientIdentity {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            platform: Some("Win32".to_string()),
        }
    }
}

/// The slice of a browser-automation backend the job engine relies on.
///
/// Every call must be bounded: implementations turn hangs into errors instead
/// of blocking the caller. `navigate` reports an expired deadline as
/// `AppError::NavigationTimeout`; a dead browser process surfaces as
/// `AppError::BrowserDisconnected`.
#[async_trait]
pub trait RenderingEngine: Send + Sync + 'static {
    type Browser: Send + Sync + 'static;
    type Page: Send + Sync + 'static;

    async fn launch(&self, settings: &LaunchSettings) -> Result<Self::Browser>;
    async fn is_connected(&self, browser: &Self::Browser) -> bool;
    async fn close_browser(&self, browser: Self::Browser) -> Result<()>;

    async fn open_page(&self, browser: &Self::Browser, identity: &ClientIdentity) -> Result<Self::Page>;
    async fn navigate(&self, page: &Self::Page, url: &str, timeout: Duration) -> Result<()>;
    /// `Ok(false)` when the selector did not show up before the deadline.
    async fn wait_for_selector(&self, page: &Self::Page, selector: &str, timeout: Duration) -> Result<bool>;
    /// Serialized DOM of the current document.
    async fn content(&self, page: &Self::Page) -> Result<String>;
    async fn current_url(&self, page: &Self::Page) -> Result<String>;
    async fn close_page(&self, page: Self::Page) -> Result<()>;
}
