use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser disconnected: {0}")]
    BrowserDisconnected(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Page unavailable: {url}: {reason}")]
    PageUnavailable { url: String, reason: String },

    #[error("Navigation timed out after {timeout_secs}s: {url}")]
    NavigationTimeout { url: String, timeout_secs: u64 },

    #[error("Price not found or invalid")]
    PriceNotFound,

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors that abort a whole run instead of a single item.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            AppError::CatalogUnavailable(_) | AppError::BrowserLaunchFailed(_)
        )
    }

    /// Errors after which the current browser handle should not be trusted.
    pub fn is_browser_failure(&self) -> bool {
        matches!(self, AppError::BrowserDisconnected(_))
    }

    /// Maps a raw rendering-engine error message onto the taxonomy.
    pub fn from_engine(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_dead_browser_message(&message) {
            AppError::BrowserDisconnected(message)
        } else {
            AppError::Browser(message)
        }
    }
}

fn is_dead_browser_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("connection is closed")
        || lower.contains("no such process")
        || lower.contains("underlying connection is closed")
        || lower.contains("channel closed")
}

// Implement conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
