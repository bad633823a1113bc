use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub chrome_path: Option<String>,
    pub user_agent: String,
    pub accept_language: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout_secs: u64,
    pub content_wait_secs: u64,
    pub liveness_timeout_secs: u64,
    pub launch_retry_delay_ms: u64,
    pub pacing_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron: String,
    pub warmup_secs: u64,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub smtp: SmtpConfig,
    pub send_timeout_secs: u64,
    /// Prefix for prices in alert mails.
    pub currency_symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/pricedrop.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            viewport_width: 1366,
            viewport_height: 768,
            navigation_timeout_secs: 60,
            content_wait_secs: 10,
            liveness_timeout_secs: 5,
            launch_retry_delay_ms: 2000,
            pacing_delay_ms: 1000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 */6 * * *".to_string(),
            warmup_secs: 5,
            shutdown_grace_secs: 30,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from_address: None,
            from_name: "Price Drop Watcher".to_string(),
            use_tls: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "pricedrop-watcher.log".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "0.0.0.0:9001".to_string(),
        }
    }
}

impl ScraperConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn content_wait(&self) -> Duration {
        Duration::from_secs(self.content_wait_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

impl NotificationsConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Environment variables with prefix "PRICEDROP__", e.g. PRICEDROP__SCRAPER__PACING_DELAY_MS
            .add_source(Environment::with_prefix("PRICEDROP").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    /// Older deployments configured Chrome and the mailer through bare env vars.
    fn apply_legacy_env(&mut self) {
        if self.scraper.chrome_path.is_none() {
            self.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        let smtp = &mut self.notifications.smtp;
        if let Ok(user) = env::var("EMAIL_USER") {
            if smtp.username.is_none() {
                smtp.username = Some(user.clone());
            }
            if smtp.from_address.is_none() {
                smtp.from_address = Some(user);
            }
        }
        if smtp.password.is_none() {
            smtp.password = env::var("EMAIL_PASS").ok();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Message("Database url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.scraper.navigation_timeout_secs == 0 {
            return Err(ConfigError::Message("Scraper navigation_timeout_secs must be greater than 0".into()));
        }

        if self.scraper.content_wait_secs == 0 {
            return Err(ConfigError::Message("Scraper content_wait_secs must be greater than 0".into()));
        }

        if self.scraper.user_agent.trim().is_empty() {
            return Err(ConfigError::Message("Scraper user_agent must not be empty".into()));
        }

        if !is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.cron".into()));
        }

        if self.notifications.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if self.notifications.send_timeout_secs == 0 {
            return Err(ConfigError::Message("Notification send_timeout_secs must be greater than 0".into()));
        }

        if let Some(from) = &self.notifications.smtp.from_address {
            if from.parse::<lettre::Address>().is_err() {
                return Err(ConfigError::Message(format!("Invalid SMTP from_address: {}", from)));
            }
        }

        if self.metrics.enabled && self.metrics.listen_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Message("Metrics listen_address must be a socket address".into()));
        }

        Ok(())
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            smtp: SmtpConfig::default(),
            send_timeout_secs: 30,
            currency_symbol: "₹".to_string(),
        }
    }
}

/// Six or seven whitespace separated fields, as accepted by tokio-cron-scheduler.
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 && parts.len() != 7 {
        return false;
    }

    parts.iter().all(|part| {
        part.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?' | '#'))
    })
}
