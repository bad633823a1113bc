pub mod browser;
pub mod catalog;
pub mod chrome;
pub mod config;
pub mod engine;
pub mod extractor;
pub mod job;
pub mod models;
pub mod notifier;
pub mod scheduler;
pub mod session;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
