use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemFailure {
    pub item_id: String,
    pub url: String,
    pub error: String,
}

/// Summary of one pass over the catalog. Logged, never persisted.
///
/// `processed` counts items that were checked and written back; items that
/// failed are counted in `failed` instead, so the two add up to `total_items`
/// unless the run was aborted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_items: usize,
    pub processed: usize,
    pub failed: usize,
    pub notifications_sent: usize,
    pub notification_failures: usize,
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            total_items: 0,
            processed: 0,
            failed: 0,
            notifications_sent: 0,
            notification_failures: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, item_id: &str, url: &str, error: impl ToString) {
        self.failed += 1;
        self.failures.push(ItemFailure {
            item_id: item_id.to_string(),
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0
    }
}
