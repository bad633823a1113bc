use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::config::DatabaseConfig;
use crate::models::{ItemUpdate, NewTrackedItem, Owner, TrackedItem};
use crate::{AppError, Result};

/// Where tracked items live between runs.
///
/// The job engine only ever lists and updates; `insert` exists for the
/// creation path and never runs inside a job.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All items in insertion order.
    async fn list_all(&self) -> Result<Vec<TrackedItem>>;
    /// Writes price, title and check time together.
    async fn update(&self, id: &str, update: &ItemUpdate) -> Result<()>;
    async fn insert(&self, new_item: NewTrackedItem) -> Result<TrackedItem>;
}

const CREATE_TRACKED_ITEMS: &str = r#"
CREATE TABLE IF NOT EXISTS tracked_items (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    name TEXT,
    desired_price TEXT NOT NULL,
    user_id TEXT,
    user_email TEXT NOT NULL,
    current_price TEXT,
    title TEXT,
    last_checked TIMESTAMP,
    created_at TIMESTAMP NOT NULL
)
"#;

#[derive(Debug, FromRow)]
struct TrackedItemRow {
    id: String,
    url: String,
    name: Option<String>,
    desired_price: String,
    user_id: Option<String>,
    user_email: String,
    current_price: Option<String>,
    title: Option<String>,
    last_checked: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TrackedItemRow> for TrackedItem {
    type Error = AppError;

    fn try_from(row: TrackedItemRow) -> Result<Self> {
        let desired_price = parse_stored_price(&row.id, &row.desired_price)?;
        let current_price = row
            .current_price
            .as_deref()
            .map(|price| parse_stored_price(&row.id, price))
            .transpose()?;

        Ok(TrackedItem {
            id: row.id,
            url: row.url,
            name: row.name,
            desired_price,
            owner: Owner {
                user_id: row.user_id,
                email: row.user_email,
            },
            current_price,
            title: row.title,
            last_checked: row.last_checked,
            created_at: row.created_at,
        })
    }
}

fn parse_stored_price(id: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| AppError::CatalogUnavailable(format!("Item {} has an unreadable price {:?}: {}", id, raw, e)))
}

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::CatalogUnavailable(format!("Failed to open {}: {}", config.url, e)))?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_TRACKED_ITEMS).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<TrackedItem> {
        let row: Option<TrackedItemRow> = sqlx::query_as("SELECT * FROM tracked_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::NotFound {
                resource: format!("tracked item {}", id),
            }),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn list_all(&self) -> Result<Vec<TrackedItem>> {
        let rows: Vec<TrackedItemRow> = sqlx::query_as("SELECT * FROM tracked_items ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::CatalogUnavailable(e.to_string()))?;

        rows.into_iter().map(TrackedItem::try_from).collect()
    }

    async fn update(&self, id: &str, update: &ItemUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tracked_items SET current_price = ?, title = ?, last_checked = ? WHERE id = ?",
        )
        .bind(update.price.to_string())
        .bind(&update.title)
        .bind(update.checked_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                resource: format!("tracked item {}", id),
            });
        }
        Ok(())
    }

    async fn insert(&self, new_item: NewTrackedItem) -> Result<TrackedItem> {
        let item = TrackedItem::new(new_item)?;

        sqlx::query(
            r#"INSERT INTO tracked_items
               (id, url, name, desired_price, user_id, user_email, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&item.id)
        .bind(&item.url)
        .bind(&item.name)
        .bind(item.desired_price.to_string())
        .bind(&item.owner.user_id)
        .bind(&item.owner.email)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(item_id = %item.id, url = %item.url, "Tracked item created");
        Ok(item)
    }
}

/// Catalog kept in process memory.
#[derive(Default)]
pub struct MemoryCatalog {
    items: RwLock<Vec<TrackedItem>>,
}

impl MemoryCatalog {
    pub fn new(items: Vec<TrackedItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub async fn get(&self, id: &str) -> Option<TrackedItem> {
        self.items.read().await.iter().find(|item| item.id == id).cloned()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn list_all(&self) -> Result<Vec<TrackedItem>> {
        Ok(self.items.read().await.clone())
    }

    async fn update(&self, id: &str, update: &ItemUpdate) -> Result<()> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| AppError::NotFound {
                resource: format!("tracked item {}", id),
            })?;
        item.apply(update);
        Ok(())
    }

    async fn insert(&self, new_item: NewTrackedItem) -> Result<TrackedItem> {
        let item = TrackedItem::new(new_item)?;
        self.items.write().await.push(item.clone());
        Ok(item)
    }
}
