use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::generate_id;
use crate::{AppError, Result};

/// Who gets told when an item drops below its threshold.
///
/// Older records only carried an email address, so `user_id` stays optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub user_id: Option<String>,
    pub email: String,
}

impl Owner {
    /// Normalizes whatever the creator supplied into a single reference.
    pub fn resolve(user_id: Option<String>, email: Option<String>) -> Result<Self> {
        let user_id = user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let email = email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        match email {
            Some(email) => Ok(Self { user_id, email }),
            None => Err(AppError::Validation(match user_id {
                Some(id) => format!("User {} has no notification email", id),
                None => "An owner email address is required".to_string(),
            })),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedItem {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub desired_price: Decimal,
    pub owner: Owner,

    // Last successful observation
    pub current_price: Option<Decimal>,
    pub title: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTrackedItem {
    #[validate(url, custom(function = "validate_http_url"))]
    pub url: String,
    pub name: Option<String>,
    #[validate(custom(function = "validate_positive_price"))]
    pub desired_price: Decimal,
    pub user_id: Option<String>,
    #[validate(email)]
    pub user_email: Option<String>,
}

/// Fields the job runner writes after a successful check. Always persisted together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemUpdate {
    pub price: Decimal,
    pub title: String,
    pub checked_at: DateTime<Utc>,
}

impl TrackedItem {
    pub fn new(mut new_item: NewTrackedItem) -> Result<Self> {
        new_item.url = new_item.url.trim().to_string();
        new_item.user_email = new_item.user_email.map(|email| email.trim().to_string());
        new_item.validate()?;
        let owner = Owner::resolve(new_item.user_id, new_item.user_email)?;

        Ok(Self {
            id: generate_id(),
            url: new_item.url,
            name: new_item.name.filter(|n| !n.trim().is_empty()),
            desired_price: new_item.desired_price,
            owner,
            current_price: None,
            title: None,
            last_checked: None,
            created_at: Utc::now(),
        })
    }

    pub fn apply(&mut self, update: &ItemUpdate) {
        self.current_price = Some(update.price);
        self.title = Some(update.title.clone());
        self.last_checked = Some(update.checked_at);
    }

    /// Price-drop rule: notify when the observed price is at or below the target.
    pub fn is_price_drop(&self, observed: Decimal) -> bool {
        observed <= self.desired_price
    }

    /// Best available label when a page yields no title.
    pub fn fallback_title(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| UNTITLED_PRODUCT.to_string())
    }
}

pub const UNTITLED_PRODUCT: &str = "Untitled product";

fn validate_positive_price(price: &Decimal) -> std::result::Result<(), ValidationError> {
    if price.is_sign_positive() && !price.is_zero() {
        Ok(())
    } else {
        Err(ValidationError::new("desired_price_not_positive"))
    }
}

fn validate_http_url(url: &str) -> std::result::Result<(), ValidationError> {
    match url::Url::parse(url.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new("url_not_http")),
    }
}
