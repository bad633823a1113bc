use super::*;
use chrono::Utc;
use pricedrop_watcher::catalog::CatalogStore;
use pricedrop_watcher::models::{ItemUpdate, NewTrackedItem};
use rust_decimal::Decimal;

fn request(url: &str, email: Option<&str>) -> NewTrackedItem {
    NewTrackedItem {
        url: url.to_string(),
        name: Some("Desk lamp".to_string()),
        desired_price: Decimal::new(149999, 2),
        user_id: None,
        user_email: email.map(str::to_string),
    }
}

#[tokio::test]
async fn test_track_then_check_roundtrip() -> anyhow::Result<()> {
    let catalog = memory_catalog().await?;
    let item = catalog
        .insert(request("https://www.amazon.in/dp/B0LAMP", Some(" owner@example.com ")))
        .await?;

    assert_eq!(item.owner.email, "owner@example.com");
    assert_eq!(item.name.as_deref(), Some("Desk lamp"));

    catalog
        .update(
            &item.id,
            &ItemUpdate {
                price: Decimal::new(139900, 2),
                title: "Desk Lamp, Warm White".to_string(),
                checked_at: Utc::now(),
            },
        )
        .await?;

    let items = catalog.list_all().await?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].current_price, Some(Decimal::new(139900, 2)));
    assert_eq!(items[0].desired_price, Decimal::new(149999, 2));
    assert!(items[0].is_price_drop(items[0].current_price.unwrap()));
    Ok(())
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() -> anyhow::Result<()> {
    let catalog = memory_catalog().await?;

    let no_email = catalog.insert(request("https://www.amazon.in/dp/B0LAMP", None)).await;
    assert!(matches!(no_email, Err(AppError::Validation(_))));

    let bad_scheme = catalog
        .insert(request("ftp://www.amazon.in/dp/B0LAMP", Some("owner@example.com")))
        .await;
    assert!(matches!(bad_scheme, Err(AppError::Validation(_))));

    let bad_email = catalog
        .insert(request("https://www.amazon.in/dp/B0LAMP", Some("not-an-email")))
        .await;
    assert!(matches!(bad_email, Err(AppError::Validation(_))));

    assert!(catalog.list_all().await?.is_empty());
    Ok(())
}
