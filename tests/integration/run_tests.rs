use super::*;
use pricedrop_watcher::catalog::{CatalogStore, SqliteCatalog};
use pricedrop_watcher::config::{AppConfig, SchedulerConfig};
use pricedrop_watcher::job::JobRunner;
use pricedrop_watcher::models::NewTrackedItem;
use pricedrop_watcher::scheduler::{PriceCheckScheduler, TriggerOutcome};
use rust_decimal::Decimal;
use std::sync::Arc;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scraper.pacing_delay_ms = 0;
    config.scraper.launch_retry_delay_ms = 1;
    config.notifications.send_timeout_secs = 1;
    config
}

async fn track(catalog: &SqliteCatalog, url: &str, desired: i64) -> anyhow::Result<String> {
    let item = catalog
        .insert(NewTrackedItem {
            url: url.to_string(),
            name: None,
            desired_price: Decimal::from(desired),
            user_id: Some("u-42".to_string()),
            user_email: Some("owner@example.com".to_string()),
        })
        .await?;
    Ok(item.id)
}

#[tokio::test]
async fn test_full_run_against_fixtures() -> anyhow::Result<()> {
    let engine = Arc::new(FixtureEngine::default());
    engine.serve("https://shop.example/shoe", "price_to_pay.html");
    engine.serve("https://shop.example/bag", "whole_fraction.html");
    engine.serve("https://shop.example/blocked", "captcha.html");
    engine.serve("https://shop.example/bottle", "whole_only.html");

    let catalog = Arc::new(memory_catalog().await?);
    let shoe = track(&catalog, "https://shop.example/shoe", 1000).await?;
    let bag = track(&catalog, "https://shop.example/bag", 500).await?;
    let blocked = track(&catalog, "https://shop.example/blocked", 500).await?;
    let bottle = track(&catalog, "https://shop.example/bottle", 800).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let runner = JobRunner::from_config(
        &test_config(),
        Arc::clone(&engine),
        catalog.clone(),
        notifier.clone(),
    );

    let report = runner.run_once().await?;
    assert_eq!(report.total_items, 4);
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].item_id, blocked);
    assert_eq!(report.notifications_sent, 2);

    let sent = notifier.sent.lock().unwrap().clone();
    let subjects: Vec<_> = sent.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(
        subjects,
        vec![
            "Price Drop Alert: Trail Running Shoe X, Men's",
            "Price Drop Alert: Steel Water Bottle 1L"
        ]
    );
    assert!(sent[0].text_body.contains("₹950.00"));

    let stored = catalog.get(&shoe).await?;
    assert_eq!(stored.current_price, Some(Decimal::new(95000, 2)));
    let stored = catalog.get(&bag).await?;
    assert_eq!(stored.current_price, Some(Decimal::new(124950, 2)));
    assert_eq!(stored.title.as_deref(), Some("Leather Bag Y"));
    let stored = catalog.get(&bottle).await?;
    assert_eq!(stored.current_price, Some(Decimal::new(79900, 2)));
    assert_eq!(stored.title.as_deref(), Some("Steel Water Bottle 1L"));
    assert!(stored.last_checked.is_some());
    let stored = catalog.get(&blocked).await?;
    assert!(stored.current_price.is_none());
    assert!(stored.last_checked.is_none());

    assert_eq!(engine.closed_pages(), 4);
    assert_eq!(engine.closed_browsers(), 1);
    Ok(())
}

#[tokio::test]
async fn test_manual_trigger_through_scheduler() -> anyhow::Result<()> {
    let engine = Arc::new(FixtureEngine::default());
    engine.serve("https://shop.example/shoe", "price_to_pay.html");

    let catalog = Arc::new(memory_catalog().await?);
    track(&catalog, "https://shop.example/shoe", 100).await?;

    let runner = Arc::new(JobRunner::from_config(
        &test_config(),
        Arc::clone(&engine),
        catalog.clone() as Arc<dyn CatalogStore>,
        Arc::new(RecordingNotifier::default()),
    ));
    let scheduler = PriceCheckScheduler::new(runner, SchedulerConfig::default()).await?;

    match scheduler.run_now().await {
        TriggerOutcome::Completed(report) => {
            assert_eq!(report.processed, 1);
            assert_eq!(report.notifications_sent, 0);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    Ok(())
}
