use super::*;
use pricedrop_watcher::extractor::{default_price_strategies, default_title_sources, PriceExtractor, PriceStrategy};
use rstest::rstest;
use rust_decimal::Decimal;
use std::str::FromStr;

#[rstest]
#[case::price_to_pay("price_to_pay.html", "950.00", "price_to_pay", Some("Trail Running Shoe X, Men's"))]
#[case::whole_and_fraction("whole_fraction.html", "1249.50", "whole_fraction", Some("Leather Bag Y"))]
#[case::whole_without_fraction("whole_only.html", "799.00", "whole_fraction", Some("Steel Water Bottle 1L"))]
#[case::attribute_scan("attribute_scan.html", "349", "attribute_scan:price", Some("Ceramic Mug Set"))]
fn test_fixture_extraction(
    #[case] name: &str,
    #[case] price: &str,
    #[case] strategy: &str,
    #[case] title: Option<&str>,
) {
    let result = PriceExtractor::default().extract_html(&fixture(name)).unwrap();

    assert_eq!(result.price, Decimal::from_str(price).unwrap());
    assert_eq!(result.debug.price_strategy, strategy);
    assert_eq!(result.title.as_deref(), title);
}

#[rstest]
#[case::product_without_price("no_price.html")]
#[case::captcha_interstitial("captcha.html")]
fn test_fixture_without_price(#[case] name: &str) {
    let err = PriceExtractor::default().extract_html(&fixture(name)).unwrap_err();
    assert!(matches!(err, AppError::PriceNotFound));
}

#[test]
fn test_extraction_is_repeatable() {
    let extractor = PriceExtractor::default();
    let html = fixture("price_to_pay.html");

    let first = extractor.extract_html(&html).unwrap();
    let second = extractor.extract_html(&html).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_custom_strategy_is_additive() {
    let mut prices = vec![PriceStrategy::selector("deal_badge", "#sale-amount")];
    prices.extend(default_price_strategies());
    let extractor = PriceExtractor::new(default_title_sources(), prices).unwrap();

    let result = extractor.extract_html(&fixture("attribute_scan.html")).unwrap();
    assert_eq!(result.price, Decimal::from(349));
    assert_eq!(result.debug.price_strategy, "deal_badge");

    // Pages the new rule does not match still go through the defaults
    let result = extractor.extract_html(&fixture("whole_fraction.html")).unwrap();
    assert_eq!(result.debug.price_strategy, "whole_fraction");
}

#[test]
fn test_invalid_custom_selector_rejected() {
    let prices = vec![PriceStrategy::selector("broken", "div[")];
    assert!(PriceExtractor::new(default_title_sources(), prices).is_err());
}
