//! Title and price extraction from a rendered product page.
//!
//! Extraction is a pure function of the DOM snapshot. Both the title and the
//! price are resolved by walking an ordered list of strategies; the first one
//! that produces a usable value wins. The lists are plain data, so adding a
//! fallback means pushing another entry rather than adding a branch.

use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::{AppError, Result};

static NUMERIC_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("numeric price pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TitleSource {
    /// Trimmed text content of the first matching element.
    Text { selector: String },
    /// Value of an attribute on the first matching element.
    Attribute { selector: String, attribute: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceStrategy {
    /// Text of an element that holds the full formatted price.
    Selector { label: String, selector: String },
    /// Price split into a whole-number node and a fraction node.
    WholeFraction { whole: String, fraction: String },
    /// Any element whose class, id or data-* attribute name mentions `needle`.
    AttributeScan { needle: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionDebug {
    pub title_source: Option<String>,
    pub price_strategy: String,
    pub raw_price_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: Option<String>,
    pub price: Decimal,
    pub debug: ExtractionDebug,
}

#[derive(Debug, Clone)]
pub struct PriceExtractor {
    titles: Vec<TitleSource>,
    prices: Vec<PriceStrategy>,
}

impl TitleSource {
    pub fn text(selector: &str) -> Self {
        TitleSource::Text { selector: selector.to_string() }
    }

    pub fn attribute(selector: &str, attribute: &str) -> Self {
        TitleSource::Attribute {
            selector: selector.to_string(),
            attribute: attribute.to_string(),
        }
    }

    fn describe(&self) -> String {
        match self {
            TitleSource::Text { selector } => selector.clone(),
            TitleSource::Attribute { selector, attribute } => format!("{}[{}]", selector, attribute),
        }
    }

    fn selectors(&self) -> Vec<&str> {
        match self {
            TitleSource::Text { selector } | TitleSource::Attribute { selector, .. } => vec![selector.as_str()],
        }
    }
}

impl PriceStrategy {
    pub fn selector(label: &str, selector: &str) -> Self {
        PriceStrategy::Selector {
            label: label.to_string(),
            selector: selector.to_string(),
        }
    }

    pub fn whole_fraction(whole: &str, fraction: &str) -> Self {
        PriceStrategy::WholeFraction {
            whole: whole.to_string(),
            fraction: fraction.to_string(),
        }
    }

    pub fn attribute_scan(needle: &str) -> Self {
        PriceStrategy::AttributeScan { needle: needle.to_lowercase() }
    }

    fn label(&self) -> String {
        match self {
            PriceStrategy::Selector { label, .. } => label.clone(),
            PriceStrategy::WholeFraction { .. } => "whole_fraction".to_string(),
            PriceStrategy::AttributeScan { needle } => format!("attribute_scan:{}", needle),
        }
    }

    fn selectors(&self) -> Vec<&str> {
        match self {
            PriceStrategy::Selector { selector, .. } => vec![selector.as_str()],
            PriceStrategy::WholeFraction { whole, fraction } => vec![whole.as_str(), fraction.as_str()],
            PriceStrategy::AttributeScan { .. } => Vec::new(),
        }
    }
}

pub fn default_title_sources() -> Vec<TitleSource> {
    vec![
        TitleSource::text("#productTitle"),
        TitleSource::text("#title"),
        TitleSource::text("h1#title span"),
        TitleSource::attribute(r#"meta[property="og:title"]"#, "content"),
        TitleSource::attribute(r#"meta[name="title"]"#, "content"),
        TitleSource::text("title"),
    ]
}

pub fn default_price_strategies() -> Vec<PriceStrategy> {
    vec![
        PriceStrategy::selector("price_to_pay", ".reinventPricePriceToPayMargin .a-offscreen"),
        PriceStrategy::selector("price_to_pay", ".priceToPay .a-offscreen"),
        PriceStrategy::selector("price_amount", ".a-price .a-offscreen"),
        PriceStrategy::whole_fraction(".a-price-whole", ".a-price-fraction"),
        PriceStrategy::attribute_scan("price"),
    ]
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self {
            titles: default_title_sources(),
            prices: default_price_strategies(),
        }
    }
}

impl PriceExtractor {
    /// Builds an extractor from custom rule lists, rejecting invalid selectors up front.
    pub fn new(titles: Vec<TitleSource>, prices: Vec<PriceStrategy>) -> Result<Self> {
        let selectors = titles
            .iter()
            .flat_map(TitleSource::selectors)
            .chain(prices.iter().flat_map(PriceStrategy::selectors));

        for selector in selectors {
            Selector::parse(selector)
                .map_err(|e| AppError::Validation(format!("Invalid CSS selector '{}': {:?}", selector, e)))?;
        }

        Ok(Self { titles, prices })
    }

    pub fn extract_html(&self, html: &str) -> Result<ExtractionResult> {
        let document = Html::parse_document(html);
        self.extract(&document)
    }

    pub fn extract(&self, document: &Html) -> Result<ExtractionResult> {
        let (price, price_strategy, raw_price_text) =
            self.resolve_price(document).ok_or(AppError::PriceNotFound)?;
        let title = self.resolve_title(document);

        Ok(ExtractionResult {
            price,
            debug: ExtractionDebug {
                title_source: title.as_ref().map(|(_, source)| source.clone()),
                price_strategy,
                raw_price_text,
            },
            title: title.map(|(text, _)| text),
        })
    }

    fn resolve_title(&self, document: &Html) -> Option<(String, String)> {
        self.titles.iter().find_map(|source| {
            let text = match source {
                TitleSource::Text { selector } => first_match(document, selector)
                    .map(|element| element_text(&element)),
                TitleSource::Attribute { selector, attribute } => first_match(document, selector)
                    .and_then(|element| element.value().attr(attribute).map(str::to_string)),
            };

            text.map(|t| collapse_whitespace(&t))
                .filter(|t| !t.is_empty())
                .map(|t| (t, source.describe()))
        })
    }

    fn resolve_price(&self, document: &Html) -> Option<(Decimal, String, String)> {
        self.prices.iter().find_map(|strategy| {
            let (price, raw) = match strategy {
                PriceStrategy::Selector { selector, .. } => price_from_selector(document, selector),
                PriceStrategy::WholeFraction { whole, fraction } => {
                    price_from_fragments(document, whole, fraction)
                }
                PriceStrategy::AttributeScan { needle } => price_from_scan(document, needle),
            }?;
            tracing::trace!(strategy = %strategy.label(), raw = %raw, %price, "price resolved");
            Some((price, strategy.label(), raw))
        })
    }
}

/// Keeps digits and decimal points from the first digit onwards, then parses.
/// Only finite positive values count.
pub fn normalize_price(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    Decimal::from_str(&cleaned)
        .ok()
        .filter(|price| price.is_sign_positive() && !price.is_zero())
}

fn price_from_selector(document: &Html, selector: &str) -> Option<(Decimal, String)> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(|element| element_text(&element))
        .filter(|text| !text.is_empty())
        .find_map(|text| normalize_price(&text).map(|price| (price, text)))
}

fn price_from_fragments(document: &Html, whole: &str, fraction: &str) -> Option<(Decimal, String)> {
    let whole_digits = first_match(document, whole)
        .map(|element| digits_only(&element_text(&element)))
        .filter(|digits| !digits.is_empty())?;

    let fraction_digits = first_match(document, fraction)
        .map(|element| digits_only(&element_text(&element)))
        .filter(|digits| !digits.is_empty())
        .unwrap_or_else(|| "00".to_string());

    let raw = format!("{}.{}", whole_digits, fraction_digits);
    normalize_price(&raw).map(|price| (price, raw))
}

fn price_from_scan(document: &Html, needle: &str) -> Option<(Decimal, String)> {
    let any = Selector::parse("*").ok()?;

    document
        .select(&any)
        .filter(|element| mentions(element, needle))
        .find_map(|element| {
            let text = element_text(&element);
            let candidate = NUMERIC_PRICE.find(&text).map(|m| m.as_str().to_string()).or_else(|| {
                element
                    .value()
                    .attrs()
                    .filter(|(name, _)| name.starts_with("data-") && name.to_lowercase().contains(needle))
                    .find_map(|(_, value)| NUMERIC_PRICE.find(value).map(|m| m.as_str().to_string()))
            })?;
            normalize_price(&candidate).map(|price| (price, candidate))
        })
}

fn mentions(element: &ElementRef, needle: &str) -> bool {
    let value = element.value();
    let in_class = value.classes().any(|class| class.to_lowercase().contains(needle));
    let in_id = value.id().is_some_and(|id| id.to_lowercase().contains(needle));
    let in_data = value
        .attrs()
        .any(|(name, _)| name.starts_with("data-") && name.to_lowercase().contains(needle));

    in_class || in_id || in_data
}

fn first_match<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn digits_only(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}
