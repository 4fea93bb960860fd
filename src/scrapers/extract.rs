//! Product extraction from listing cards.
//!
//! Extraction is best-effort per card: a card that is missing a field, has an
//! unparseable price, or fails in the browser is skipped and the rest are
//! still processed.

use thiserror::Error;
use tracing::{debug, warn};

use super::page::{BrowserError, ProductCard};
use crate::config::Selectors;
use crate::models::ScrapedProduct;

/// Why a price string could not be turned into a number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    #[error("no digits in price text '{0}'")]
    NoDigits(String),

    #[error("price text '{0}' does not fit in 64 bits")]
    Overflow(String),
}

/// Keep only the ASCII digits of `text`, in order, and parse them base 10.
///
/// `"$1.990"` and `"1,990 CLP"` both give 1990. Text without any digit is an
/// error rather than zero.
pub fn normalize_price(text: &str) -> Result<u64, PriceParseError> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(PriceParseError::NoDigits(text.to_string()));
    }
    digits
        .parse::<u64>()
        .map_err(|_| PriceParseError::Overflow(text.to_string()))
}

#[derive(Debug, Error)]
enum CardError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Price(#[from] PriceParseError),
}

/// Outcome for a single card.
enum CardOutcome {
    Product(ScrapedProduct),
    MissingFields,
    NonPositive,
}

/// Products pulled from a listing, with counts of what was dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub products: Vec<ScrapedProduct>,
    /// Cards without a name or price element.
    pub missing_fields: usize,
    /// Cards whose price normalized to zero.
    pub non_positive: usize,
    /// Cards that errored during extraction.
    pub failed: usize,
}

impl Extraction {
    pub fn skipped(&self) -> usize {
        self.missing_fields + self.non_positive + self.failed
    }
}

async fn extract_card<C: ProductCard>(
    card: &C,
    selectors: &Selectors,
) -> Result<CardOutcome, CardError> {
    let name = card.child_text(&selectors.name).await?;
    let price_text = card.child_text(&selectors.price).await?;

    let (name, price_text) = match (name, price_text) {
        (Some(name), Some(price_text)) => (name, price_text),
        _ => return Ok(CardOutcome::MissingFields),
    };

    let price = normalize_price(&price_text)?;
    if price == 0 {
        return Ok(CardOutcome::NonPositive);
    }

    Ok(CardOutcome::Product(ScrapedProduct {
        name: name.trim().to_string(),
        price,
    }))
}

/// Extract products from every card, skipping the ones that fail.
pub async fn extract_products<C: ProductCard>(cards: &[C], selectors: &Selectors) -> Extraction {
    let mut extraction = Extraction::default();

    for (index, card) in cards.iter().enumerate() {
        match extract_card(card, selectors).await {
            Ok(CardOutcome::Product(product)) => {
                debug!("Card {}: {} = {}", index, product.name, product.price);
                extraction.products.push(product);
            }
            Ok(CardOutcome::MissingFields) => {
                debug!("Card {}: missing name or price element, skipping", index);
                extraction.missing_fields += 1;
            }
            Ok(CardOutcome::NonPositive) => {
                debug!("Card {}: price is zero, skipping", index);
                extraction.non_positive += 1;
            }
            Err(e) => {
                warn!("Error extracting card {}: {}. Continuing.", index, e);
                extraction.failed += 1;
            }
        }
    }

    extraction
}
