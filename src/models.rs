//! Domain models for scraped products and the price rows written to the store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source tag written on every price row produced by the scraper.
pub const SCRAPING_SOURCE: &str = "scraping";

/// A product name/price pair read from one listing card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedProduct {
    /// Card name text, trimmed.
    pub name: String,
    /// Normalized price; always greater than zero.
    pub price: u64,
}

/// Opaque supermarket key returned by the lookup table.
///
/// PostgREST may hand back a number or a string depending on the column type,
/// so the raw JSON scalar is kept and written back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupermarketId(serde_json::Value);

impl SupermarketId {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self(value.into())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl fmt::Display for SupermarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// Extra data stored alongside a price row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMetadata {
    pub scraped_name: String,
}

/// One row of the `prices` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub supermarket_id: SupermarketId,
    pub price: u64,
    /// Listing pages only show the current price, so this mirrors `price`.
    pub regular_price: u64,
    pub is_available: bool,
    pub source: String,
    pub metadata: PriceMetadata,
}

impl PriceRecord {
    /// Build the row for a product scraped from the listing.
    pub fn from_scraped(supermarket_id: &SupermarketId, product: &ScrapedProduct) -> Self {
        Self {
            supermarket_id: supermarket_id.clone(),
            price: product.price,
            regular_price: product.price,
            is_available: true,
            source: SCRAPING_SOURCE.to_string(),
            metadata: PriceMetadata {
                scraped_name: product.name.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_price_record_serializes_store_columns() {
        let product = ScrapedProduct {
            name: "Hallulla Granel".to_string(),
            price: 1990,
        };
        let record = PriceRecord::from_scraped(&SupermarketId::new(7), &product);

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "supermarket_id": 7,
                "price": 1990,
                "regular_price": 1990,
                "is_available": true,
                "source": "scraping",
                "metadata": { "scraped_name": "Hallulla Granel" }
            })
        );
    }

    #[test]
    fn test_supermarket_id_display() {
        assert_eq!(SupermarketId::new(12).to_string(), "12");
        assert_eq!(
            SupermarketId::new("7f3c-uuid").to_string(),
            "7f3c-uuid"
        );
    }
}
