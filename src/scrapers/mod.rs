//! Browser-driven listing scraper.

pub mod browser;
pub mod config;
pub mod extract;
pub mod page;

pub use browser::{BrowserEngineConfig, BrowserEngineType, BrowserSession, ProxyConfig, Viewport};
pub use extract::{extract_products, normalize_price, Extraction, PriceParseError};
pub use page::{BrowserError, ProductCard, ProductPage, WaitUntil};
