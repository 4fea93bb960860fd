//! Price store access.
//!
//! The scrape service writes through the [`PriceStore`] trait; the production
//! implementation talks to a PostgREST (Supabase) endpoint over HTTP.

mod postgrest;

pub use postgrest::PostgrestRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{PriceRecord, SupermarketId};

/// Lookup table holding one row per supermarket.
pub const SUPERMARKETS_TABLE: &str = "supermarkets";

/// Table receiving scraped price rows.
pub const PRICES_TABLE: &str = "prices";

/// Store access errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid store URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("service key is not a valid HTTP header value")]
    InvalidKey,

    #[error("store answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("no supermarket with slug '{0}'")]
    UnknownSlug(String),

    #[error("lookup row has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("store credentials are not configured")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// What the store said about a bulk insert it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResponse {
    /// Rows came back; this many were written.
    Inserted(usize),
    /// The store answered but wrote nothing; carries its error text.
    Rejected(String),
}

/// Destination for scraped prices.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Resolve the supermarket key for `slug`.
    async fn resolve_supermarket_id(&self, slug: &str) -> Result<SupermarketId>;

    /// Insert all records in a single request.
    async fn insert_prices(&self, records: &[PriceRecord]) -> Result<InsertResponse>;
}

/// Stand-in store for runs without credentials. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredStore;

#[async_trait]
impl PriceStore for UnconfiguredStore {
    async fn resolve_supermarket_id(&self, _slug: &str) -> Result<SupermarketId> {
        Err(StoreError::NotConfigured)
    }

    async fn insert_prices(&self, _records: &[PriceRecord]) -> Result<InsertResponse> {
        Err(StoreError::NotConfigured)
    }
}
