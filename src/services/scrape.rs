//! Scrape service: one run from page load to price insert.
//!
//! A run moves through
//! `BrowserLaunched -> PageLoaded -> ProductsFound -> IdResolved -> Extracted`
//! and ends in `Inserted`, `InsertRejected` or `SkippedEmpty`. The browser
//! session is released exactly once, right after extraction on the happy path
//! and before returning on every failure.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, Settings};
use crate::models::{PriceRecord, SupermarketId};
use crate::repository::{InsertResponse, PriceStore, StoreError};
use crate::scrapers::{extract_products, BrowserError, Extraction, ProductCard, ProductPage};

/// Fatal run failures.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not set up the store client: {0}")]
    StoreSetup(#[source] StoreError),

    #[error("browser failed to launch: {0}")]
    Launch(#[source] BrowserError),

    #[error("timed out waiting for the page or products to load ({source})")]
    NavigationTimeout {
        #[source]
        source: BrowserError,
        /// Diagnostic screenshot, when one could be written.
        screenshot: Option<PathBuf>,
    },

    #[error("error navigating to the page: {0}")]
    Navigation(#[source] BrowserError),

    #[error("could not resolve supermarket id for '{slug}': {source}")]
    IdResolution {
        slug: String,
        #[source]
        source: StoreError,
    },

    #[error("critical error inserting prices: {0}")]
    Insert(#[source] StoreError),
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The store accepted the rows.
    Inserted { count: usize, extraction: ExtractionSummary },
    /// The store answered with an error instead of rows.
    InsertRejected { message: String, extraction: ExtractionSummary },
    /// Nothing valid to insert; the store was not called.
    SkippedEmpty { extraction: ExtractionSummary },
    /// Inspect mode: markup of the first card, `None` when no card matched.
    Inspected { html: Option<String> },
}

impl RunOutcome {
    /// Whether the run should count as a failure for exit status purposes.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::InsertRejected { .. })
    }
}

/// Card counts reported with the outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub cards: usize,
    pub products: usize,
    pub skipped: usize,
}

/// Result of the browser half of the run.
enum Collected {
    Inspected(Option<String>),
    Products {
        supermarket_id: SupermarketId,
        extraction: Extraction,
        cards: usize,
    },
}

/// Runs the scrape against a page and a store.
pub struct ScrapeService<'a, S: PriceStore> {
    settings: &'a Settings,
    store: &'a S,
}

impl<'a, S: PriceStore> ScrapeService<'a, S> {
    pub fn new(settings: &'a Settings, store: &'a S) -> Self {
        Self { settings, store }
    }

    /// Drive `page` through the whole run. The page is closed before this
    /// returns, whatever the outcome.
    pub async fn run<P: ProductPage>(&self, page: &mut P) -> Result<RunOutcome, ScrapeError> {
        let collected = self.collect(page).await;
        page.close().await;

        match collected? {
            Collected::Inspected(html) => Ok(RunOutcome::Inspected { html }),
            Collected::Products {
                supermarket_id,
                extraction,
                cards,
            } => self.insert(&supermarket_id, extraction, cards).await,
        }
    }

    /// Load the page, resolve the supermarket and extract products.
    async fn collect<P: ProductPage>(&self, page: &mut P) -> Result<Collected, ScrapeError> {
        let settings = self.settings;

        if let Err(e) = page
            .load(&settings.target_url, &settings.selectors.card, &settings.load)
            .await
        {
            return Err(self.load_failure(page, e).await);
        }
        info!("Products found on the page");

        let cards = page
            .cards(&settings.selectors.card)
            .await
            .map_err(ScrapeError::Navigation)?;

        if settings.inspect {
            let html = match cards.first() {
                Some(card) => Some(card.inner_html().await.map_err(ScrapeError::Navigation)?),
                None => None,
            };
            return Ok(Collected::Inspected(html));
        }

        info!("Found {} product cards, resolving supermarket", cards.len());
        let supermarket_id = self
            .store
            .resolve_supermarket_id(&settings.supermarket_slug)
            .await
            .map_err(|source| ScrapeError::IdResolution {
                slug: settings.supermarket_slug.clone(),
                source,
            })?;
        info!(
            "Supermarket '{}' resolved to id {}",
            settings.supermarket_slug, supermarket_id
        );

        let extraction = extract_products(&cards, &settings.selectors).await;
        info!(
            "Extracted {} products from {} cards ({} skipped)",
            extraction.products.len(),
            cards.len(),
            extraction.skipped()
        );

        Ok(Collected::Products {
            supermarket_id,
            extraction,
            cards: cards.len(),
        })
    }

    /// Classify a load failure, taking the diagnostic screenshot on timeout.
    async fn load_failure<P: ProductPage>(&self, page: &P, error: BrowserError) -> ScrapeError {
        if !error.is_timeout() {
            return ScrapeError::Navigation(error);
        }

        let path = &self.settings.load.screenshot_path;
        let screenshot = match page.screenshot(path).await {
            Ok(()) => {
                info!("Saved timeout screenshot to {}", path.display());
                Some(path.clone())
            }
            Err(e) => {
                warn!("Could not save timeout screenshot: {}", e);
                None
            }
        };

        ScrapeError::NavigationTimeout {
            source: error,
            screenshot,
        }
    }

    async fn insert(
        &self,
        supermarket_id: &SupermarketId,
        extraction: Extraction,
        cards: usize,
    ) -> Result<RunOutcome, ScrapeError> {
        let summary = ExtractionSummary {
            cards,
            products: extraction.products.len(),
            skipped: extraction.skipped(),
        };

        if extraction.products.is_empty() {
            return Ok(RunOutcome::SkippedEmpty {
                extraction: summary,
            });
        }

        let records: Vec<PriceRecord> = extraction
            .products
            .iter()
            .map(|product| PriceRecord::from_scraped(supermarket_id, product))
            .collect();

        info!("Inserting {} price records", records.len());
        match self
            .store
            .insert_prices(&records)
            .await
            .map_err(ScrapeError::Insert)?
        {
            InsertResponse::Inserted(count) => Ok(RunOutcome::Inserted {
                count,
                extraction: summary,
            }),
            InsertResponse::Rejected(message) => Ok(RunOutcome::InsertRejected {
                message,
                extraction: summary,
            }),
        }
    }
}
