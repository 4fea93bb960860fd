//! Service layer for shelfscrape business logic.
//!
//! Services hold the run logic separated from the CLI, and depend on the page
//! and store only through their traits.

pub mod scrape;

pub use scrape::{ExtractionSummary, RunOutcome, ScrapeError, ScrapeService};
