//! CLI command implementations.

mod scrape;

pub use scrape::{cmd_config_failure, cmd_scrape};
