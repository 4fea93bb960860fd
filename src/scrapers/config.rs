//! Browser-specific extension of the config file types.
//!
//! Type definitions live in `crate::config`. This module adds the
//! `BrowserConfig::to_engine_config()` method which depends on browser
//! engine types from the scrapers module.

pub use crate::config::BrowserConfig;

use std::path::PathBuf;

use super::browser::{BrowserEngineConfig, BrowserEngineType};

impl BrowserConfig {
    /// Convert to BrowserEngineConfig.
    /// The proxy is left unset; it only ever comes from the environment.
    pub fn to_engine_config(&self) -> BrowserEngineConfig {
        let engine = match self.engine.to_lowercase().as_str() {
            "stealth" => BrowserEngineType::Stealth,
            "standard" => BrowserEngineType::Standard,
            _ => BrowserEngineType::Stealth,
        };

        BrowserEngineConfig {
            engine,
            headless: self.headless,
            proxy: None,
            user_agent: self.user_agent.clone(),
            viewport: self.viewport,
            javascript: self.javascript,
            chrome_args: self.chrome_args.clone(),
            chrome_path: self.chrome_path.as_ref().map(PathBuf::from),
            remote_url: self.remote_url.clone(),
        }
    }
}
