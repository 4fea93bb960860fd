//! Page and card seams used by the scrape service.
//!
//! The service only talks to these traits, so the chromiumoxide-backed
//! [`BrowserSession`](super::browser::BrowserSession) can be swapped for an
//! in-memory page in tests.

use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LoadSettings;

/// Errors surfaced by the browser collaborator.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser support not compiled; rebuild with --features browser")]
    Unsupported,

    #[error(
        "Chrome/Chromium not found. Install it (e.g. `apt install chromium`) \
         or set browser.chrome_path"
    )]
    ChromeNotFound,

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: String,
        after: Duration,
    },

    #[error("browser did not answer a DevTools request in time")]
    ProtocolTimeout,

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout { .. } | BrowserError::ProtocolTimeout
        )
    }
}

/// Load-completion signal to wait for after navigating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitUntil {
    /// `load` event fired (`document.readyState === 'complete'`).
    Load,
    /// `DOMContentLoaded` fired.
    DomContentLoaded,
    /// Load complete and no new resource entries for [`NETWORK_IDLE_WINDOW`].
    #[default]
    NetworkIdle,
}

/// Quiet period with no new resource entries that counts as network idle.
pub const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "dom-content-loaded",
            WaitUntil::NetworkIdle => "network-idle",
        }
    }

    /// JavaScript expression that evaluates to `true` once the document has
    /// reached this signal. The `about:blank` guard keeps the probe from
    /// answering for the placeholder page before navigation commits.
    pub fn ready_probe(&self) -> &'static str {
        match self {
            WaitUntil::DomContentLoaded => {
                "document.location.href !== 'about:blank' && \
                 (document.readyState === 'interactive' || document.readyState === 'complete')"
            }
            WaitUntil::Load | WaitUntil::NetworkIdle => {
                "document.location.href !== 'about:blank' && document.readyState === 'complete'"
            }
        }
    }
}

impl FromStr for WaitUntil {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "load" => Ok(WaitUntil::Load),
            "dom-content-loaded" | "domcontentloaded" => Ok(WaitUntil::DomContentLoaded),
            "network-idle" | "networkidle" => Ok(WaitUntil::NetworkIdle),
            other => Err(format!(
                "unknown wait policy '{}' (expected load, dom-content-loaded or network-idle)",
                other
            )),
        }
    }
}

/// Script returning the number of resource timing entries seen so far.
pub const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

/// Tracks resource counts between polls to decide when the network went quiet.
#[derive(Debug)]
pub struct NetworkIdleTracker {
    window: Duration,
    last_count: Option<u64>,
    stable_since: Option<Instant>,
}

impl NetworkIdleTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_count: None,
            stable_since: None,
        }
    }

    /// Record a poll result. Returns true once the count has not changed for
    /// the whole window.
    pub fn observe(&mut self, count: u64, now: Instant) -> bool {
        if self.last_count != Some(count) {
            self.last_count = Some(count);
            self.stable_since = Some(now);
            return false;
        }

        match self.stable_since {
            Some(since) => now.duration_since(since) >= self.window,
            None => {
                self.stable_since = Some(now);
                false
            }
        }
    }
}

/// One product card on the listing page.
#[async_trait]
pub trait ProductCard: Send + Sync {
    /// Inner text of the first descendant matching `selector`, or `None` when
    /// nothing matches.
    async fn child_text(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// Raw markup of the card, used when re-deriving selectors.
    async fn inner_html(&self) -> Result<String, BrowserError>;
}

/// A browser page that can be driven to the listing and queried for cards.
#[async_trait]
pub trait ProductPage: Send + Sync {
    type Card: ProductCard;

    /// Navigate to `url` and wait until `wait_for_selector` is present,
    /// following the signal, settle and scroll steps in `options`.
    ///
    /// Any exhausted wait yields [`BrowserError::Timeout`].
    async fn load(
        &mut self,
        url: &str,
        wait_for_selector: &str,
        options: &LoadSettings,
    ) -> Result<(), BrowserError>;

    /// All elements currently matching `selector`.
    async fn cards(&self, selector: &str) -> Result<Vec<Self::Card>, BrowserError>;

    /// Write a full-page PNG screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;

    /// Release the page and its browser.
    async fn close(&mut self);
}
