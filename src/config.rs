//! Configuration management for shelfscrape using the prefer crate.
//!
//! Settings are layered: built-in defaults, then a discovered or explicit
//! config file, then environment variables (credentials and proxy), then CLI
//! flags. The resulting [`Settings`] is immutable for the rest of the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scrapers::browser::{BrowserEngineConfig, ProxyConfig, Viewport};
use crate::scrapers::WaitUntil;

/// Listing page scraped by default.
pub const DEFAULT_TARGET_URL: &str = "https://www.santaisabel.cl/panaderia-y-pasteleria";

/// Slug looked up in the `supermarkets` table by default.
pub const DEFAULT_SUPERMARKET_SLUG: &str = "santa-isabel";

/// Default navigation and selector timeout (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 190;

/// Screenshot written when the page never becomes ready.
pub const DEFAULT_SCREENSHOT_PATH: &str = "screenshot_timeout.png";

pub const ENV_STORE_URL: &str = "SUPABASE_URL";
pub const ENV_STORE_KEY: &str = "SUPABASE_SERVICE_KEY";
pub const ENV_PROXY_HOST: &str = "PROXY_HOST";
pub const ENV_PROXY_PORT: &str = "PROXY_PORT";
pub const ENV_PROXY_USER: &str = "PROXY_USER";
pub const ENV_PROXY_PASS: &str = "PROXY_PASS";

/// Configuration errors detected before the browser is launched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid {field} URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid {field} selector '{selector}'")]
    InvalidSelector {
        field: &'static str,
        selector: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// CSS selectors for the listing markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectors {
    /// One element per product.
    pub card: String,
    /// Product name, relative to the card.
    pub name: String,
    /// Displayed price, relative to the card.
    pub price: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            card: ".product-card-wrap".to_string(),
            name: "p.product-card-name".to_string(),
            price: "span.prices-main-price".to_string(),
        }
    }
}

/// How the page loader waits for the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    /// Load-completion signal after navigation.
    pub wait_until: WaitUntil,
    /// Bound on navigation plus the load signal.
    pub navigation_timeout: Duration,
    /// Bound on the card selector wait.
    pub selector_timeout: Duration,
    /// Fixed pause after the load signal.
    pub settle_delay: Duration,
    /// Upper bound of the random extra pause added to `settle_delay`.
    pub jitter: Duration,
    /// Scroll through the page to trigger lazy loading.
    pub scroll: bool,
    /// Where the diagnostic screenshot goes on timeout.
    pub screenshot_path: PathBuf,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::NetworkIdle,
            navigation_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            selector_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            settle_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            scroll: false,
            screenshot_path: PathBuf::from(DEFAULT_SCREENSHOT_PATH),
        }
    }
}

impl LoadSettings {
    /// Settle delay plus a uniformly random share of the jitter budget.
    pub fn settle_pause<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.settle_delay;
        }
        self.settle_delay + Duration::from_millis(rng.random_range(0..=jitter_ms))
    }
}

/// PostgREST endpoint and service key.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

/// Application settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Listing page to scrape.
    pub target_url: String,
    /// Slug resolved to the supermarket id.
    pub supermarket_slug: String,
    pub selectors: Selectors,
    pub load: LoadSettings,
    pub browser: BrowserEngineConfig,
    /// Store credentials; required unless only inspecting.
    pub store: Option<StoreCredentials>,
    /// Exit non-zero when the run fails. Off by default: failures are reported
    /// and the process still exits 0.
    pub exit_on_failure: bool,
    /// Print the first card's markup and stop before touching the store.
    pub inspect: bool,
    /// First store variable found absent by [`Settings::apply_env`].
    pub missing_store_var: Option<&'static str>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            supermarket_slug: DEFAULT_SUPERMARKET_SLUG.to_string(),
            selectors: Selectors::default(),
            load: LoadSettings::default(),
            browser: BrowserEngineConfig::default(),
            store: None,
            exit_on_failure: false,
            inspect: false,
            missing_store_var: None,
        }
    }
}

impl Settings {
    /// Apply credentials and proxy from an environment lookup.
    ///
    /// The proxy is only enabled when host, port, user and password are all
    /// present; otherwise it is left off without complaint.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match (get(ENV_STORE_URL), get(ENV_STORE_KEY)) {
            (Some(url), Some(service_key)) => {
                self.store = Some(StoreCredentials { url, service_key });
                self.missing_store_var = None;
            }
            (None, _) => self.missing_store_var = Some(ENV_STORE_URL),
            (Some(_), None) => self.missing_store_var = Some(ENV_STORE_KEY),
        }

        if let (Some(host), Some(port), Some(username), Some(password)) = (
            get(ENV_PROXY_HOST),
            get(ENV_PROXY_PORT),
            get(ENV_PROXY_USER),
            get(ENV_PROXY_PASS),
        ) {
            self.browser.proxy = Some(ProxyConfig {
                host,
                port,
                username: Some(username),
                password: Some(password),
            });
        }
    }

    /// Check everything that can be checked before launching a browser.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.target_url).map_err(|source| ConfigError::InvalidUrl {
            field: "target",
            value: self.target_url.clone(),
            source,
        })?;

        for (field, selector) in [
            ("card", &self.selectors.card),
            ("name", &self.selectors.name),
            ("price", &self.selectors.price),
        ] {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ConfigError::InvalidSelector {
                    field,
                    selector: selector.clone(),
                });
            }
        }

        if self.inspect {
            return Ok(());
        }

        let store = self
            .store
            .as_ref()
            .ok_or(ConfigError::MissingEnv(
                self.missing_store_var.unwrap_or(ENV_STORE_URL),
            ))?;
        url::Url::parse(&store.url).map_err(|source| ConfigError::InvalidUrl {
            field: "store",
            value: store.url.clone(),
            source,
        })?;

        Ok(())
    }
}

/// Browser section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// "stealth" (default) or "standard".
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(default = "default_javascript")]
    pub javascript: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    /// Attach to an already running browser ("ws://localhost:9222").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

fn default_engine() -> String {
    "stealth".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_javascript() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            headless: default_headless(),
            user_agent: None,
            viewport: None,
            javascript: default_javascript(),
            chrome_args: Vec::new(),
            chrome_path: None,
            remote_url: None,
        }
    }
}

/// Configuration file structure. Every field overrides the built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supermarket_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until: Option<WaitUntil>,
    /// Navigation timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_timeout: Option<u64>,
    /// Selector wait timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_on_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserConfig>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers shelfscrape config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("shelfscrape").await {
            Ok(pref_config) => {
                let target_url: Option<String> = pref_config.get("target_url").await.ok();
                let supermarket_slug: Option<String> =
                    pref_config.get("supermarket_slug").await.ok();
                let card_selector: Option<String> = pref_config.get("card_selector").await.ok();
                let name_selector: Option<String> = pref_config.get("name_selector").await.ok();
                let price_selector: Option<String> = pref_config.get("price_selector").await.ok();
                let wait_until: Option<WaitUntil> = pref_config.get("wait_until").await.ok();
                let navigation_timeout: Option<u64> =
                    pref_config.get("navigation_timeout").await.ok();
                let selector_timeout: Option<u64> = pref_config.get("selector_timeout").await.ok();
                let settle_delay_ms: Option<u64> = pref_config.get("settle_delay_ms").await.ok();
                let jitter_ms: Option<u64> = pref_config.get("jitter_ms").await.ok();
                let scroll: Option<bool> = pref_config.get("scroll").await.ok();
                let screenshot_path: Option<String> =
                    pref_config.get("screenshot_path").await.ok();
                let exit_on_failure: Option<bool> = pref_config.get("exit_on_failure").await.ok();
                let browser: Option<BrowserConfig> = pref_config.get("browser").await.ok();

                let source_path = pref_config.source_path().cloned();

                Config {
                    target_url,
                    supermarket_slug,
                    card_selector,
                    name_selector,
                    price_selector,
                    wait_until,
                    navigation_timeout,
                    selector_timeout,
                    settle_delay_ms,
                    jitter_ms,
                    scroll,
                    screenshot_path,
                    exit_on_failure,
                    browser,
                    source_path,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Load configuration from a specific JSON file.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config: Config =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, if it came from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref url) = self.target_url {
            settings.target_url = url.clone();
        }
        if let Some(ref slug) = self.supermarket_slug {
            settings.supermarket_slug = slug.clone();
        }
        if let Some(ref selector) = self.card_selector {
            settings.selectors.card = selector.clone();
        }
        if let Some(ref selector) = self.name_selector {
            settings.selectors.name = selector.clone();
        }
        if let Some(ref selector) = self.price_selector {
            settings.selectors.price = selector.clone();
        }
        if let Some(wait_until) = self.wait_until {
            settings.load.wait_until = wait_until;
        }
        if let Some(secs) = self.navigation_timeout {
            settings.load.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.selector_timeout {
            settings.load.selector_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.settle_delay_ms {
            settings.load.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.jitter_ms {
            settings.load.jitter = Duration::from_millis(ms);
        }
        if let Some(scroll) = self.scroll {
            settings.load.scroll = scroll;
        }
        if let Some(ref path) = self.screenshot_path {
            settings.load.screenshot_path = self.resolve_path(path, base_dir);
        }
        if let Some(exit) = self.exit_on_failure {
            settings.exit_on_failure = exit;
        }
        if let Some(ref browser) = self.browser {
            // The proxy comes from the environment, never the file
            let proxy = settings.browser.proxy.take();
            settings.browser = browser.to_engine_config();
            settings.browser.proxy = proxy;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
}

/// Load settings: defaults, then config file, then environment.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<Settings, ConfigError> {
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env(|key| std::env::var(key).ok());

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_match_listing() {
        let settings = Settings::default();
        assert_eq!(settings.target_url, DEFAULT_TARGET_URL);
        assert_eq!(settings.supermarket_slug, "santa-isabel");
        assert_eq!(settings.selectors.card, ".product-card-wrap");
        assert_eq!(settings.load.wait_until, WaitUntil::NetworkIdle);
        assert_eq!(settings.load.navigation_timeout, Duration::from_secs(190));
        assert_eq!(
            settings.load.screenshot_path,
            PathBuf::from("screenshot_timeout.png")
        );
        assert!(!settings.exit_on_failure);
    }

    #[test]
    fn test_settle_pause_stays_within_jitter() {
        use rand::SeedableRng;

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut load = LoadSettings::default();
        assert_eq!(load.settle_pause(&mut rng), Duration::ZERO);

        load.settle_delay = Duration::from_millis(2000);
        assert_eq!(load.settle_pause(&mut rng), Duration::from_millis(2000));

        load.jitter = Duration::from_millis(1500);
        for _ in 0..50 {
            let pause = load.settle_pause(&mut rng);
            assert!(pause >= Duration::from_millis(2000));
            assert!(pause <= Duration::from_millis(3500));
        }
    }

    #[test]
    fn test_proxy_requires_all_four_variables() {
        let vars = env(&[
            (ENV_PROXY_HOST, "proxy.example.net"),
            (ENV_PROXY_PORT, "8080"),
            (ENV_PROXY_USER, "scraper"),
        ]);
        let mut settings = Settings::default();
        settings.apply_env(|k| vars.get(k).cloned());
        assert!(settings.browser.proxy.is_none());

        let vars = env(&[
            (ENV_PROXY_HOST, "proxy.example.net"),
            (ENV_PROXY_PORT, "8080"),
            (ENV_PROXY_USER, "scraper"),
            (ENV_PROXY_PASS, "hunter2"),
        ]);
        let mut settings = Settings::default();
        settings.apply_env(|k| vars.get(k).cloned());
        let proxy = settings.browser.proxy.expect("proxy enabled");
        assert_eq!(proxy.server(), "http://proxy.example.net:8080");
        assert_eq!(proxy.username.as_deref(), Some("scraper"));
    }

    #[test]
    fn test_store_credentials_from_env() {
        let vars = env(&[
            (ENV_STORE_URL, "https://abc.supabase.co"),
            (ENV_STORE_KEY, "service-role-key"),
        ]);
        let mut settings = Settings::default();
        settings.apply_env(|k| vars.get(k).cloned());

        let store = settings.store.as_ref().unwrap();
        assert_eq!(store.url, "https://abc.supabase.co");
        assert!(!format!("{:?}", store).contains("service-role-key"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_store_unless_inspecting() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingEnv(ENV_STORE_URL))
        ));

        settings.inspect = true;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_names_the_absent_store_variable() {
        let vars = env(&[(ENV_STORE_URL, "https://abc.supabase.co")]);
        let mut settings = Settings::default();
        settings.apply_env(|k| vars.get(k).cloned());
        assert!(settings.store.is_none());
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingEnv(ENV_STORE_KEY))
        ));

        let vars = env(&[(ENV_STORE_KEY, "service-role-key")]);
        let mut settings = Settings::default();
        settings.apply_env(|k| vars.get(k).cloned());
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingEnv(ENV_STORE_URL))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_selector() {
        let mut settings = Settings::default();
        settings.inspect = true;
        settings.selectors.price = "span..prices[".to_string();

        match settings.validate() {
            Err(ConfigError::InvalidSelector { field, .. }) => assert_eq!(field, "price"),
            other => panic!("expected invalid selector, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_config_overrides() {
        let config: Config = serde_json::from_str(
            r#"{
                "supermarket_slug": "jumbo",
                "wait_until": "dom-content-loaded",
                "settle_delay_ms": 3000,
                "jitter_ms": 1500,
                "scroll": true,
                "screenshot_path": "debug/timeout.png",
                "exit_on_failure": true,
                "browser": {
                    "engine": "standard",
                    "user_agent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
                    "viewport": { "width": 1920, "height": 1080 }
                }
            }"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/srv/scrape"));

        assert_eq!(settings.supermarket_slug, "jumbo");
        assert_eq!(settings.load.wait_until, WaitUntil::DomContentLoaded);
        assert_eq!(settings.load.settle_delay, Duration::from_millis(3000));
        assert_eq!(settings.load.jitter, Duration::from_millis(1500));
        assert!(settings.load.scroll);
        assert_eq!(
            settings.load.screenshot_path,
            PathBuf::from("/srv/scrape/debug/timeout.png")
        );
        assert!(settings.exit_on_failure);
        assert_eq!(
            settings.browser.viewport,
            Some(Viewport {
                width: 1920,
                height: 1080
            })
        );
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelfscrape.json");
        std::fs::write(&path, r#"{ "target_url": "https://example.com/bakery" }"#).unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(
            config.target_url.as_deref(),
            Some("https://example.com/bakery")
        );
        assert_eq!(config.base_dir(), Some(dir.path().to_path_buf()));

        let settings = load_settings_with_options(LoadOptions {
            config_path: Some(path),
            use_cwd: false,
        })
        .await
        .unwrap();
        assert_eq!(settings.target_url, "https://example.com/bakery");
    }

    #[tokio::test]
    async fn test_load_from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from_path(&path).await,
            Err(ConfigError::Parse { .. })
        ));
    }
}
