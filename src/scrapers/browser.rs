//! Browser session for anti-bot protected listing pages.
//!
//! Uses chromiumoxide (CDP) with stealth evasion techniques, an optional
//! authenticated upstream proxy, user agent and viewport overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
#[cfg(feature = "browser")]
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::auth::Credentials;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetScriptExecutionDisabledParams,
};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::handler::HandlerConfig;
#[cfg(feature = "browser")]
use chromiumoxide::page::ScreenshotParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Element, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

use super::page::{BrowserError, ProductCard, ProductPage};
#[cfg(feature = "browser")]
use super::page::{NetworkIdleTracker, WaitUntil, NETWORK_IDLE_WINDOW, RESOURCE_COUNT_SCRIPT};
use crate::config::LoadSettings;

/// User agent presented by the stealth engine when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Interval between readiness and selector polls.
#[cfg(feature = "browser")]
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Browser engine type.
    #[serde(default)]
    pub engine: BrowserEngineType,

    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Upstream proxy, enabled from the environment.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,

    /// User agent override.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Viewport override.
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Allow page scripts to run (default: true).
    #[serde(default = "default_javascript")]
    pub javascript: bool,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Explicit Chrome executable; searched for when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_javascript() -> bool {
    true
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngineType::default(),
            headless: default_headless(),
            proxy: None,
            user_agent: None,
            viewport: None,
            javascript: default_javascript(),
            chrome_args: Vec::new(),
            chrome_path: None,
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    /// User agent to install on the page, if any.
    pub fn effective_user_agent(&self) -> Option<&str> {
        match (&self.user_agent, &self.engine) {
            (Some(ua), _) => Some(ua.as_str()),
            (None, BrowserEngineType::Stealth) => Some(DEFAULT_USER_AGENT),
            (None, BrowserEngineType::Standard) => None,
        }
    }

    /// A remote browser keeps its own launch flags, so the proxy cannot apply.
    pub fn proxy_ignored(&self) -> bool {
        self.remote_url.is_some() && self.proxy.is_some()
    }

    /// Chrome command line arguments for this configuration.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(ref proxy) = self.proxy {
            args.push(format!("--proxy-server={}", proxy.server()));
        }

        if let Some(viewport) = self.viewport {
            args.push(format!(
                "--window-size={},{}",
                viewport.width, viewport.height
            ));
        }

        if self.engine == BrowserEngineType::Stealth {
            args.extend(
                [
                    "--disable-blink-features=AutomationControlled",
                    "--disable-infobars",
                    "--no-first-run",
                    "--no-default-browser-check",
                    "--disable-background-networking",
                    "--disable-sync",
                    "--disable-translate",
                    "--metrics-recording-only",
                    "--safebrowsing-disable-auto-update",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
        }

        // Needed for headless in containers
        args.extend(
            [
                "--disable-dev-shm-usage",
                "--no-sandbox",
                "--disable-gpu",
                "--disable-software-rasterizer",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        args.extend(self.chrome_args.iter().cloned());
        args
    }
}

/// Browser engine types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngineType {
    /// Stealth patches injected before any page script (default).
    #[default]
    Stealth,

    /// No stealth patches (for debugging).
    Standard,
}

/// Upstream HTTP proxy.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Value for Chrome's `--proxy-server` flag.
    pub fn server(&self) -> String {
        if self.host.contains("://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Viewport {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `1366x768`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("invalid viewport '{}', expected WIDTHxHEIGHT", s))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid viewport width '{}': {}", w, e))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid viewport height '{}': {}", h, e))?;
        if width == 0 || height == 0 {
            return Err(format!("viewport must be non-zero, got '{}'", s));
        }
        Ok(Viewport { width, height })
    }
}

/// Stealth evasion JavaScript installed before any page script runs.
/// Based on puppeteer-extra-plugin-stealth techniques.
#[cfg(feature = "browser")]
const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Fix chrome object
    r#"
    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Fix permissions
    r#"
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
    );
    "#,
    // Look like regular Chrome with plugins
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });
    "#,
    // The listing is Chilean; match a local shopper
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['es-CL', 'es', 'en-US', 'en'],
        configurable: true
    });
    "#,
    // WebGL vendor/renderer
    r#"
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) {
            return 'Intel Inc.';
        }
        if (parameter === 37446) {
            return 'Intel Iris OpenGL Engine';
        }
        return getParameter.call(this, parameter);
    };
    "#,
];

/// Scrolls to the bottom in steps to trigger lazy-loaded cards, then back up.
/// Resolves to the number of steps taken.
#[cfg(feature = "browser")]
const SCROLL_SCRIPT: &str = r#"
    (async () => {
        const scrollStep = 600;
        const scrollDelay = 250;
        const maxScrolls = 40;
        let scrollCount = 0;

        while (scrollCount < maxScrolls) {
            window.scrollBy(0, scrollStep);
            await new Promise(r => setTimeout(r, scrollDelay));
            scrollCount++;
            const height = document.documentElement.scrollHeight;
            if (window.scrollY + window.innerHeight >= height - 100) {
                break;
            }
        }

        window.scrollTo(0, 0);
        return scrollCount;
    })()
"#;

#[cfg(feature = "browser")]
impl From<CdpError> for BrowserError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::Timeout => BrowserError::ProtocolTimeout,
            other => BrowserError::Protocol(other.to_string()),
        }
    }
}

/// A launched browser with the single page used for the run.
#[cfg(feature = "browser")]
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
    remote: bool,
    closed: bool,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    /// Find a Chrome executable on well-known paths, then in `PATH`.
    fn find_chrome(config: &BrowserEngineConfig) -> Result<PathBuf, BrowserError> {
        if let Some(ref path) = config.chrome_path {
            return Ok(path.clone());
        }

        for path in Self::CHROME_PATHS {
            let p = Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(path) = which::which(cmd) {
                info!("Found Chrome in PATH: {}", path.display());
                return Ok(path);
            }
        }

        Err(BrowserError::ChromeNotFound)
    }

    /// Launch (or attach to) a browser and prepare the page.
    ///
    /// `request_timeout` bounds each DevTools command, navigation included.
    pub async fn launch(
        config: &BrowserEngineConfig,
        request_timeout: Duration,
    ) -> Result<Self, BrowserError> {
        let (mut browser, mut handler, remote) = match config.remote_url {
            Some(ref url) => {
                if config.proxy_ignored() {
                    warn!("Proxy settings are ignored when attaching to a remote browser");
                }
                let ws_url = Self::remote_ws_url(url).await?;
                info!("Connecting to remote browser at {}", ws_url);
                let handler_config = HandlerConfig {
                    request_timeout,
                    ..Default::default()
                };
                let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?;
                (browser, handler, true)
            }
            None => {
                info!(
                    "Launching browser (headless={}, engine={:?}, proxy={})",
                    config.headless,
                    config.engine,
                    config.proxy.is_some()
                );
                let chrome_path = Self::find_chrome(config)?;
                let mut builder = ChromeConfig::builder()
                    .chrome_executable(chrome_path)
                    .request_timeout(request_timeout);

                // with_head means NOT headless
                if !config.headless {
                    builder = builder.with_head();
                }
                for arg in config.launch_args() {
                    builder = builder.arg(arg);
                }

                let chrome_config = builder.build().map_err(BrowserError::Launch)?;
                let (browser, handler) = Browser::launch(chrome_config)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?;
                (browser, handler, false)
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if !remote {
                    let _ = browser.close().await;
                }
                handler.abort();
                return Err(BrowserError::Launch(e.to_string()));
            }
        };

        let mut session = Self {
            browser,
            page,
            handler,
            remote,
            closed: false,
        };

        if let Err(e) = session.prepare_page(config).await {
            session.close().await;
            return Err(BrowserError::Launch(e.to_string()));
        }

        Ok(session)
    }

    /// Resolve the DevTools WebSocket URL from a `ws://host:port` endpoint.
    async fn remote_ws_url(url: &str) -> Result<String, BrowserError> {
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::get(&version_url)
            .await
            .map_err(|e| BrowserError::Launch(format!("remote browser unreachable: {}", e)))?
            .json()
            .await
            .map_err(|e| BrowserError::Launch(format!("bad browser version info: {}", e)))?;

        resp.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Launch("no webSocketDebuggerUrl in response".into()))
    }

    /// Install context overrides before the first navigation.
    async fn prepare_page(&self, config: &BrowserEngineConfig) -> Result<(), BrowserError> {
        if let Some(user_agent) = config.effective_user_agent() {
            debug!("User agent: {}", user_agent);
            self.page
                .execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
                .await?;
        }

        if let Some(viewport) = config.viewport {
            debug!("Viewport: {}x{}", viewport.width, viewport.height);
            self.page
                .execute(SetDeviceMetricsOverrideParams::new(
                    viewport.width as i64,
                    viewport.height as i64,
                    1.0,
                    false,
                ))
                .await?;
        }

        if !config.javascript {
            debug!("Disabling page JavaScript");
            self.page
                .execute(SetScriptExecutionDisabledParams::new(true))
                .await?;
        }

        if let Some(ref proxy) = config.proxy {
            if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
                debug!("Answering proxy auth challenges as {}", username);
                self.page
                    .authenticate(Credentials {
                        username: username.clone(),
                        password: password.clone(),
                    })
                    .await?;
            }
        }

        if config.engine == BrowserEngineType::Stealth {
            debug!("Installing {} stealth scripts", STEALTH_SCRIPTS.len());
            for script in STEALTH_SCRIPTS {
                self.page
                    .execute(AddScriptToEvaluateOnNewDocumentParams::new(*script))
                    .await?;
            }
        }

        Ok(())
    }

    /// Evaluate a boolean probe, treating evaluation errors (e.g. a context
    /// destroyed mid-navigation) as "not yet".
    async fn probe(&self, script: &str) -> bool {
        match self.page.evaluate(script.to_string()).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(e) => {
                debug!("Ready probe failed: {}", e);
                false
            }
        }
    }

    async fn navigate_and_wait(&self, url: &str, wait_until: WaitUntil) -> Result<(), BrowserError> {
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Navigation)?;

        let response = self.page.execute(nav_params).await?;
        if let Some(ref error_text) = response.result.error_text {
            return Err(BrowserError::Navigation(format!("{}: {}", url, error_text)));
        }

        while !self.probe(wait_until.ready_probe()).await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        if wait_until == WaitUntil::NetworkIdle {
            let mut tracker = NetworkIdleTracker::new(NETWORK_IDLE_WINDOW);
            loop {
                let count = match self.page.evaluate(RESOURCE_COUNT_SCRIPT).await {
                    Ok(result) => result.into_value::<u64>().unwrap_or(0),
                    Err(e) => {
                        debug!("Resource count unavailable: {}", e);
                        0
                    }
                };
                if tracker.observe(count, Instant::now()) {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }

        Ok(())
    }

    /// Run the scroll simulation. Failures are logged, not fatal.
    async fn simulate_scroll(&self) {
        match self.page.evaluate(SCROLL_SCRIPT).await {
            Ok(result) => {
                let steps: u64 = result.into_value().unwrap_or(0);
                debug!("Scrolled {} steps", steps);
            }
            Err(e) => warn!("Scroll simulation failed: {}", e),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        debug!("Waiting for selector: {}", selector);
        let wait = async {
            loop {
                match self.page.find_elements(selector).await {
                    Ok(found) if !found.is_empty() => return,
                    Ok(_) => {}
                    Err(e) => debug!("Selector query failed: {}", e),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BrowserError::Timeout {
                waiting_for: format!("selector {}", selector),
                after: timeout,
            })
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl ProductPage for BrowserSession {
    type Card = BrowserCard;

    async fn load(
        &mut self,
        url: &str,
        wait_for_selector: &str,
        options: &LoadSettings,
    ) -> Result<(), BrowserError> {
        info!(
            "Navigating to {} (wait until {})",
            url,
            options.wait_until.as_str()
        );

        tokio::time::timeout(
            options.navigation_timeout,
            self.navigate_and_wait(url, options.wait_until),
        )
        .await
        .map_err(|_| BrowserError::Timeout {
            waiting_for: format!("{} on {}", options.wait_until.as_str(), url),
            after: options.navigation_timeout,
        })??;
        info!("Page loaded");

        let pause = options.settle_pause(&mut rand::rng());
        if !pause.is_zero() {
            debug!("Settling for {:?}", pause);
            tokio::time::sleep(pause).await;
        }

        if options.scroll {
            self.simulate_scroll().await;
        }

        self.wait_for_selector(wait_for_selector, options.selector_timeout)
            .await
    }

    async fn cards(&self, selector: &str) -> Result<Vec<BrowserCard>, BrowserError> {
        let elements = self.page.find_elements(selector).await?;
        Ok(elements
            .into_iter()
            .map(|element| BrowserCard { element })
            .collect())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let _ = self.page.clone().close().await;
        if !self.remote {
            if let Err(e) = self.browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
        debug!("Browser session released");
    }
}

/// A product card element on the live page.
#[cfg(feature = "browser")]
pub struct BrowserCard {
    element: Element,
}

#[cfg(feature = "browser")]
#[async_trait]
impl ProductCard for BrowserCard {
    async fn child_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let children = self.element.find_elements(selector).await?;
        match children.first() {
            Some(child) => Ok(Some(child.inner_text().await?.unwrap_or_default())),
            None => Ok(None),
        }
    }

    async fn inner_html(&self) -> Result<String, BrowserError> {
        Ok(self.element.inner_html().await?.unwrap_or_default())
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserSession;

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub async fn launch(
        _config: &BrowserEngineConfig,
        _request_timeout: std::time::Duration,
    ) -> Result<Self, BrowserError> {
        Err(BrowserError::Unsupported)
    }
}

#[cfg(not(feature = "browser"))]
pub enum BrowserCard {}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl ProductCard for BrowserCard {
    async fn child_text(&self, _selector: &str) -> Result<Option<String>, BrowserError> {
        match *self {}
    }

    async fn inner_html(&self) -> Result<String, BrowserError> {
        match *self {}
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl ProductPage for BrowserSession {
    type Card = BrowserCard;

    async fn load(
        &mut self,
        _url: &str,
        _wait_for_selector: &str,
        _options: &LoadSettings,
    ) -> Result<(), BrowserError> {
        Err(BrowserError::Unsupported)
    }

    async fn cards(&self, _selector: &str) -> Result<Vec<BrowserCard>, BrowserError> {
        Err(BrowserError::Unsupported)
    }

    async fn screenshot(&self, _path: &Path) -> Result<(), BrowserError> {
        Err(BrowserError::Unsupported)
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> ProxyConfig {
        ProxyConfig {
            host: "gate.example.net".to_string(),
            port: "7000".to_string(),
            username: Some("user-cl".to_string()),
            password: Some("s3cret".to_string()),
        }
    }

    #[test]
    fn test_viewport_parsing() {
        assert_eq!(
            "1366x768".parse::<Viewport>(),
            Ok(Viewport {
                width: 1366,
                height: 768
            })
        );
        assert_eq!(
            " 1920 X 1080 ".parse::<Viewport>(),
            Ok(Viewport {
                width: 1920,
                height: 1080
            })
        );
        assert!("1366".parse::<Viewport>().is_err());
        assert!("0x768".parse::<Viewport>().is_err());
        assert!("widexhigh".parse::<Viewport>().is_err());
    }

    #[test]
    fn test_proxy_server_and_redaction() {
        let proxy = proxy();
        assert_eq!(proxy.server(), "http://gate.example.net:7000");
        assert!(proxy.has_credentials());
        assert!(!format!("{:?}", proxy).contains("s3cret"));

        let socks = ProxyConfig {
            host: "socks5://127.0.0.1".to_string(),
            port: "1080".to_string(),
            username: None,
            password: None,
        };
        assert_eq!(socks.server(), "socks5://127.0.0.1:1080");
        assert!(!socks.has_credentials());
    }

    #[test]
    fn test_launch_args_include_proxy_and_window() {
        let config = BrowserEngineConfig {
            proxy: Some(proxy()),
            viewport: Some(Viewport {
                width: 1280,
                height: 720,
            }),
            chrome_args: vec!["--lang=es-CL".to_string()],
            ..Default::default()
        };

        let args = config.launch_args();
        assert!(args.contains(&"--proxy-server=http://gate.example.net:7000".to_string()));
        assert!(args.contains(&"--window-size=1280,720".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--lang=es-CL"));
        // Credentials never go on the command line
        assert!(!args.iter().any(|a| a.contains("s3cret")));
    }

    #[test]
    fn test_proxy_ignored_only_on_remote_attach() {
        let local = BrowserEngineConfig {
            proxy: Some(proxy()),
            ..Default::default()
        };
        assert!(!local.proxy_ignored());

        let remote = BrowserEngineConfig {
            proxy: Some(proxy()),
            remote_url: Some("ws://localhost:9222".to_string()),
            ..Default::default()
        };
        assert!(remote.proxy_ignored());

        let remote_direct = BrowserEngineConfig {
            remote_url: Some("ws://localhost:9222".to_string()),
            ..Default::default()
        };
        assert!(!remote_direct.proxy_ignored());
    }

    #[cfg(feature = "browser")]
    #[test]
    fn test_devtools_timeout_counts_as_timeout() {
        assert!(BrowserError::from(CdpError::Timeout).is_timeout());
        assert!(!BrowserError::from(CdpError::NotFound).is_timeout());
    }

    #[test]
    fn test_standard_engine_skips_stealth() {
        let config = BrowserEngineConfig {
            engine: BrowserEngineType::Standard,
            ..Default::default()
        };
        assert!(!config
            .launch_args()
            .iter()
            .any(|a| a.contains("AutomationControlled")));
        assert_eq!(config.effective_user_agent(), None);

        let stealth = BrowserEngineConfig::default();
        assert_eq!(stealth.effective_user_agent(), Some(DEFAULT_USER_AGENT));

        let custom = BrowserEngineConfig {
            engine: BrowserEngineType::Standard,
            user_agent: Some("Mozilla/5.0 (iPhone)".to_string()),
            ..Default::default()
        };
        assert_eq!(custom.effective_user_agent(), Some("Mozilla/5.0 (iPhone)"));
    }
}
