//! Command-line interface.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use crate::config::{load_settings_with_options, LoadOptions, Settings};
use crate::scrapers::{Viewport, WaitUntil};

/// Scrape product prices from a supermarket listing into a PostgREST store.
#[derive(Debug, Parser)]
#[command(name = "shelfscrape", version, about)]
pub struct Cli {
    /// Config file (defaults to auto-discovered shelfscrape config)
    #[arg(long, short = 'c', env = "SHELFSCRAPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Resolve relative paths against the working directory
    #[arg(long)]
    pub cwd: bool,

    /// Listing page to scrape
    #[arg(long)]
    pub url: Option<String>,

    /// Supermarket slug to resolve in the store
    #[arg(long)]
    pub slug: Option<String>,

    /// Load signal: load, dom-content-loaded or network-idle
    #[arg(long)]
    pub wait_until: Option<WaitUntil>,

    /// Navigation timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub navigation_timeout: Option<u64>,

    /// Product selector timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub selector_timeout: Option<u64>,

    /// Fixed pause after the page loads, in milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Random extra pause up to this many milliseconds
    #[arg(long, value_name = "MS")]
    pub jitter_ms: Option<u64>,

    /// Scroll the page before waiting for products
    #[arg(long)]
    pub scroll: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Override the browser user agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Viewport as WIDTHxHEIGHT
    #[arg(long)]
    pub viewport: Option<Viewport>,

    /// Disable JavaScript on the page
    #[arg(long)]
    pub no_js: bool,

    /// Connect to a running Chrome instead of launching one
    #[arg(long, env = "BROWSER_URL")]
    pub remote_url: Option<String>,

    /// Chrome or Chromium binary
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Where to save the screenshot taken on timeout
    #[arg(long)]
    pub screenshot: Option<PathBuf>,

    /// Print the first product card's HTML and exit without storing anything
    #[arg(long)]
    pub inspect: bool,

    /// Exit with status 1 when the run fails
    #[arg(long)]
    pub strict_exit: bool,

    /// Verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(url) = &self.url {
            settings.target_url = url.clone();
        }
        if let Some(slug) = &self.slug {
            settings.supermarket_slug = slug.clone();
        }

        let load = &mut settings.load;
        if let Some(wait_until) = self.wait_until {
            load.wait_until = wait_until;
        }
        if let Some(secs) = self.navigation_timeout {
            load.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.selector_timeout {
            load.selector_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.settle_ms {
            load.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.jitter_ms {
            load.jitter = Duration::from_millis(ms);
        }
        if self.scroll {
            load.scroll = true;
        }
        if let Some(path) = &self.screenshot {
            load.screenshot_path = path.clone();
        }

        let browser = &mut settings.browser;
        if self.headful {
            browser.headless = false;
        }
        if let Some(ua) = &self.user_agent {
            browser.user_agent = Some(ua.clone());
        }
        if let Some(viewport) = self.viewport {
            browser.viewport = Some(viewport);
        }
        if self.no_js {
            browser.javascript = false;
        }
        if let Some(url) = &self.remote_url {
            browser.remote_url = Some(url.clone());
        }
        if let Some(path) = &self.chrome_path {
            browser.chrome_path = Some(path.clone());
        }

        if self.inspect {
            settings.inspect = true;
        }
        if self.strict_exit {
            settings.exit_on_failure = true;
        }
    }
}

/// Load settings, apply flags and run the scrape.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = match load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
        use_cwd: cli.cwd,
    })
    .await
    {
        Ok(settings) => settings,
        Err(e) => return Ok(commands::cmd_config_failure(e, cli.strict_exit)),
    };
    cli.apply_to_settings(&mut settings);

    commands::cmd_scrape(&settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::parse_from([
            "shelfscrape",
            "--url",
            "https://example.cl/panaderia",
            "--slug",
            "lider",
            "--wait-until",
            "load",
            "--navigation-timeout",
            "30",
            "--settle-ms",
            "2000",
            "--jitter-ms",
            "1500",
            "--viewport",
            "1366x768",
            "--headful",
            "--no-js",
            "--strict-exit",
        ]);

        let mut settings = Settings::default();
        cli.apply_to_settings(&mut settings);

        assert_eq!(settings.target_url, "https://example.cl/panaderia");
        assert_eq!(settings.supermarket_slug, "lider");
        assert_eq!(settings.load.wait_until, WaitUntil::Load);
        assert_eq!(settings.load.navigation_timeout, Duration::from_secs(30));
        assert_eq!(settings.load.settle_delay, Duration::from_millis(2000));
        assert_eq!(settings.load.jitter, Duration::from_millis(1500));
        assert_eq!(
            settings.browser.viewport,
            Some(Viewport {
                width: 1366,
                height: 768
            })
        );
        assert!(!settings.browser.headless);
        assert!(!settings.browser.javascript);
        assert!(settings.exit_on_failure);
    }

    #[test]
    fn test_no_flags_keep_settings() {
        let cli = Cli::parse_from(["shelfscrape"]);
        let mut settings = Settings::default();
        cli.apply_to_settings(&mut settings);

        let defaults = Settings::default();
        assert_eq!(settings.target_url, defaults.target_url);
        assert_eq!(settings.load, defaults.load);
        assert!(settings.browser.headless);
        assert!(!settings.inspect);
        assert!(!settings.exit_on_failure);
    }

    #[tokio::test]
    async fn test_unreadable_config_file_follows_exit_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let path = path.to_string_lossy().to_string();

        let lenient = run(Cli::parse_from(["shelfscrape", "--config", path.as_str()]))
            .await
            .unwrap();
        assert_eq!(format!("{:?}", lenient), format!("{:?}", ExitCode::SUCCESS));

        let strict = run(Cli::parse_from([
            "shelfscrape",
            "--config",
            path.as_str(),
            "--strict-exit",
        ]))
        .await
        .unwrap();
        assert_eq!(format!("{:?}", strict), format!("{:?}", ExitCode::FAILURE));
    }

    #[test]
    fn test_bad_viewport_is_rejected() {
        assert!(Cli::try_parse_from(["shelfscrape", "--viewport", "wide"]).is_err());
    }
}
