//! Scrape command.

use std::process::ExitCode;

use console::style;
use tracing::info;

use crate::config::{ConfigError, Settings};
use crate::repository::{PostgrestRepository, PriceStore, UnconfiguredStore};
use crate::scrapers::BrowserSession;
use crate::services::{RunOutcome, ScrapeError, ScrapeService};

/// Run one scrape and report the outcome.
///
/// Failures are printed; the exit status only reflects them when
/// `exit_on_failure` is set.
pub async fn cmd_scrape(settings: &Settings) -> anyhow::Result<ExitCode> {
    let result = scrape(settings).await;
    let failed = report(&result);
    Ok(exit_status(failed, settings.exit_on_failure))
}

/// Report a config file that could not be loaded.
///
/// The file's own `exit_on_failure` was never read, so only `--strict-exit`
/// decides the status here.
pub fn cmd_config_failure(error: ConfigError, strict_exit: bool) -> ExitCode {
    let failed = report(&Err(ScrapeError::Config(error)));
    exit_status(failed, strict_exit)
}

fn exit_status(failed: bool, exit_on_failure: bool) -> ExitCode {
    if failed && exit_on_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn scrape(settings: &Settings) -> Result<RunOutcome, ScrapeError> {
    settings.validate()?;

    match &settings.store {
        Some(credentials) => {
            let store = PostgrestRepository::new(credentials).map_err(ScrapeError::StoreSetup)?;
            scrape_with(settings, &store).await
        }
        None => scrape_with(settings, &UnconfiguredStore).await,
    }
}

async fn scrape_with<S: PriceStore>(
    settings: &Settings,
    store: &S,
) -> Result<RunOutcome, ScrapeError> {
    let mut session = BrowserSession::launch(&settings.browser, settings.load.navigation_timeout)
        .await
        .map_err(ScrapeError::Launch)?;
    info!("Browser launched, navigating to {}", settings.target_url);

    ScrapeService::new(settings, store).run(&mut session).await
}

/// Print status lines for a finished run. Returns whether it failed.
fn report(result: &Result<RunOutcome, ScrapeError>) -> bool {
    match result {
        Ok(RunOutcome::Inserted { count, extraction }) => {
            println!(
                "{} Inserted {} prices ({} cards, {} skipped)",
                style("✓").green(),
                count,
                extraction.cards,
                extraction.skipped
            );
            false
        }
        Ok(RunOutcome::InsertRejected { message, extraction }) => {
            println!(
                "{} Store rejected {} prices: {}",
                style("✗").red(),
                extraction.products,
                message
            );
            true
        }
        Ok(RunOutcome::SkippedEmpty { extraction }) => {
            println!(
                "{} No valid products found ({} cards, {} skipped), nothing inserted",
                style("!").yellow(),
                extraction.cards,
                extraction.skipped
            );
            false
        }
        Ok(RunOutcome::Inspected { html: Some(html) }) => {
            println!("\n{}", style("First product card").bold());
            println!("{}", "-".repeat(60));
            println!("{}", html.trim());
            println!("{}", "-".repeat(60));
            false
        }
        Ok(RunOutcome::Inspected { html: None }) => {
            println!("{} No product cards matched", style("!").yellow());
            false
        }
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            if let ScrapeError::NavigationTimeout { screenshot, .. } = e {
                match screenshot {
                    Some(path) => {
                        println!("  {} Screenshot saved to {}", style("→").dim(), path.display())
                    }
                    None => println!("  {} No screenshot could be saved", style("→").dim()),
                }
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::BrowserError;
    use crate::services::ExtractionSummary;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_report_classifies_outcomes() {
        let extraction = ExtractionSummary {
            cards: 3,
            products: 2,
            skipped: 1,
        };

        assert!(!report(&Ok(RunOutcome::Inserted {
            count: 2,
            extraction
        })));
        assert!(!report(&Ok(RunOutcome::SkippedEmpty { extraction })));
        assert!(!report(&Ok(RunOutcome::Inspected { html: None })));
        assert!(report(&Ok(RunOutcome::InsertRejected {
            message: "permission denied for table prices".to_string(),
            extraction
        })));
        assert!(report(&Err(ScrapeError::NavigationTimeout {
            source: BrowserError::Timeout {
                waiting_for: "selector .product-card-wrap".to_string(),
                after: Duration::from_secs(190),
            },
            screenshot: Some(PathBuf::from("screenshot_timeout.png")),
        })));
        assert!(report(&Err(ScrapeError::Config(ConfigError::MissingEnv(
            "SUPABASE_URL"
        )))));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_launch() {
        let settings = Settings::default();
        let result = scrape(&settings).await;
        assert!(matches!(
            result,
            Err(ScrapeError::Config(ConfigError::MissingEnv("SUPABASE_URL")))
        ));
    }

    #[tokio::test]
    async fn test_exit_status_follows_policy() {
        let mut settings = Settings::default();
        settings.target_url = "not a url".to_string();

        // Fails validation either way; only the strict run exits non-zero.
        let lenient = cmd_scrape(&settings).await.unwrap();
        assert_eq!(format!("{:?}", lenient), format!("{:?}", ExitCode::SUCCESS));

        settings.exit_on_failure = true;
        let strict = cmd_scrape(&settings).await.unwrap();
        assert_eq!(format!("{:?}", strict), format!("{:?}", ExitCode::FAILURE));
    }
}
