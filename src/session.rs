use crate::browser::ChromeDriver;
use crate::core::{BrowserDriver, LaunchConfig};
use crate::diagnostics::{self, DiagnosticsConfig};
use crate::errors::{HarvestError, Result};
use crate::pagination::Paginator;
use crate::types::{JobConfig, JobResult, PageResult};
use std::time::Instant;
use url::Url;

/// Owns one browser instance and one page for the lifetime of a single job
/// invocation. The browser is closed exactly once, on every exit path.
pub struct SessionManager<B: BrowserDriver> {
    driver: B,
    session_id: String,
}

impl SessionManager<ChromeDriver> {
    pub fn chrome() -> Self {
        Self::new(ChromeDriver::new())
    }
}

impl<B: BrowserDriver> SessionManager<B> {
    pub fn new(driver: B) -> Self {
        Self {
            driver,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub async fn run(mut self, config: &JobConfig) -> Result<JobResult> {
        validate(config)?;

        let diagnostics = DiagnosticsConfig::from_job(config);
        diagnostics.ensure_dir().await;

        tracing::info!(session = %self.session_id, url = %config.url, "starting job");
        self.driver.launch(&LaunchConfig::from_job(config)).await?;
        let started = Instant::now();

        let outcome = self.drive(config, &diagnostics).await;

        if let Err(e) = self.driver.close().await {
            tracing::warn!(session = %self.session_id, error = %e, "browser close failed");
        }

        let results = outcome?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let summary = diagnostics::summarize(&results);
        let success = results.iter().any(PageResult::is_success);
        tracing::info!(
            session = %self.session_id,
            pages = results.len(),
            action_errors = summary.total_errors,
            elapsed_ms,
            "job finished"
        );

        Ok(JobResult {
            success,
            pages_visited: results.len() as u32,
            elapsed_ms,
            results,
            summary,
        })
    }

    async fn drive(
        &self,
        config: &JobConfig,
        diagnostics: &DiagnosticsConfig,
    ) -> Result<Vec<PageResult>> {
        let page = self.driver.new_page().await?;
        if let Err(e) = self.driver.install_page_diagnostics(&page).await {
            tracing::debug!(error = %e, "page diagnostics unavailable");
        }

        let outcome = Paginator::new(&self.driver, &page, config, diagnostics)
            .run()
            .await;

        if let Err(e) = &outcome {
            tracing::error!(session = %self.session_id, error = %e, "job failed");
            diagnostics::capture_failure(&self.driver, &page, "fatal", diagnostics).await;
        }
        outcome
    }
}

/// Reject malformed configs before any browser resource is acquired.
pub fn validate(config: &JobConfig) -> Result<()> {
    if config.url.trim().is_empty() {
        return Err(HarvestError::Validation("url is required".to_string()));
    }
    let parsed = Url::parse(&config.url)
        .map_err(|e| HarvestError::Validation(format!("invalid url {}: {}", config.url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HarvestError::Validation(format!(
            "url scheme must be http or https, got {}",
            parsed.scheme()
        )));
    }
    if let Some(pagination) = &config.pagination {
        if pagination.next_selector.trim().is_empty() {
            return Err(HarvestError::Validation(
                "pagination.nextSelector is required".to_string(),
            ));
        }
        if pagination.max_pages == Some(0) {
            return Err(HarvestError::Validation(
                "pagination.maxPages must be positive".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{linked_pages, FakeDriver};
    use crate::types::{Action, ActionKind, Pagination};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("page_harvester=debug")
            .with_test_writer()
            .try_init();
    }

    fn extract_items() -> Action {
        Action::named(
            ActionKind::Extract {
                selector: ".item".to_string(),
                attribute: None,
                html: false,
                as_number: false,
            },
            "items",
        )
    }

    #[test]
    fn validate_rejects_bad_urls_and_page_ceilings() {
        assert!(validate(&JobConfig::new("https://example.com")).is_ok());
        assert!(validate(&JobConfig::new("")).is_err());
        assert!(validate(&JobConfig::new("ftp://example.com")).is_err());
        assert!(validate(&JobConfig::new("not a url")).is_err());

        let mut config = JobConfig::new("https://example.com");
        config.pagination = Some(Pagination {
            next_selector: ".next".to_string(),
            max_pages: Some(0),
            delay_ms: None,
        });
        assert!(matches!(
            validate(&config),
            Err(HarvestError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_failure_acquires_no_browser() {
        let driver = FakeDriver::single_page("Only", "<p>hi</p>");
        let probe = driver.clone();
        let result = SessionManager::new(driver).run(&JobConfig::new("")).await;
        assert!(matches!(result, Err(HarvestError::Validation(_))));
        assert!(!probe.launched());
        assert!(!probe.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_action_list_yields_one_titled_result() {
        let driver = FakeDriver::single_page("Landing", "<p>hi</p>");
        let probe = driver.clone();
        let config = JobConfig::new("https://fixture.test/page1");
        let result = SessionManager::new(driver).run(&config).await.unwrap();

        assert!(result.success);
        assert_eq!(result.pages_visited, 1);
        assert_eq!(result.results.len(), 1);
        let page = &result.results[0];
        assert!(page.is_success());
        assert!(page.errors.is_empty());
        assert_eq!(page.fields["title"], serde_json::json!("Landing"));
        assert!(probe.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn two_page_extract_scenario_matches_counts() {
        init_tracing();
        let driver = FakeDriver::new(linked_pages(2, 3));
        let mut config = JobConfig::new("https://fixture.test/page1");
        config.actions = vec![extract_items()];
        config.pagination = Some(Pagination {
            next_selector: ".next".to_string(),
            max_pages: Some(2),
            delay_ms: Some(0),
        });

        let result = SessionManager::new(driver).run(&config).await.unwrap();
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].fields["items"].as_array().unwrap().len(), 3);
        assert_eq!(result.results[1].fields["items"].as_array().unwrap().len(), 3);
        assert_eq!(result.summary.total_items_extracted, 6);
        assert_eq!(result.summary.fields, vec!["items".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_runs_are_structurally_identical() {
        let mut config = JobConfig::new("https://fixture.test/page1");
        config.actions = vec![extract_items()];
        config.pagination = Some(Pagination {
            next_selector: ".next".to_string(),
            max_pages: None,
            delay_ms: Some(0),
        });

        let first = SessionManager::new(FakeDriver::new(linked_pages(3, 2)))
            .run(&config)
            .await
            .unwrap();
        let second = SessionManager::new(FakeDriver::new(linked_pages(3, 2)))
            .run(&config)
            .await
            .unwrap();

        assert_eq!(first.results.len(), second.results.len());
        for (a, b) in first.results.iter().zip(&second.results) {
            assert_eq!(a.page, b.page);
            assert_eq!(a.url, b.url);
            let keys_a: Vec<_> = a.fields.keys().collect();
            let keys_b: Vec<_> = b.fields.keys().collect();
            assert_eq!(keys_a, keys_b);
            assert_eq!(a.fields["items"], b.fields["items"]);
        }
        assert_eq!(
            first.summary.total_items_extracted,
            second.summary.total_items_extracted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn browser_closes_even_when_every_page_errors() {
        let driver = FakeDriver::single_page("Only", "<p>hi</p>");
        let probe = driver.clone();
        let config = JobConfig::new("https://fixture.test/unreachable");
        let result = SessionManager::new(driver).run(&config).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.results.len(), 1);
        assert!(result.results[0].page_error.is_some());
        assert!(probe.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn error_screenshots_land_in_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::single_page("Landing", "<p>hi</p>");
        let mut config = JobConfig::new("https://fixture.test/page1");
        config.actions = vec![Action::new(ActionKind::Click {
            selector: "#missing".to_string(),
        })];
        config.screenshot_on_error = true;
        config.screenshot_dir = Some(dir.path().to_string_lossy().into_owned());

        let result = SessionManager::new(driver).run(&config).await.unwrap();
        assert_eq!(result.summary.total_errors, 1);

        let captures: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("error-page1-action0-"));
    }
}
