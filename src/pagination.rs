use crate::core::BrowserDriver;
use crate::diagnostics::{self, DiagnosticsConfig};
use crate::errors::HarvestError;
use crate::interpreter;
use crate::types::{JobConfig, PageResult, Pagination, DEFAULT_DELAY_MS};
use serde_json::Map;
use std::time::Duration;

/// Bounded wait for one of the post-click completion signals.
const ADVANCE_WAIT_MS: u64 = 5_000;
const URL_POLL_INTERVAL_MS: u64 = 50;

/// First completion signal observed after clicking the next element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceSignal {
    Navigated,
    UrlChanged,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStatus {
    Ready,
    Absent,
    Disabled,
}

/// How a page failed. Critical-action re-raises always fall through to the
/// next-page check; only other page-level failures are subject to the
/// timeout-class halt.
#[derive(Debug)]
enum PageFailure {
    Critical(HarvestError),
    Other(HarvestError),
}

impl PageFailure {
    fn error(&self) -> &HarvestError {
        match self {
            PageFailure::Critical(e) | PageFailure::Other(e) => e,
        }
    }
}

/// Drives the multi-page loop: initial navigation, per-page interpretation,
/// next-page detection and navigation, and the termination policy.
pub struct Paginator<'a, B: BrowserDriver> {
    driver: &'a B,
    page: &'a B::Page,
    config: &'a JobConfig,
    diagnostics: &'a DiagnosticsConfig,
}

impl<'a, B: BrowserDriver> Paginator<'a, B> {
    pub fn new(
        driver: &'a B,
        page: &'a B::Page,
        config: &'a JobConfig,
        diagnostics: &'a DiagnosticsConfig,
    ) -> Self {
        Self {
            driver,
            page,
            config,
            diagnostics,
        }
    }

    pub async fn run(&self) -> crate::errors::Result<Vec<PageResult>> {
        let mut results = Vec::new();
        let mut page_number: u32 = 1;

        loop {
            let (result, failure) = self.process_page(page_number).await;
            let halt = matches!(&failure, Some(PageFailure::Other(e)) if e.is_timeout());
            results.push(result);

            if halt {
                tracing::warn!(page_number, "timeout-class page error, stopping pagination");
                break;
            }

            let Some(pagination) = &self.config.pagination else {
                break;
            };
            if page_number >= pagination.page_ceiling() {
                tracing::debug!(page_number, "page ceiling reached");
                break;
            }
            match self.check_next(pagination).await {
                NextStatus::Absent => {
                    tracing::debug!(page_number, "next element absent, done");
                    break;
                }
                NextStatus::Disabled => {
                    tracing::debug!(page_number, "next element disabled, done");
                    break;
                }
                NextStatus::Ready => {}
            }
            if !self.advance(pagination).await {
                break;
            }
            page_number += 1;
        }

        Ok(results)
    }

    /// One page: initial navigation (page 1 only) plus action interpretation.
    /// Failures, critical-action re-raises included, become an error
    /// PageResult here instead of aborting the job.
    async fn process_page(&self, page_number: u32) -> (PageResult, Option<PageFailure>) {
        tracing::debug!(page_number, "processing page");
        let mut fields = Map::new();
        let mut errors = Vec::new();

        let navigated = if page_number == 1 {
            self.navigate_first().await
        } else {
            Ok(())
        };
        let outcome = match navigated {
            Ok(()) => interpreter::run_actions(
                self.driver,
                self.page,
                &self.config.actions,
                page_number,
                self.diagnostics,
                &mut fields,
                &mut errors,
            )
            .await
            .map_err(PageFailure::Critical),
            Err(e) => Err(PageFailure::Other(e)),
        };

        let url = self.driver.url(self.page).await.unwrap_or_default();
        let mut result = PageResult {
            page: page_number,
            url,
            timestamp: chrono::Utc::now(),
            fields,
            errors,
            page_error: None,
        };

        match outcome {
            Ok(()) => (result, None),
            Err(failure) => {
                diagnostics::capture_failure(
                    self.driver,
                    self.page,
                    &format!("page{}", page_number),
                    self.diagnostics,
                )
                .await;
                result.page_error = Some(failure.error().to_string());
                (result, Some(failure))
            }
        }
    }

    async fn navigate_first(&self) -> crate::errors::Result<()> {
        self.driver.navigate(self.page, &self.config.url).await?;
        if let Some(wait) = &self.config.wait_for {
            if let Some(selector) = &wait.selector {
                self.driver
                    .wait_for_selector(
                        self.page,
                        selector,
                        self.config.operation_timeout_ms(),
                        false,
                    )
                    .await?;
            }
            if let Some(delay) = wait.delay_ms {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
        Ok(())
    }

    /// Absence stops the loop without error. A present element in any
    /// disabled state (disabled attribute, "disabled" class,
    /// aria-disabled="true", hidden styling) stops it too.
    async fn check_next(&self, pagination: &Pagination) -> NextStatus {
        match self.driver.probe(self.page, &pagination.next_selector).await {
            Ok(probe) if !probe.present => NextStatus::Absent,
            Ok(probe) if probe.disabled => NextStatus::Disabled,
            Ok(_) => NextStatus::Ready,
            Err(e) => {
                tracing::warn!(error = %e, "next-element probe failed, stopping");
                NextStatus::Absent
            }
        }
    }

    /// Click the next element and wait for the first completion signal. Not
    /// observing any signal within the bound is tolerated. Returns false
    /// only when the click itself fails and the loop cannot advance.
    async fn advance(&self, pagination: &Pagination) -> bool {
        let previous_url = self.driver.url(self.page).await.unwrap_or_default();
        if let Err(e) = self.driver.click(self.page, &pagination.next_selector).await {
            tracing::warn!(error = %e, "next-element click failed, stopping");
            return false;
        }

        let signal =
            await_page_advance(self.driver, self.page, &previous_url, ADVANCE_WAIT_MS).await;
        tracing::debug!(?signal, "next page advance");

        let settle = pagination.delay_ms.unwrap_or(DEFAULT_DELAY_MS);
        tokio::time::sleep(Duration::from_millis(settle)).await;
        true
    }
}

/// Race navigation settling against a URL-change poll, bounded by
/// `timeout_ms`; the bound elapsing is itself the fallback signal.
pub async fn await_page_advance<B: BrowserDriver>(
    driver: &B,
    page: &B::Page,
    previous_url: &str,
    timeout_ms: u64,
) -> AdvanceSignal {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    tokio::select! {
        nav = driver.wait_for_navigation(page, timeout_ms) => match nav {
            Ok(()) => AdvanceSignal::Navigated,
            Err(_) => AdvanceSignal::TimedOut,
        },
        signal = async {
            loop {
                if tokio::time::Instant::now() >= deadline {
                    return AdvanceSignal::TimedOut;
                }
                if let Ok(url) = driver.url(page).await {
                    if url != previous_url {
                        return AdvanceSignal::UrlChanged;
                    }
                }
                tokio::time::sleep(Duration::from_millis(URL_POLL_INTERVAL_MS)).await;
            }
        } => signal,
    }
}
