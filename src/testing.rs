//! Fixture-backed driver for testing jobs without a live browser.
//!
//! Fixture pages are plain HTML parsed with `scraper`; clicking an anchor
//! with an `href` pointing at another fixture's URL navigates to it, which
//! is enough to exercise the whole pagination loop deterministically.

use crate::core::{BrowserDriver, ElementProbe, ElementSnapshot, LaunchConfig, ScrollTarget};
use crate::errors::{HarvestError, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FixturePage {
    pub url: String,
    pub title: String,
    pub html: String,
}

/// Chained fixture set: `n` pages of `items_per_page` `.item` nodes each,
/// linked by a `.next` anchor on every page but the last.
pub fn linked_pages(n: usize, items_per_page: usize) -> Vec<FixturePage> {
    (1..=n)
        .map(|page| {
            let mut html = String::new();
            for item in 1..=items_per_page {
                html.push_str(&format!(r#"<div class="item">item {}-{}</div>"#, page, item));
            }
            if page < n {
                html.push_str(&format!(
                    r#"<a class="next" href="https://fixture.test/page{}">next</a>"#,
                    page + 1
                ));
            }
            FixturePage {
                url: format!("https://fixture.test/page{}", page),
                title: format!("Page {}", page),
                html,
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct FakeState {
    current: usize,
    launched: bool,
    closed: bool,
    navigation_pending: bool,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    scripts: Vec<String>,
    scrolls: Vec<ScrollTarget>,
    screenshots: usize,
    eval_results: HashMap<String, Value>,
}

/// Page handle of the fake driver; the driver itself tracks which fixture
/// is current, mirroring the one-page-per-job model.
#[derive(Debug, Clone, Copy)]
pub struct FakePage;

#[derive(Clone)]
pub struct FakeDriver {
    pages: Arc<Vec<FixturePage>>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new(pages: Vec<FixturePage>) -> Self {
        assert!(!pages.is_empty(), "FakeDriver needs at least one fixture page");
        Self {
            pages: Arc::new(pages),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn single_page(title: &str, html: &str) -> Self {
        Self::new(vec![FixturePage {
            url: "https://fixture.test/page1".to_string(),
            title: title.to_string(),
            html: html.to_string(),
        }])
    }

    /// Canned result for an exact `evaluate` script.
    pub fn with_eval_result(self, script: &str, value: Value) -> Self {
        self.lock().eval_results.insert(script.to_string(), value);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> &FixturePage {
        let index = self.lock().current;
        // new() guarantees at least one page.
        &self.pages[index.min(self.pages.len() - 1)]
    }

    pub fn current_url(&self) -> String {
        self.current().url.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.lock().typed.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.lock().scripts.clone()
    }

    pub fn scrolls(&self) -> Vec<ScrollTarget> {
        self.lock().scrolls.clone()
    }

    pub fn screenshots_taken(&self) -> usize {
        self.lock().screenshots
    }

    pub fn launched(&self) -> bool {
        self.lock().launched
    }

    pub fn closed(&self) -> bool {
        self.lock().closed
    }

    fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector)
            .map_err(|e| HarvestError::DriverError(format!("bad selector {}: {}", selector, e)))
    }

    fn with_document<T>(&self, f: impl FnOnce(&Html) -> T) -> T {
        let document = Html::parse_document(&self.current().html);
        f(&document)
    }

    fn element_disabled(element: &scraper::ElementRef<'_>) -> bool {
        let value = element.value();
        let style = value.attr("style").unwrap_or("").replace(' ', "");
        value.attr("disabled").is_some()
            || value.attr("hidden").is_some()
            || value.attr("aria-disabled") == Some("true")
            || value
                .attr("class")
                .map(|c| c.split_whitespace().any(|c| c == "disabled"))
                .unwrap_or(false)
            || style.contains("display:none")
            || style.contains("visibility:hidden")
    }

    /// Anchor href of the first match, when it points at a known fixture.
    fn click_destination(&self, selector: &str, parsed: &Selector) -> Result<Option<usize>> {
        self.with_document(|document| {
            let element = document
                .select(parsed)
                .next()
                .ok_or_else(|| HarvestError::ElementNotFound(selector.to_string()))?;
            let Some(href) = element.value().attr("href") else {
                return Ok(None);
            };
            Ok(self.pages.iter().position(|p| p.url == href))
        })
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    type Page = FakePage;

    async fn launch(&mut self, _config: &LaunchConfig) -> Result<()> {
        self.lock().launched = true;
        Ok(())
    }

    async fn new_page(&self) -> Result<Self::Page> {
        Ok(FakePage)
    }

    async fn navigate(&self, _page: &Self::Page, url: &str) -> Result<()> {
        let index = self
            .pages
            .iter()
            .position(|p| p.url == url)
            .ok_or_else(|| HarvestError::NavigationFailed(format!("no fixture for {}", url)))?;
        let mut state = self.lock();
        state.current = index;
        state.navigation_pending = false;
        Ok(())
    }

    async fn wait_for_navigation(&self, _page: &Self::Page, timeout_ms: u64) -> Result<()> {
        {
            let mut state = self.lock();
            if state.navigation_pending {
                state.navigation_pending = false;
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
        Err(HarvestError::Timeout("navigation".to_string()))
    }

    async fn wait_for_selector(
        &self,
        _page: &Self::Page,
        selector: &str,
        _timeout_ms: u64,
        _visible: bool,
    ) -> Result<()> {
        let parsed = Self::parse_selector(selector)?;
        let present = self.with_document(|document| document.select(&parsed).next().is_some());
        if present {
            Ok(())
        } else {
            Err(HarvestError::Timeout(format!("selector {}", selector)))
        }
    }

    async fn click(&self, _page: &Self::Page, selector: &str) -> Result<()> {
        let parsed = Self::parse_selector(selector)?;
        let destination = self.click_destination(selector, &parsed)?;
        let mut state = self.lock();
        state.clicks.push(selector.to_string());
        if let Some(index) = destination {
            state.current = index;
            state.navigation_pending = true;
        }
        Ok(())
    }

    async fn type_text(&self, _page: &Self::Page, selector: &str, text: &str) -> Result<()> {
        let parsed = Self::parse_selector(selector)?;
        let present = self.with_document(|document| document.select(&parsed).next().is_some());
        if !present {
            return Err(HarvestError::ElementNotFound(selector.to_string()));
        }
        self.lock()
            .typed
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn evaluate(&self, _page: &Self::Page, script: &str) -> Result<Value> {
        let mut state = self.lock();
        state.scripts.push(script.to_string());
        Ok(state.eval_results.get(script).cloned().unwrap_or(Value::Null))
    }

    async fn query_all(&self, _page: &Self::Page, selector: &str) -> Result<Vec<ElementSnapshot>> {
        let parsed = Self::parse_selector(selector)?;
        self.with_document(|document| {
            Ok(document
                .select(&parsed)
                .map(|element| ElementSnapshot {
                    text: element.text().collect::<String>().trim().to_string(),
                    html: element.inner_html(),
                    attributes: element
                        .value()
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                })
                .collect())
        })
    }

    async fn probe(&self, _page: &Self::Page, selector: &str) -> Result<ElementProbe> {
        let parsed = Self::parse_selector(selector)?;
        self.with_document(|document| {
            Ok(match document.select(&parsed).next() {
                None => ElementProbe::default(),
                Some(element) => ElementProbe {
                    present: true,
                    disabled: Self::element_disabled(&element),
                },
            })
        })
    }

    async fn scroll(&self, _page: &Self::Page, target: &ScrollTarget) -> Result<()> {
        self.lock().scrolls.push(target.clone());
        Ok(())
    }

    async fn screenshot(
        &self,
        _page: &Self::Page,
        _full_page: bool,
        _quality: Option<u8>,
    ) -> Result<Vec<u8>> {
        self.lock().screenshots += 1;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn url(&self, _page: &Self::Page) -> Result<String> {
        Ok(self.current_url())
    }

    async fn title(&self, _page: &Self::Page) -> Result<String> {
        Ok(self.current().title.clone())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.closed = true;
        state.launched = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn click_through_linked_fixtures_navigates() {
        let driver = FakeDriver::new(linked_pages(2, 1));
        let page = driver.new_page().await.unwrap();
        driver
            .navigate(&page, "https://fixture.test/page1")
            .await
            .unwrap();
        driver.click(&page, ".next").await.unwrap();
        assert_eq!(driver.url(&page).await.unwrap(), "https://fixture.test/page2");
        assert!(driver.wait_for_navigation(&page, 10).await.is_ok());
    }

    #[tokio::test]
    async fn probe_reports_disabled_states() {
        let driver = FakeDriver::single_page(
            "Probes",
            r##"<a class="next disabled" href="#">a</a>
                <button id="off" disabled>b</button>
                <a id="aria" aria-disabled="true" href="#">c</a>
                <a id="hidden" style="display: none" href="#">d</a>
                <a id="live" href="#">e</a>"##,
        );
        let page = driver.new_page().await.unwrap();
        for selector in [".next", "#off", "#aria", "#hidden"] {
            let probe = driver.probe(&page, selector).await.unwrap();
            assert!(probe.present && probe.disabled, "selector {}", selector);
        }
        let live = driver.probe(&page, "#live").await.unwrap();
        assert!(live.present && !live.disabled);
        let gone = driver.probe(&page, "#missing").await.unwrap();
        assert!(!gone.present);
    }

    #[test]
    #[should_panic(expected = "at least one fixture page")]
    fn empty_fixture_set_is_rejected() {
        let _ = FakeDriver::new(Vec::new());
    }

    #[test]
    fn screenshot_returns_png_bytes() {
        let driver = FakeDriver::single_page("Shots", "<p>x</p>");
        let page = tokio_test::block_on(driver.new_page()).unwrap();
        let bytes = tokio_test::block_on(driver.screenshot(&page, false, None)).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        assert_eq!(driver.screenshots_taken(), 1);
    }

    #[tokio::test]
    async fn query_all_snapshots_text_html_and_attributes() {
        let driver = FakeDriver::single_page(
            "Snapshots",
            r#"<div class="row" data-id="7"><b>bold</b> text </div>"#,
        );
        let page = driver.new_page().await.unwrap();
        let snapshots = driver.query_all(&page, ".row").await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].text, "bold text");
        assert_eq!(snapshots[0].html, "<b>bold</b> text ");
        assert_eq!(snapshots[0].attribute("data-id"), Some("7"));
    }
}
