use crate::errors::Result;
use crate::types::{BrowserOptions, JobConfig, Viewport, DEFAULT_USER_AGENT};
use async_trait::async_trait;
use serde_json::Value;

/// Capability interface over a browser-automation backend. The interpreter
/// and pagination controller only ever talk to this trait, so both run
/// unchanged against the fixture-backed driver in [`crate::testing`].
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    type Page: Send + Sync;

    /// Launch the browser instance for this invocation.
    async fn launch(&mut self, config: &LaunchConfig) -> Result<()>;

    /// Open the single page the job runs against.
    async fn new_page(&self) -> Result<Self::Page>;

    /// Navigate and wait for the load to settle.
    async fn navigate(&self, page: &Self::Page, url: &str) -> Result<()>;

    /// Block until an in-flight navigation settles, bounded by `timeout_ms`.
    async fn wait_for_navigation(&self, page: &Self::Page, timeout_ms: u64) -> Result<()>;

    /// Wait for a selector to match, bounded by `timeout_ms`.
    async fn wait_for_selector(
        &self,
        page: &Self::Page,
        selector: &str,
        timeout_ms: u64,
        visible: bool,
    ) -> Result<()>;

    async fn click(&self, page: &Self::Page, selector: &str) -> Result<()>;

    /// Focus the element, clear its current content, then enter `text`.
    async fn type_text(&self, page: &Self::Page, selector: &str, text: &str) -> Result<()>;

    /// Run a script in page context and return its JSON value.
    async fn evaluate(&self, page: &Self::Page, script: &str) -> Result<Value>;

    /// Snapshot every element matching `selector`.
    async fn query_all(&self, page: &Self::Page, selector: &str) -> Result<Vec<ElementSnapshot>>;

    /// Presence and disabled-state check without waiting.
    async fn probe(&self, page: &Self::Page, selector: &str) -> Result<ElementProbe>;

    async fn scroll(&self, page: &Self::Page, target: &ScrollTarget) -> Result<()>;

    /// Capture an image of the page; JPEG when `quality` is set, else PNG.
    async fn screenshot(
        &self,
        page: &Self::Page,
        full_page: bool,
        quality: Option<u8>,
    ) -> Result<Vec<u8>>;

    async fn url(&self, page: &Self::Page) -> Result<String>;

    async fn title(&self, page: &Self::Page) -> Result<String>;

    /// Install log-only hooks for page-level script errors. Never fatal.
    async fn install_page_diagnostics(&self, _page: &Self::Page) -> Result<()> {
        Ok(())
    }

    /// Close the browser. Must be safe to call on every exit path.
    async fn close(&mut self) -> Result<()>;
}

/// Launch options after merging fixed headless defaults with the
/// caller-supplied [`BrowserOptions`].
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: String,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

impl LaunchConfig {
    pub fn from_job(config: &JobConfig) -> Self {
        let BrowserOptions {
            headless,
            viewport,
            user_agent,
            args,
        } = config.browser.clone();

        Self {
            headless,
            viewport,
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            args,
            timeout_ms: config.operation_timeout_ms(),
        }
    }
}

/// What an extract sees of one matched element.
#[derive(Debug, Clone, Default)]
pub struct ElementSnapshot {
    pub text: String,
    pub html: String,
    pub attributes: std::collections::HashMap<String, String>,
}

impl ElementSnapshot {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Presence and interactability of a single element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementProbe {
    pub present: bool,
    /// Disabled attribute, "disabled" class, aria-disabled="true", or
    /// hidden/invisible inline styling.
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrollTarget {
    Bottom,
    Selector(String),
    Position { x: f64, y: f64 },
}
