use crate::core::{BrowserDriver, ElementProbe, ElementSnapshot, LaunchConfig, ScrollTarget};
use crate::errors::{HarvestError, Result};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

/// Production driver over headless Chrome.
pub struct ChromeDriver {
    browser: Option<Browser>,
    default_timeout_ms: u64,
}

impl ChromeDriver {
    pub fn new() -> Self {
        Self {
            browser: None,
            default_timeout_ms: crate::types::DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }

    /// Quote a value for splicing into page-context scripts.
    fn js_str(value: &str) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
    }

    fn eval_json<T: serde::de::DeserializeOwned>(tab: &Arc<Tab>, script: &str) -> Result<T> {
        let result = tab
            .evaluate(script, false)
            .map_err(|e| HarvestError::ScriptFailed(e.to_string()))?;
        let raw = result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| HarvestError::ScriptFailed("script returned no value".to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl Default for ChromeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, serde::Deserialize)]
struct SnapshotPayload {
    text: String,
    html: String,
    attributes: HashMap<String, String>,
}

#[derive(Debug, serde::Deserialize)]
struct ProbePayload {
    present: bool,
    disabled: bool,
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    type Page = Arc<Tab>;

    async fn launch(&mut self, config: &LaunchConfig) -> Result<()> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );
        let user_agent_arg = format!("--user-agent={}", config.user_agent);

        // Fixed defaults for containerized headless runs, caller args appended.
        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
            OsStr::new(&user_agent_arg),
        ];
        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .build()
            .map_err(|e| HarvestError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| HarvestError::LaunchFailed(e.to_string()))?;

        self.browser = Some(browser);
        self.default_timeout_ms = config.timeout_ms;
        tracing::debug!(headless = config.headless, "chrome launched");
        Ok(())
    }

    async fn new_page(&self) -> Result<Self::Page> {
        let browser = self.browser.as_ref().ok_or(HarvestError::NotLaunched)?;
        let tab = browser
            .new_tab()
            .map_err(|e| HarvestError::PageCreationFailed(e.to_string()))?;
        tab.set_default_timeout(Duration::from_millis(self.default_timeout_ms));
        Ok(tab)
    }

    async fn navigate(&self, page: &Self::Page, url: &str) -> Result<()> {
        page.navigate_to(url)
            .map_err(|e| HarvestError::NavigationFailed(e.to_string()))?;
        page.wait_until_navigated()
            .map_err(|e| HarvestError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_navigation(&self, page: &Self::Page, timeout_ms: u64) -> Result<()> {
        // wait_until_navigated blocks; keep it off the runtime thread so
        // concurrent signals (URL polling, fallback delay) stay live.
        let tab = Arc::clone(page);
        let wait = tokio::task::spawn_blocking(move || {
            tab.wait_until_navigated()
                .map(|_| ())
                .map_err(|e| HarvestError::Timeout(format!("navigation: {}", e)))
        });
        match tokio::time::timeout(Duration::from_millis(timeout_ms), wait).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join)) => Err(HarvestError::DriverError(join.to_string())),
            Err(_) => Err(HarvestError::Timeout(format!(
                "navigation after {}ms",
                timeout_ms
            ))),
        }
    }

    async fn wait_for_selector(
        &self,
        page: &Self::Page,
        selector: &str,
        timeout_ms: u64,
        visible: bool,
    ) -> Result<()> {
        let element = page
            .wait_for_element_with_custom_timeout(selector, Duration::from_millis(timeout_ms))
            .map_err(|e| HarvestError::Timeout(format!("selector {}: {}", selector, e)))?;

        if visible {
            let shown = element
                .call_js_fn(
                    "function() { return !!(this.offsetWidth || this.offsetHeight \
                     || this.getClientRects().length); }",
                    vec![],
                    false,
                )
                .map_err(|e| HarvestError::ScriptFailed(e.to_string()))?;
            if shown.value != Some(Value::Bool(true)) {
                return Err(HarvestError::ElementNotFound(format!(
                    "{} (present but not visible)",
                    selector
                )));
            }
        }
        Ok(())
    }

    async fn click(&self, page: &Self::Page, selector: &str) -> Result<()> {
        let element = page
            .wait_for_element_with_custom_timeout(
                selector,
                Duration::from_millis(crate::types::DEFAULT_WAIT_TIMEOUT_MS),
            )
            .map_err(|e| HarvestError::Timeout(format!("selector {}: {}", selector, e)))?;
        element
            .click()
            .map_err(|e| HarvestError::DriverError(e.to_string()))?;
        Ok(())
    }

    async fn type_text(&self, page: &Self::Page, selector: &str, text: &str) -> Result<()> {
        let element = page
            .wait_for_element_with_custom_timeout(
                selector,
                Duration::from_millis(crate::types::DEFAULT_WAIT_TIMEOUT_MS),
            )
            .map_err(|e| HarvestError::Timeout(format!("selector {}: {}", selector, e)))?;
        element
            .click()
            .map_err(|e| HarvestError::DriverError(e.to_string()))?;
        // Full-select-then-replace so existing content never survives.
        element
            .call_js_fn(
                "function() { if (this.select) { this.select(); } this.value = ''; }",
                vec![],
                false,
            )
            .map_err(|e| HarvestError::ScriptFailed(e.to_string()))?;
        page.type_str(text)
            .map_err(|e| HarvestError::DriverError(e.to_string()))?;
        Ok(())
    }

    async fn evaluate(&self, page: &Self::Page, script: &str) -> Result<Value> {
        let result = page
            .evaluate(script, false)
            .map_err(|e| HarvestError::ScriptFailed(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    async fn query_all(&self, page: &Self::Page, selector: &str) -> Result<Vec<ElementSnapshot>> {
        let script = format!(
            r#"JSON.stringify(Array.from(document.querySelectorAll({sel})).map(el => ({{
                text: (el.textContent || '').trim(),
                html: el.innerHTML,
                attributes: Object.fromEntries(
                    Array.from(el.attributes).map(a => [a.name, a.value]))
            }})))"#,
            sel = Self::js_str(selector)
        );
        let payloads: Vec<SnapshotPayload> = Self::eval_json(page, &script)?;
        Ok(payloads
            .into_iter()
            .map(|p| ElementSnapshot {
                text: p.text,
                html: p.html,
                attributes: p.attributes,
            })
            .collect())
    }

    async fn probe(&self, page: &Self::Page, selector: &str) -> Result<ElementProbe> {
        let script = format!(
            r#"JSON.stringify((() => {{
                const el = document.querySelector({sel});
                if (!el) return {{ present: false, disabled: false }};
                const style = window.getComputedStyle ? window.getComputedStyle(el) : null;
                const hidden = !!el.hidden
                    || (style && (style.display === 'none' || style.visibility === 'hidden'));
                const disabled = el.hasAttribute('disabled')
                    || el.classList.contains('disabled')
                    || el.getAttribute('aria-disabled') === 'true'
                    || !!hidden;
                return {{ present: true, disabled: disabled }};
            }})())"#,
            sel = Self::js_str(selector)
        );
        let payload: ProbePayload = Self::eval_json(page, &script)?;
        Ok(ElementProbe {
            present: payload.present,
            disabled: payload.disabled,
        })
    }

    async fn scroll(&self, page: &Self::Page, target: &ScrollTarget) -> Result<()> {
        let script = match target {
            ScrollTarget::Bottom => {
                "window.scrollTo(0, document.body.scrollHeight)".to_string()
            }
            ScrollTarget::Selector(selector) => format!(
                r#"(() => {{
                    const el = document.querySelector({sel});
                    if (el) el.scrollIntoView({{ block: 'center' }});
                }})()"#,
                sel = Self::js_str(selector)
            ),
            ScrollTarget::Position { x, y } => format!("window.scrollTo({}, {})", x, y),
        };
        self.evaluate(page, &script).await?;
        Ok(())
    }

    async fn screenshot(
        &self,
        page: &Self::Page,
        full_page: bool,
        quality: Option<u8>,
    ) -> Result<Vec<u8>> {
        let (format, quality) = match quality {
            Some(q) => (CaptureScreenshotFormatOption::Jpeg, Some(q as u32)),
            None => (CaptureScreenshotFormatOption::Png, None),
        };
        page.capture_screenshot(format, quality, None, full_page)
            .map_err(|e| HarvestError::ScreenshotFailed(e.to_string()))
    }

    async fn url(&self, page: &Self::Page) -> Result<String> {
        Ok(page.get_url())
    }

    async fn title(&self, page: &Self::Page) -> Result<String> {
        page.get_title()
            .map_err(|e| HarvestError::DriverError(e.to_string()))
    }

    async fn install_page_diagnostics(&self, page: &Self::Page) -> Result<()> {
        // Log-only hook; harvested nowhere, surfaced via the page console.
        let script = r#"(() => {
            if (window.__harvesterDiagnostics) return;
            window.__harvesterDiagnostics = true;
            window.addEventListener('error', e => {
                console.warn('[page-harvester] page error:', e.message);
            });
            window.addEventListener('unhandledrejection', e => {
                console.warn('[page-harvester] unhandled rejection:', e.reason);
            });
        })()"#;
        if let Err(e) = self.evaluate(page, script).await {
            tracing::debug!(error = %e, "page diagnostics install failed");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.browser.take().is_some() {
            tracing::debug!("chrome closed");
        }
        Ok(())
    }
}
