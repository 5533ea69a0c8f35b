use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MAX_PAGES: u32 = 10;
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One scraping job: target URL, scripted actions, pagination policy and
/// diagnostics settings. Arrives as JSON from the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub url: String,
    #[serde(default)]
    pub browser: BrowserOptions,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub wait_for: Option<WaitFor>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub screenshot_on_error: bool,
    #[serde(default)]
    pub screenshot_dir: Option<String>,
}

impl JobConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            browser: BrowserOptions::default(),
            actions: Vec::new(),
            pagination: None,
            wait_for: None,
            timeout_ms: None,
            screenshot_on_error: false,
            screenshot_dir: None,
        }
    }

    pub fn operation_timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_OPERATION_TIMEOUT_MS)
    }
}

/// Caller-supplied launch overrides, merged over fixed headless defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
        }
    }
}

/// Multi-page loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub next_selector: String,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl Pagination {
    pub fn page_ceiling(&self) -> u32 {
        self.max_pages.unwrap_or(DEFAULT_MAX_PAGES)
    }
}

/// Global wait applied after the initial navigation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitFor {
    pub selector: Option<String>,
    pub delay_ms: Option<u64>,
}

/// One declarative step in a scripted browser interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Field name the produced value is stored under in the page result.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
    /// A critical action's failure aborts remaining actions on its page.
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub delay_after_ms: Option<u64>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            name: None,
            condition: None,
            critical: false,
            delay_after_ms: None,
        }
    }

    pub fn named(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(kind)
        }
    }

    /// Selector the action targets, where the kind has one.
    pub fn selector(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Click { selector }
            | ActionKind::Type { selector, .. }
            | ActionKind::Extract { selector, .. }
            | ActionKind::WaitForSelector { selector, .. } => Some(selector),
            ActionKind::Scroll { to_selector, .. } => to_selector.as_deref(),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ActionKind::Click { .. } => "click",
            ActionKind::Type { .. } => "type",
            ActionKind::Extract { .. } => "extract",
            ActionKind::WaitForSelector { .. } => "waitForSelector",
            ActionKind::Delay { .. } => "delay",
            ActionKind::Screenshot { .. } => "screenshot",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Evaluate { .. } => "evaluate",
            ActionKind::Unknown => "unknown",
        }
    }
}

/// Closed set of action kinds. Payloads crossing the process boundary with a
/// kind this build does not know fall into `Unknown` and are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionKind {
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Extract {
        selector: String,
        #[serde(default)]
        attribute: Option<String>,
        #[serde(default)]
        html: bool,
        #[serde(default)]
        as_number: bool,
    },
    #[serde(rename_all = "camelCase")]
    WaitForSelector {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        visible: bool,
    },
    #[serde(rename_all = "camelCase")]
    Delay {
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Screenshot {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        full_page: bool,
        #[serde(default)]
        quality: Option<u8>,
    },
    #[serde(rename_all = "camelCase")]
    Scroll {
        #[serde(default)]
        to_bottom: bool,
        #[serde(default)]
        to_selector: Option<String>,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
    },
    Evaluate {
        script: String,
    },
    #[serde(other)]
    Unknown,
}

/// Pre-condition evaluated before an action runs. Any unmet clause skips the
/// action without recording an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Condition {
    /// Selector that must match an element on the page.
    pub exists: Option<String>,
    /// Selector that must not match any element.
    pub not_exists: Option<String>,
    /// Element text that must contain a substring.
    pub text_contains: Option<TextMatch>,
    /// For extract: treat a missing element as an empty result, not a failure.
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMatch {
    pub selector: String,
    pub text: String,
}

/// Aggregated outcome for one visited page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// 1-based page index.
    pub page: u32,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    /// Extracted values keyed by action name, seeded with title and url.
    pub fields: Map<String, Value>,
    /// Isolated per-action failures, in execution order.
    pub errors: Vec<ActionFailure>,
    /// Set when the page as a whole aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_error: Option<String>,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        self.page_error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFailure {
    pub action_index: usize,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub message: String,
}

/// Final outcome of a job invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub pages_visited: u32,
    pub elapsed_ms: u64,
    pub results: Vec<PageResult>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_pages: usize,
    pub successful_pages: usize,
    pub error_pages: usize,
    pub total_errors: usize,
    pub fields: Vec<String>,
    pub total_items_extracted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_deserializes_from_tagged_json() {
        let action: Action = serde_json::from_str(
            r#"{"kind": "extract", "name": "items", "selector": ".item", "asNumber": true}"#,
        )
        .unwrap();
        assert_eq!(action.name.as_deref(), Some("items"));
        assert_eq!(action.selector(), Some(".item"));
        match action.kind {
            ActionKind::Extract { as_number, html, .. } => {
                assert!(as_number);
                assert!(!html);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn unrecognized_kind_falls_back_to_unknown() {
        let action: Action =
            serde_json::from_str(r#"{"kind": "hoverAndSpin", "name": "x"}"#).unwrap();
        assert!(matches!(action.kind, ActionKind::Unknown));
        assert_eq!(action.kind_name(), "unknown");
    }

    #[test]
    fn job_config_defaults() {
        let config: JobConfig = serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert!(config.actions.is_empty());
        assert!(config.pagination.is_none());
        assert!(!config.screenshot_on_error);
        assert_eq!(config.operation_timeout_ms(), DEFAULT_OPERATION_TIMEOUT_MS);
        assert!(config.browser.headless);
    }

    #[test]
    fn pagination_ceiling_defaults_to_ten() {
        let pagination: Pagination =
            serde_json::from_str(r#"{"nextSelector": ".next"}"#).unwrap();
        assert_eq!(pagination.page_ceiling(), DEFAULT_MAX_PAGES);

        let capped: Pagination =
            serde_json::from_str(r#"{"nextSelector": ".next", "maxPages": 3}"#).unwrap();
        assert_eq!(capped.page_ceiling(), 3);
    }
}
