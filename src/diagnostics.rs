use crate::core::BrowserDriver;
use crate::types::{JobConfig, PageResult, Summary};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Field names the session seeds into every page; excluded from the summary.
const STRUCTURAL_FIELDS: [&str; 2] = ["title", "url"];

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsConfig {
    pub screenshot_on_error: bool,
    pub screenshot_dir: Option<String>,
}

impl DiagnosticsConfig {
    pub fn from_job(config: &JobConfig) -> Self {
        Self {
            screenshot_on_error: config.screenshot_on_error,
            screenshot_dir: config.screenshot_dir.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        self.screenshot_dir
            .as_deref()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("."))
    }

    /// Create the screenshot directory if capture is enabled. A directory
    /// that cannot be created downgrades captures to best-effort failures.
    pub async fn ensure_dir(&self) {
        if !self.screenshot_on_error {
            return;
        }
        if let Some(dir) = &self.screenshot_dir {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                tracing::warn!(dir, error = %e, "could not create screenshot directory");
            }
        }
    }
}

/// Best-effort failure screenshot. Capture failures are swallowed; a job is
/// never failed by its own diagnostics.
pub async fn capture_failure<B: BrowserDriver>(
    driver: &B,
    page: &B::Page,
    label: &str,
    config: &DiagnosticsConfig,
) {
    if !config.screenshot_on_error {
        return;
    }
    let path: PathBuf = config.dir().join(format!(
        "error-{}-{}.png",
        label,
        chrono::Utc::now().timestamp_millis()
    ));
    match driver.screenshot(page, false, None).await {
        Ok(bytes) => {
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                tracing::debug!(path = %path.display(), error = %e, "failure screenshot not written");
            } else {
                tracing::debug!(path = %path.display(), "failure screenshot captured");
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "failure screenshot capture failed");
        }
    }
}

/// Aggregate statistics over the final page results.
pub fn summarize(results: &[PageResult]) -> Summary {
    let total_pages = results.len();
    let successful_pages = results.iter().filter(|r| r.is_success()).count();
    let total_errors = results.iter().map(|r| r.errors.len()).sum();

    let fields = results
        .iter()
        .find(|r| r.is_success())
        .map(|r| {
            r.fields
                .keys()
                .filter(|k| !STRUCTURAL_FIELDS.contains(&k.as_str()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let total_items_extracted = results
        .iter()
        .filter(|r| r.is_success())
        .flat_map(|r| r.fields.values())
        .filter_map(|v| match v {
            Value::Array(items) => Some(items.len()),
            _ => None,
        })
        .sum();

    Summary {
        total_pages,
        successful_pages,
        error_pages: total_pages - successful_pages,
        total_errors,
        fields,
        total_items_extracted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionFailure;
    use serde_json::{json, Map};

    fn page(n: u32, fields: Map<String, Value>, page_error: Option<&str>) -> PageResult {
        PageResult {
            page: n,
            url: format!("https://fixture.test/page{}", n),
            timestamp: chrono::Utc::now(),
            fields,
            errors: Vec::new(),
            page_error: page_error.map(str::to_string),
        }
    }

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn summary_counts_items_and_pages() {
        let results = vec![
            page(
                1,
                fields(&[
                    ("title", json!("Page 1")),
                    ("url", json!("https://fixture.test/page1")),
                    ("items", json!(["a", "b", "c"])),
                ]),
                None,
            ),
            page(
                2,
                fields(&[
                    ("title", json!("Page 2")),
                    ("url", json!("https://fixture.test/page2")),
                    ("items", json!(["d", "e", "f"])),
                ]),
                None,
            ),
        ];

        let summary = summarize(&results);
        assert_eq!(summary.total_pages, 2);
        assert_eq!(summary.successful_pages, 2);
        assert_eq!(summary.error_pages, 0);
        assert_eq!(summary.fields, vec!["items".to_string()]);
        assert_eq!(summary.total_items_extracted, 6);
    }

    #[test]
    fn summary_skips_error_pages_and_structural_fields() {
        let mut with_error = page(1, fields(&[("title", json!("Broken"))]), Some("boom"));
        with_error.errors.push(ActionFailure {
            action_index: 0,
            kind: "click".to_string(),
            selector: Some("#go".to_string()),
            message: "element not found".to_string(),
        });
        let ok = page(
            2,
            fields(&[
                ("title", json!("Fine")),
                ("url", json!("https://fixture.test/page2")),
                ("rows", json!([1, 2])),
            ]),
            None,
        );

        let summary = summarize(&[with_error, ok]);
        assert_eq!(summary.total_pages, 2);
        assert_eq!(summary.successful_pages, 1);
        assert_eq!(summary.error_pages, 1);
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.fields, vec!["rows".to_string()]);
        assert_eq!(summary.total_items_extracted, 2);
    }

    #[test]
    fn summary_of_empty_run_is_zeroed() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_pages, 0);
        assert!(summary.fields.is_empty());
        assert_eq!(summary.total_items_extracted, 0);
    }
}
