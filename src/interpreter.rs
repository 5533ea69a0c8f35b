use crate::core::{BrowserDriver, ScrollTarget};
use crate::diagnostics::{self, DiagnosticsConfig};
use crate::errors::Result;
use crate::types::{
    Action, ActionFailure, ActionKind, Condition, DEFAULT_DELAY_MS, DEFAULT_WAIT_TIMEOUT_MS,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use std::time::Duration;

/// Run the ordered action list against the current page. Extracted values
/// land in `fields` (pre-seeded with the page title and resolved URL),
/// isolated failures in `errors`. Returns `Err` only when a critical action
/// fails, aborting the remaining actions for this page.
pub async fn run_actions<B: BrowserDriver>(
    driver: &B,
    page: &B::Page,
    actions: &[Action],
    page_number: u32,
    config: &DiagnosticsConfig,
    fields: &mut Map<String, Value>,
    errors: &mut Vec<ActionFailure>,
) -> Result<()> {
    seed_page_fields(driver, page, fields).await;

    for (index, action) in actions.iter().enumerate() {
        if matches!(action.kind, ActionKind::Unknown) {
            tracing::warn!(index, "skipping action with unrecognized kind");
            continue;
        }

        if let Some(condition) = &action.condition {
            if !condition_met(driver, page, condition).await {
                tracing::debug!(index, kind = action.kind_name(), "condition unmet, skipped");
                continue;
            }
        }

        match execute(driver, page, action, page_number, config).await {
            Ok(value) => {
                if let (Some(name), Some(value)) = (&action.name, value) {
                    fields.insert(name.clone(), value);
                }
            }
            Err(e) => {
                tracing::debug!(index, kind = action.kind_name(), error = %e, "action failed");
                errors.push(ActionFailure {
                    action_index: index,
                    kind: action.kind_name().to_string(),
                    selector: action.selector().map(str::to_string),
                    message: e.to_string(),
                });
                diagnostics::capture_failure(
                    driver,
                    page,
                    &format!("page{}-action{}", page_number, index),
                    config,
                )
                .await;
                if action.critical {
                    return Err(e);
                }
            }
        }

        if let Some(delay) = action.delay_after_ms {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    Ok(())
}

async fn seed_page_fields<B: BrowserDriver>(
    driver: &B,
    page: &B::Page,
    fields: &mut Map<String, Value>,
) {
    let title = driver.title(page).await.unwrap_or_default();
    let url = driver.url(page).await.unwrap_or_default();
    fields.insert("title".to_string(), Value::String(title));
    fields.insert("url".to_string(), Value::String(url));
}

/// Clauses are checked in order: exists, notExists, textContains. A probe
/// failure counts as unmet.
async fn condition_met<B: BrowserDriver>(
    driver: &B,
    page: &B::Page,
    condition: &Condition,
) -> bool {
    if let Some(selector) = &condition.exists {
        match driver.probe(page, selector).await {
            Ok(probe) if probe.present => {}
            _ => return false,
        }
    }
    if let Some(selector) = &condition.not_exists {
        match driver.probe(page, selector).await {
            Ok(probe) if !probe.present => {}
            _ => return false,
        }
    }
    if let Some(matcher) = &condition.text_contains {
        match driver.query_all(page, &matcher.selector).await {
            Ok(snapshots) => {
                if !snapshots.iter().any(|s| s.text.contains(&matcher.text)) {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }
    true
}

async fn execute<B: BrowserDriver>(
    driver: &B,
    page: &B::Page,
    action: &Action,
    page_number: u32,
    config: &DiagnosticsConfig,
) -> Result<Option<Value>> {
    match &action.kind {
        ActionKind::Click { selector } => {
            driver
                .wait_for_selector(page, selector, DEFAULT_WAIT_TIMEOUT_MS, false)
                .await?;
            driver.click(page, selector).await?;
            Ok(None)
        }
        ActionKind::Type { selector, text } => {
            driver
                .wait_for_selector(page, selector, DEFAULT_WAIT_TIMEOUT_MS, false)
                .await?;
            driver.type_text(page, selector, text).await?;
            Ok(None)
        }
        ActionKind::Extract {
            selector,
            attribute,
            html,
            as_number,
        } => {
            if let Err(e) = driver
                .wait_for_selector(page, selector, DEFAULT_WAIT_TIMEOUT_MS, false)
                .await
            {
                let optional = action
                    .condition
                    .as_ref()
                    .map(|c| c.optional)
                    .unwrap_or(false);
                if optional {
                    return Ok(Some(Value::Array(Vec::new())));
                }
                return Err(e);
            }
            let snapshots = driver.query_all(page, selector).await?;
            let values: Vec<Value> = snapshots
                .iter()
                .filter_map(|snapshot| {
                    let raw = match attribute {
                        Some(name) => snapshot.attribute(name)?.to_string(),
                        None if *html => snapshot.html.clone(),
                        None => snapshot.text.clone(),
                    };
                    if raw.is_empty() {
                        return None;
                    }
                    Some(if *as_number {
                        coerce_number(&raw)
                    } else {
                        Value::String(raw)
                    })
                })
                .collect();
            Ok(Some(Value::Array(values)))
        }
        ActionKind::WaitForSelector {
            selector,
            timeout_ms,
            visible,
        } => {
            driver
                .wait_for_selector(
                    page,
                    selector,
                    timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS),
                    *visible,
                )
                .await?;
            Ok(None)
        }
        ActionKind::Delay { duration_ms } => {
            tokio::time::sleep(Duration::from_millis(duration_ms.unwrap_or(DEFAULT_DELAY_MS)))
                .await;
            Ok(None)
        }
        ActionKind::Screenshot {
            path,
            full_page,
            quality,
        } => {
            let path = match path {
                Some(path) => path.clone(),
                None => config
                    .dir()
                    .join(format!(
                        "page{}-{}.png",
                        page_number,
                        chrono::Utc::now().timestamp_millis()
                    ))
                    .to_string_lossy()
                    .into_owned(),
            };
            let bytes = driver.screenshot(page, *full_page, *quality).await?;
            tokio::fs::write(&path, bytes).await?;
            Ok(Some(Value::String(path)))
        }
        ActionKind::Scroll {
            to_bottom,
            to_selector,
            x,
            y,
        } => {
            let target = if *to_bottom {
                ScrollTarget::Bottom
            } else if let Some(selector) = to_selector {
                ScrollTarget::Selector(selector.clone())
            } else {
                ScrollTarget::Position {
                    x: x.unwrap_or(0.0),
                    y: y.unwrap_or(0.0),
                }
            };
            driver.scroll(page, &target).await?;
            Ok(None)
        }
        ActionKind::Evaluate { script } => {
            let value = driver.evaluate(page, script).await?;
            Ok(Some(value))
        }
        // Filtered out before dispatch; kept for exhaustiveness.
        ActionKind::Unknown => Ok(None),
    }
}

/// Strip non-numeric characters and parse a float, falling back to the raw
/// text when parsing fails. "$1,234.56" becomes 1234.56.
fn coerce_number(raw: &str) -> Value {
    static NON_NUMERIC: OnceLock<Regex> = OnceLock::new();
    let re = NON_NUMERIC.get_or_init(|| Regex::new(r"[^0-9.\-]").expect("static pattern"));
    let cleaned = re.replace_all(raw, "");
    cleaned
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}
