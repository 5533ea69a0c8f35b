use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Invalid job config: {0}")]
    Validation(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    NotLaunched,

    #[error("Page creation failed: {0}")]
    PageCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript execution failed: {0}")]
    ScriptFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Driver error: {0}")]
    DriverError(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;

// Convert anyhow::Error to HarvestError
impl From<anyhow::Error> for HarvestError {
    fn from(err: anyhow::Error) -> Self {
        HarvestError::DriverError(err.to_string())
    }
}

impl HarvestError {
    /// Whether this error belongs to the timeout class that the pagination
    /// termination policy treats as terminal.
    pub fn is_timeout(&self) -> bool {
        match self {
            HarvestError::Timeout(_) => true,
            other => {
                let msg = other.to_string().to_lowercase();
                msg.contains("timeout") || msg.contains("timed out")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_variant_is_timeout_class() {
        assert!(HarvestError::Timeout("navigation".into()).is_timeout());
    }

    #[test]
    fn driver_error_with_timeout_message_is_timeout_class() {
        assert!(HarvestError::DriverError("operation timed out after 5s".into()).is_timeout());
        assert!(!HarvestError::DriverError("connection refused".into()).is_timeout());
    }

    #[test]
    fn validation_error_is_not_timeout_class() {
        assert!(!HarvestError::Validation("missing url".into()).is_timeout());
    }
}
