pub mod browser;
pub mod core;
pub mod diagnostics;
pub mod errors;
pub mod interpreter;
pub mod pagination;
pub mod session;
pub mod testing;
pub mod types;

pub use browser::ChromeDriver;
pub use core::{BrowserDriver, ElementProbe, ElementSnapshot, LaunchConfig, ScrollTarget};
pub use errors::{HarvestError, Result};
pub use session::SessionManager;
pub use types::*;

/// Run a job against a freshly launched headless Chrome.
pub async fn run_job(config: &JobConfig) -> Result<JobResult> {
    SessionManager::chrome().run(config).await
}
