pub mod browser;

pub use browser::{BrowserDriver, ElementProbe, ElementSnapshot, LaunchConfig, ScrollTarget};
