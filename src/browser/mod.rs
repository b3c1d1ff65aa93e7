pub mod chromium;
pub mod driver;
pub mod launch;

use async_trait::async_trait;

pub use chromium::{ChromiumDriver, ChromiumLauncher};
pub use driver::{
    body_text, count, query_first, DriverError, ElementHandle, ElementQuery, PageDriver, Probe,
    TextMatch, WaitPolicy,
};

/// Opens one browser per session.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Launch a browser bound to `site`'s profile (`"storefront"`, `"marketplace"`).
    async fn open(&self, site: &str) -> anyhow::Result<Box<dyn PageDriver>>;
}
