//! Site adapters: every selector and page heuristic the workflows rely on.
//!
//! Workflows only see these traits. The default implementations drive a real
//! page through [`PageDriver`]; tests substitute scripted adapters.

pub mod marketplace;
pub mod offer;
pub mod storefront;

use async_trait::async_trait;

use crate::browser::{DriverError, ElementHandle, PageDriver};
use crate::session::model::Candidate;

pub use marketplace::DefaultMarketplace;
pub use storefront::DefaultStorefront;

/// Pause between page actions, letting client-side rendering catch up.
pub(crate) async fn settle(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

#[async_trait]
pub trait StorefrontSite: Send + Sync {
    async fn open_home(&self, page: &dyn PageDriver) -> anyhow::Result<()>;

    async fn is_authenticated(&self, page: &dyn PageDriver) -> Result<bool, DriverError>;

    async fn set_delivery_address(&self, page: &dyn PageDriver, address: &str)
        -> anyhow::Result<()>;

    async fn clear_cart(&self, page: &dyn PageDriver) -> anyhow::Result<()>;

    /// Open the category listing stores are discovered on. Returns its URL,
    /// which is the baseline every store retry starts from.
    async fn open_category(&self, page: &dyn PageDriver) -> anyhow::Result<String>;

    async fn discover_stores(&self, page: &dyn PageDriver) -> anyhow::Result<Vec<Candidate>>;

    async fn open_store(&self, page: &dyn PageDriver, store: &Candidate) -> anyhow::Result<()>;

    /// Add up to `max_items` items matching `preference`. Returns how many
    /// were added; an error or zero means this store is not viable.
    async fn add_items(
        &self,
        page: &dyn PageDriver,
        preference: &str,
        max_items: u32,
    ) -> anyhow::Result<u32>;

    async fn cart_count(&self, page: &dyn PageDriver) -> Result<u32, DriverError>;

    async fn open_checkout(&self, page: &dyn PageDriver) -> anyhow::Result<()>;

    /// One probe for the consent / terms modal. `Ok(true)` once a modal was
    /// found and its accept button clicked.
    async fn dismiss_consent_modal(&self, page: &dyn PageDriver) -> Result<bool, DriverError>;
}

#[async_trait]
pub trait MarketplaceSite: Send + Sync {
    async fn open_home(&self, page: &dyn PageDriver) -> anyhow::Result<()>;

    async fn is_authenticated(&self, page: &dyn PageDriver) -> Result<bool, DriverError>;

    /// Run the search and scroll `scroll_passes` times to load results.
    async fn search(&self, page: &dyn PageDriver, term: &str, scroll_passes: u32)
        -> anyhow::Result<()>;

    async fn discover_listings(&self, page: &dyn PageDriver) -> anyhow::Result<Vec<Candidate>>;

    async fn open_listing(&self, page: &dyn PageDriver, listing: &Candidate)
        -> anyhow::Result<()>;

    /// The message composer, or `None` when the seller was already contacted.
    async fn find_composer(&self, page: &dyn PageDriver)
        -> Result<Option<ElementHandle>, DriverError>;

    async fn listing_price(&self, page: &dyn PageDriver) -> Result<Option<u64>, DriverError>;

    /// Type `text` into the composer without sending it.
    async fn draft_message(
        &self,
        page: &dyn PageDriver,
        composer: &ElementHandle,
        text: &str,
    ) -> anyhow::Result<()>;

    /// `true` once the composer is empty again (the human pressed send).
    async fn composer_cleared(&self, page: &dyn PageDriver) -> Result<bool, DriverError>;

    async fn dismiss_composer(&self, page: &dyn PageDriver) -> anyhow::Result<()>;
}
