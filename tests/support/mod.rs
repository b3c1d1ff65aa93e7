//! Scripted collaborators for driving `SessionManager` without a browser.
#![allow(dead_code)]

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use handoff::browser::{DriverError, DriverFactory, ElementHandle, ElementQuery, PageDriver, Probe, WaitPolicy};
use handoff::core::config::Settings;
use handoff::session::model::{Candidate, ReportedStatus};
use handoff::session::{SessionId, SessionManager, SessionServices, SessionSnapshot, SessionStatus};
use handoff::sites::{MarketplaceSite, StorefrontSite};

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Counts browser launches and closes across every driver a factory hands out.
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

impl BrowserLog {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

/// A page that accepts every command and finds nothing. The scripted site
/// adapters below do the interesting work.
pub struct NullDriver {
    log: Arc<BrowserLog>,
    fail_close: bool,
}

#[async_trait]
impl PageDriver for NullDriver {
    async fn navigate(&self, url: &str, _wait: WaitPolicy) -> Result<(), DriverError> {
        self.log.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self
            .log
            .navigations
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default())
    }

    async fn query_all(&self, _query: &ElementQuery) -> Result<Vec<ElementHandle>, DriverError> {
        Ok(Vec::new())
    }

    async fn click(&self, _element: &ElementHandle) -> Result<(), DriverError> {
        Ok(())
    }

    async fn type_text(&self, _element: &ElementHandle, _text: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn evaluate(&self, _probe: &Probe) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::Value::Null)
    }

    async fn wait_for(&self, _query: &ElementQuery, _timeout: Duration) -> Result<bool, DriverError> {
        Ok(false)
    }

    async fn press_key(&self, _key: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn scroll_by(&self, _pixels: i64) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(DriverError::Protocol("browser did not exit".into()));
        }
        Ok(())
    }
}

pub struct FakeDrivers {
    pub log: Arc<BrowserLog>,
    pub unavailable: bool,
    /// Every driver handed out fails to close.
    pub fail_close: bool,
}

#[async_trait]
impl DriverFactory for FakeDrivers {
    async fn open(&self, site: &str) -> anyhow::Result<Box<dyn PageDriver>> {
        if self.unavailable {
            bail!("No browser found for {}", site);
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NullDriver {
            log: Arc::clone(&self.log),
            fail_close: self.fail_close,
        }))
    }
}

// ── Storefront ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeStorefront {
    /// Login is detected on this check (1 = the immediate check). `None` = never.
    pub login_on_check: Option<usize>,
    pub stores: usize,
    /// Ranks whose add-items step succeeds.
    pub viable: Vec<usize>,
    pub fail_clear_cart: bool,
    pub panic_in_clear_cart: bool,
    /// Overrides the cart count read back after adding items.
    pub cart_readback: Option<u32>,
    pub fail_checkout: bool,
    /// The consent modal shows up on this check (1 = first poll). `None` = never.
    pub modal_on_check: Option<usize>,
    pub login_checks: AtomicUsize,
    pub modal_checks: AtomicUsize,
    pub stores_opened: Mutex<Vec<usize>>,
    pub checkout_opened: AtomicBool,
    pub items_in_cart: AtomicUsize,
}

impl FakeStorefront {
    pub fn logged_in(stores: usize, viable: &[usize]) -> Self {
        Self {
            login_on_check: Some(1),
            stores,
            viable: viable.to_vec(),
            ..Default::default()
        }
    }

    pub fn stores_opened(&self) -> Vec<usize> {
        self.stores_opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorefrontSite for FakeStorefront {
    async fn open_home(&self, page: &dyn PageDriver) -> anyhow::Result<()> {
        page.navigate("https://shop.test/", WaitPolicy::DomContentLoaded).await?;
        Ok(())
    }

    async fn is_authenticated(&self, _page: &dyn PageDriver) -> Result<bool, DriverError> {
        let n = self.login_checks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.login_on_check.is_some_and(|at| n >= at))
    }

    async fn set_delivery_address(&self, _page: &dyn PageDriver, _address: &str) -> anyhow::Result<()> {
        Err(anyhow!("address input not found"))
    }

    async fn clear_cart(&self, _page: &dyn PageDriver) -> anyhow::Result<()> {
        if self.panic_in_clear_cart {
            panic!("cart markup changed under us");
        }
        if self.fail_clear_cart {
            bail!("cart button not found");
        }
        Ok(())
    }

    async fn open_category(&self, page: &dyn PageDriver) -> anyhow::Result<String> {
        let url = "https://shop.test/vertical_homepage/alcohol".to_string();
        page.navigate(&url, WaitPolicy::DomContentLoaded).await?;
        Ok(url)
    }

    async fn discover_stores(&self, _page: &dyn PageDriver) -> anyhow::Result<Vec<Candidate>> {
        Ok(Candidate::ranked((1..=self.stores).map(|i| {
            (format!("https://shop.test/store/{i}"), format!("Store {i}"))
        })))
    }

    async fn open_store(&self, page: &dyn PageDriver, store: &Candidate) -> anyhow::Result<()> {
        self.stores_opened.lock().unwrap().push(store.rank);
        page.navigate(&store.url, WaitPolicy::DomContentLoaded).await?;
        Ok(())
    }

    async fn add_items(&self, page: &dyn PageDriver, _preference: &str, max_items: u32) -> anyhow::Result<u32> {
        let url = page.current_url().await?;
        let rank: usize = url.rsplit('/').next().and_then(|r| r.parse().ok()).unwrap_or(0);
        if !self.viable.contains(&rank) {
            bail!("no Add buttons found");
        }
        self.items_in_cart.store(max_items as usize, Ordering::SeqCst);
        Ok(max_items)
    }

    async fn cart_count(&self, _page: &dyn PageDriver) -> Result<u32, DriverError> {
        Ok(self
            .cart_readback
            .unwrap_or(self.items_in_cart.load(Ordering::SeqCst) as u32))
    }

    async fn open_checkout(&self, _page: &dyn PageDriver) -> anyhow::Result<()> {
        if self.fail_checkout {
            bail!("checkout button not found");
        }
        self.checkout_opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn dismiss_consent_modal(&self, _page: &dyn PageDriver) -> Result<bool, DriverError> {
        let n = self.modal_checks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.modal_on_check.is_some_and(|at| n >= at))
    }
}

// ── Marketplace ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// The human sends the drafted message.
    Sends,
    /// The composer never empties.
    TimesOut,
    /// No composer: this seller was already contacted.
    AlreadyContacted,
}

#[derive(Debug, Default)]
pub struct FakeMarketplace {
    pub listings: Vec<Listing>,
    pub opened: Mutex<Vec<usize>>,
    pub drafts: Mutex<Vec<String>>,
    current: Mutex<Option<usize>>,
}

impl FakeMarketplace {
    pub fn new(listings: &[Listing]) -> Self {
        Self {
            listings: listings.to_vec(),
            ..Default::default()
        }
    }

    pub fn opened(&self) -> Vec<usize> {
        self.opened.lock().unwrap().clone()
    }

    pub fn drafts(&self) -> Vec<String> {
        self.drafts.lock().unwrap().clone()
    }

    fn current(&self) -> Option<Listing> {
        let rank = (*self.current.lock().unwrap())?;
        self.listings.get(rank - 1).copied()
    }
}

#[async_trait]
impl MarketplaceSite for FakeMarketplace {
    async fn open_home(&self, _page: &dyn PageDriver) -> anyhow::Result<()> {
        Ok(())
    }

    async fn is_authenticated(&self, _page: &dyn PageDriver) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn search(&self, _page: &dyn PageDriver, _term: &str, _scroll_passes: u32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn discover_listings(&self, _page: &dyn PageDriver) -> anyhow::Result<Vec<Candidate>> {
        Ok(Candidate::ranked((1..=self.listings.len()).map(|i| {
            (format!("https://market.test/marketplace/item/{i}/"), format!("Listing {i}"))
        })))
    }

    async fn open_listing(&self, _page: &dyn PageDriver, listing: &Candidate) -> anyhow::Result<()> {
        self.opened.lock().unwrap().push(listing.rank);
        *self.current.lock().unwrap() = Some(listing.rank);
        Ok(())
    }

    async fn find_composer(&self, _page: &dyn PageDriver) -> Result<Option<ElementHandle>, DriverError> {
        if self.current() == Some(Listing::AlreadyContacted) {
            return Ok(None);
        }
        Ok(Some(ElementHandle {
            query: ElementQuery::css("textarea"),
            index: 0,
            text: String::new(),
            href: None,
            value: Some(String::new()),
        }))
    }

    async fn listing_price(&self, _page: &dyn PageDriver) -> Result<Option<u64>, DriverError> {
        Ok(Some(100))
    }

    async fn draft_message(&self, _page: &dyn PageDriver, _composer: &ElementHandle, text: &str) -> anyhow::Result<()> {
        self.drafts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn composer_cleared(&self, _page: &dyn PageDriver) -> Result<bool, DriverError> {
        Ok(self.current() == Some(Listing::Sends))
    }

    async fn dismiss_composer(&self, _page: &dyn PageDriver) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

pub struct Harness {
    pub manager: SessionManager,
    pub browser: Arc<BrowserLog>,
    pub storefront: Arc<FakeStorefront>,
    pub marketplace: Arc<FakeMarketplace>,
    pub services: SessionServices,
}

impl Harness {
    pub fn new(storefront: FakeStorefront, marketplace: FakeMarketplace) -> Self {
        Self::build(storefront, marketplace, false, false)
    }

    pub fn without_browser() -> Self {
        Self::build(FakeStorefront::default(), FakeMarketplace::default(), true, false)
    }

    /// Browsers open normally but report an error when closed.
    pub fn with_failing_close(storefront: FakeStorefront) -> Self {
        Self::build(storefront, FakeMarketplace::default(), false, true)
    }

    fn build(
        storefront: FakeStorefront,
        marketplace: FakeMarketplace,
        unavailable: bool,
        fail_close: bool,
    ) -> Self {
        init_logger();
        let browser = Arc::new(BrowserLog::default());
        let storefront = Arc::new(storefront);
        let marketplace = Arc::new(marketplace);
        let services = SessionServices {
            drivers: Arc::new(FakeDrivers {
                log: Arc::clone(&browser),
                unavailable,
                fail_close,
            }),
            storefront: storefront.clone(),
            marketplace: marketplace.clone(),
            settings: Arc::new(Settings::default()),
        };
        Self {
            manager: SessionManager::new(services.clone()),
            browser,
            storefront,
            marketplace,
            services,
        }
    }

    /// Poll status every 100 ms until `done` holds (or `limit` passes).
    pub async fn wait_until<F>(&self, id: SessionId, limit: Duration, done: F) -> SessionSnapshot
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let snap = self.manager.status(id).await;
            if done(&snap) || tokio::time::Instant::now() >= deadline {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn wait_for_status(&self, id: SessionId, status: SessionStatus) -> SessionSnapshot {
        self.wait_until(id, Duration::from_secs(600), |s| status_is(s, status))
            .await
    }

    pub async fn wait_until_terminal(&self, id: SessionId) -> SessionSnapshot {
        self.wait_until(id, Duration::from_secs(600), |s| {
            s.transitions.last().is_some_and(|st| st.is_terminal())
        })
        .await
    }
}

pub fn status_is(snapshot: &SessionSnapshot, status: SessionStatus) -> bool {
    snapshot.status == ReportedStatus::Session(status)
}
