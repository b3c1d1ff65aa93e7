use std::sync::Arc;

use crate::browser::{ChromiumLauncher, DriverFactory};
use crate::core::config::Settings;
use crate::session::{SessionManager, SessionServices};
use crate::sites::{DefaultMarketplace, DefaultStorefront, MarketplaceSite, StorefrontSite};

#[derive(Clone)]
pub struct AppState {
    pub manager: SessionManager,
    pub settings: Arc<Settings>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("port", &self.settings.port)
            .field("headless", &self.settings.browser.headless)
            .finish()
    }
}

impl AppState {
    /// Production wiring: Chromium sessions against the default site adapters.
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let drivers: Arc<dyn DriverFactory> =
            Arc::new(ChromiumLauncher::new(settings.browser.clone()));
        let storefront: Arc<dyn StorefrontSite> =
            Arc::new(DefaultStorefront::new(settings.order.storefront_url.clone()));
        let marketplace: Arc<dyn MarketplaceSite> = Arc::new(DefaultMarketplace::new(
            settings.messaging.marketplace_url.clone(),
        ));
        Self::with_services(SessionServices {
            drivers,
            storefront,
            marketplace,
            settings,
        })
    }

    /// Wire the API to arbitrary collaborators.
    pub fn with_services(services: SessionServices) -> Self {
        let settings = Arc::clone(&services.settings);
        Self {
            manager: SessionManager::new(services),
            settings,
        }
    }
}
