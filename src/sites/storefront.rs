//! Default storefront adapter (food-delivery style: category page → store
//! cards → in-store search → "Add" buttons → cart → checkout).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{settle, StorefrontSite};
use crate::browser::{
    body_text, count, query_first, DriverError, ElementQuery, PageDriver, WaitPolicy,
};
use crate::session::model::{Candidate, ANY_PREFERENCE};

const ACCOUNT_MARKERS: &str = concat!(
    r#"[data-testid="NotificationBell"], [data-testid="HeaderNotificationBellIcon"], "#,
    r#"[data-testid="AccountButton"], [data-testid="account-menu"], "#,
    r#"button[aria-label*="Account"], a[href*="/account"], [data-anchor-id="AccountLink"], "#,
    r#"[data-testid="UserAccount"], button[data-anchor-id*="Account"], div[data-testid*="account"]"#
);
const ADDRESS_INPUTS: &str = concat!(
    r#"input[data-testid="AddressInput"], input[placeholder*="address" i], "#,
    r#"input[name="address"], #FieldWrapper-0"#
);
const CART_ICON: &str = r#"[data-testid="OrderCartIconButton"]"#;
const CART_BUTTONS: &str = concat!(
    r#"[data-testid="CartButton"], [data-testid="cart-button"], [data-testid="OrderCartIconButton"], "#,
    r#"button[aria-label*="Cart"], [class*="CartButton"]"#
);
const CHECKOUT_BUTTONS: &str =
    r#"[data-testid="CheckoutButton"], [class*="CheckoutButton"], button[data-testid*="checkout" i]"#;
const DELETE_BUTTONS: &str = concat!(
    r#"button[aria-label*="delete" i]:not([aria-label*="saved cart" i]), "#,
    r#"button[aria-label*="remove" i]:not([aria-label*="saved cart" i])"#
);
const MODAL_MARKERS: &str = r#"[role="dialog"], [class*="modal" i]"#;
const DIALOG: &str = r#"[role="dialog"]"#;

fn cart_count_pattern() -> &'static Regex {
    static CART: OnceLock<Regex> = OnceLock::new();
    CART.get_or_init(|| Regex::new(r"(\d+)\s*items?").expect("valid cart pattern"))
}

/// Login heuristic over the page text plus two structural signals.
pub fn looks_logged_in(body: &str, has_account_marker: bool, address_filled: bool) -> bool {
    if body.contains("Welcome back!") || has_account_marker {
        return true;
    }
    let signed_out_prompt = body.contains("Sign In") || body.contains("Sign Up");
    if body.contains("Account") && body.contains("Orders") && !signed_out_prompt {
        return true;
    }
    if body.contains("My Account") || body.contains("Sign Out") || body.contains("Log Out") {
        return true;
    }
    if signed_out_prompt
        && !(body.contains("Account") || body.contains("Profile") || body.contains("Orders"))
    {
        return false;
    }
    address_filled
}

/// `"3 items"` → 3; anything unparseable → 0.
pub fn parse_cart_count(label: &str) -> u32 {
    cart_count_pattern()
        .captures(label)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct DefaultStorefront {
    base_url: String,
    category_label: String,
    category_href_marker: String,
    search_suffix: String,
}

impl DefaultStorefront {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            category_label: "Alcohol".to_string(),
            category_href_marker: "vertical_homepage".to_string(),
            search_suffix: "beer 6 pack".to_string(),
        }
    }

    /// In-store search term for `preference`.
    pub fn search_term(&self, preference: &str) -> String {
        if preference.trim().is_empty() || preference.eq_ignore_ascii_case(ANY_PREFERENCE) {
            self.search_suffix.clone()
        } else {
            format!("{} {}", preference.trim(), self.search_suffix)
        }
    }

    fn add_buttons() -> ElementQuery {
        ElementQuery::css("button")
            .text_exact("Add")
            .text_prefix("Add ")
            .text_contains("Add to cart")
            .text_contains("Add to order")
    }

    fn store_links() -> ElementQuery {
        ElementQuery::css(r#"a[href*="/store/"]"#).href_excludes([
            "/search/store/",
            "/browse/",
            "/categories/",
        ])
    }

    async fn click_first(&self, page: &dyn PageDriver, query: &ElementQuery) -> Result<bool> {
        match query_first(page, query).await? {
            Some(el) => {
                page.click(&el).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl StorefrontSite for DefaultStorefront {
    async fn open_home(&self, page: &dyn PageDriver) -> Result<()> {
        page.navigate(&self.base_url, WaitPolicy::DomContentLoaded)
            .await
            .with_context(|| format!("failed to open {}", self.base_url))?;
        settle(500).await;
        Ok(())
    }

    async fn is_authenticated(&self, page: &dyn PageDriver) -> Result<bool, DriverError> {
        let body = body_text(page).await?;
        let has_marker = count(page, &ElementQuery::css(ACCOUNT_MARKERS)).await? > 0;
        let address_filled = query_first(page, &ElementQuery::css(ADDRESS_INPUTS))
            .await?
            .and_then(|el| el.value)
            .is_some_and(|v| !v.trim().is_empty());
        Ok(looks_logged_in(&body, has_marker, address_filled))
    }

    async fn set_delivery_address(&self, page: &dyn PageDriver, address: &str) -> Result<()> {
        let input = query_first(page, &ElementQuery::css(ADDRESS_INPUTS))
            .await?
            .ok_or_else(|| anyhow!("address input not found"))?;
        page.click(&input).await?;
        settle(500).await;
        page.type_text(&input, address).await?;
        settle(500).await;
        page.press_key("Enter").await?;
        settle(1000).await;
        info!("delivery address set");
        Ok(())
    }

    async fn clear_cart(&self, page: &dyn PageDriver) -> Result<()> {
        let items = self.cart_count(page).await?;
        if items == 0 {
            debug!("cart is already empty");
            return Ok(());
        }
        info!("clearing {} item(s) from cart", items);

        if !self.click_first(page, &ElementQuery::css(CART_ICON)).await? {
            bail!("cart button not found");
        }
        settle(1000).await;

        let clear_all = ElementQuery::css("button")
            .text_contains("clear cart")
            .text_contains("clear all")
            .text_contains("empty cart")
            .text_contains("remove all")
            .text_contains("delete saved cart");
        if self.click_first(page, &clear_all).await? {
            settle(500).await;
            let confirm = ElementQuery::css("button")
                .text_contains("confirm")
                .text_contains("delete")
                .text_contains("yes")
                .text_contains("remove");
            if self.click_first(page, &confirm).await? {
                settle(500).await;
            }
        } else {
            let deletes = ElementQuery::css(DELETE_BUTTONS);
            let pending = count(page, &deletes).await?;
            if pending == 0 {
                page.press_key("Escape").await.ok();
                bail!("no clear or delete buttons in cart");
            }
            for i in 0..pending {
                if !self.click_first(page, &deletes).await? {
                    debug!("delete button {} of {} vanished", i + 1, pending);
                    break;
                }
                settle(400).await;
            }
        }

        page.press_key("Escape").await?;
        settle(500).await;
        Ok(())
    }

    async fn open_category(&self, page: &dyn PageDriver) -> Result<String> {
        let link = query_first(
            page,
            &ElementQuery::css("a")
                .text_exact(&self.category_label)
                .href_includes(&self.category_href_marker),
        )
        .await?
        .and_then(|el| el.href)
        .ok_or_else(|| anyhow!("{} link not found", self.category_label))?;

        page.navigate(&link, WaitPolicy::DomContentLoaded).await?;
        if !page
            .wait_for(&Self::store_links(), Duration::from_secs(10))
            .await?
        {
            debug!("store cards not visible yet on {}", link);
        }
        Ok(link)
    }

    async fn discover_stores(&self, page: &dyn PageDriver) -> Result<Vec<Candidate>> {
        let links = page.query_all(&Self::store_links()).await?;
        Ok(Candidate::ranked(links.into_iter().filter_map(|el| {
            let label: String = el.text.chars().take(50).collect();
            el.href.map(|href| (href, label))
        })))
    }

    async fn open_store(&self, page: &dyn PageDriver, store: &Candidate) -> Result<()> {
        page.navigate(&store.url, WaitPolicy::DomContentLoaded).await?;
        settle(800).await;
        let landed = page.current_url().await?;
        if !landed.contains("/store/") {
            bail!("store navigation ended on {}", landed);
        }
        Ok(())
    }

    async fn add_items(
        &self,
        page: &dyn PageDriver,
        preference: &str,
        max_items: u32,
    ) -> Result<u32> {
        settle(500).await;
        let search = ElementQuery::css(r#"input[placeholder*="Search"]"#);
        match query_first(page, &search).await? {
            Some(input) => {
                let term = self.search_term(preference);
                debug!("searching store for {:?}", term);
                page.type_text(&input, &term).await?;
                page.press_key("Enter").await?;
                settle(1500).await;
            }
            None => debug!("no store search box; browsing all products"),
        }

        let buttons = page.query_all(&Self::add_buttons()).await?;
        if buttons.is_empty() {
            bail!("no Add buttons found");
        }

        let wanted = (max_items as usize).min(buttons.len());
        let mut added = 0u32;
        for button in buttons.iter().take(wanted) {
            match page.click(button).await {
                Ok(()) => {
                    added += 1;
                    settle(500).await;
                }
                Err(e) => debug!("could not click Add button #{}: {}", button.index, e),
            }
        }
        if added == 0 {
            bail!("failed to add any items");
        }
        Ok(added)
    }

    async fn cart_count(&self, page: &dyn PageDriver) -> Result<u32, DriverError> {
        Ok(query_first(page, &ElementQuery::css(CART_ICON))
            .await?
            .map(|el| parse_cart_count(&el.text))
            .unwrap_or(0))
    }

    async fn open_checkout(&self, page: &dyn PageDriver) -> Result<()> {
        if self.click_first(page, &ElementQuery::css(CART_BUTTONS)).await? {
            settle(2000).await;
        } else {
            debug!("cart button not found; looking for checkout directly");
        }

        let by_selector = self
            .click_first(page, &ElementQuery::css(CHECKOUT_BUTTONS))
            .await?;
        let clicked = by_selector
            || self
                .click_first(page, &ElementQuery::css("button").text_contains("checkout"))
                .await?;
        if !clicked {
            bail!("checkout button not found");
        }
        settle(3000).await;

        let intermediate = ElementQuery::css("button")
            .text_contains("continue")
            .text_contains("next")
            .text_contains("proceed");
        if self.click_first(page, &intermediate).await? {
            debug!("clicked intermediate checkout step");
            settle(2000).await;
        }
        Ok(())
    }

    async fn dismiss_consent_modal(&self, page: &dyn PageDriver) -> Result<bool, DriverError> {
        let overlay = count(page, &ElementQuery::css(MODAL_MARKERS)).await? > 0;
        let go_back = count(page, &ElementQuery::css("button").text_exact("go back")).await? > 0;
        if !overlay && !go_back {
            return Ok(false);
        }

        let sign_and_accept = ElementQuery::css("button")
            .within(DIALOG)
            .visible()
            .text_contains("sign and accept")
            .text_contains("sign & accept");
        let primary = ElementQuery::css("button")
            .within(DIALOG)
            .visible()
            .attr_contains("kind", "PRIMARY");
        let next = ElementQuery::css("button")
            .within(DIALOG)
            .visible()
            .text_exact("next");

        if let Some(button) = query_first(page, &sign_and_accept).await? {
            page.click(&button).await?;
            info!("accepted consent modal");
            return Ok(true);
        }
        if let Some(button) = query_first(page, &primary).await? {
            page.click(&button).await?;
            info!("clicked primary modal button {:?}", button.text);
            return Ok(true);
        }
        if let Some(button) = query_first(page, &next).await? {
            page.click(&button).await?;
            settle(2000).await;
            if let Some(accept) = query_first(page, &sign_and_accept).await? {
                page.click(&accept).await?;
                info!("accepted consent modal on second page");
            }
            return Ok(true);
        }
        Ok(false)
    }
}
