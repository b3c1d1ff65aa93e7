//! Default marketplace adapter (classified listings with an inline message
//! composer on each listing page).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::offer::parse_price;
use super::{settle, MarketplaceSite};
use crate::browser::{
    body_text, count, query_first, DriverError, ElementHandle, ElementQuery, PageDriver,
    WaitPolicy,
};
use crate::session::model::Candidate;

const PROFILE_MARKERS: &str = concat!(
    r#"[aria-label="Your profile"], [aria-label="Account"], [data-click="profile_icon"], "#,
    r#"a[href*="/me/"], a[href*="/marketplace"]"#
);
const LISTING_EXCLUDES: [&str; 5] = ["/create", "/category", "ref=notif", "notif_id=", "notif_t="];
const LABEL_LIMIT: usize = 80;

/// Login heuristic: navigation chrome in the page text or a profile marker.
pub fn looks_logged_in(body: &str, has_profile_marker: bool) -> bool {
    let nav_menu = body.contains("Home")
        && (body.contains("Marketplace")
            || body.contains("Notifications")
            || body.contains("Messages"));
    nav_menu || has_profile_marker
}

/// Listing URL without its tracking query, so repeat sightings dedupe.
pub fn canonical_listing_url(href: &str) -> String {
    match Url::parse(href) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => href.split(['?', '#']).next().unwrap_or(href).to_string(),
    }
}

fn listing_label(text: &str) -> String {
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.chars().take(LABEL_LIMIT).collect()
    }
}

#[derive(Debug, Clone)]
pub struct DefaultMarketplace {
    base_url: String,
}

impl DefaultMarketplace {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn search_url(&self, term: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/marketplace/category/search/", self.base_url))
            .with_context(|| format!("invalid marketplace url {}", self.base_url))?;
        url.query_pairs_mut().append_pair("query", term);
        Ok(url.to_string())
    }

    fn listing_links() -> ElementQuery {
        ElementQuery::css(r#"a[href*="/marketplace/item/"]"#)
            .href_excludes(LISTING_EXCLUDES)
            .outside(r#"[role="complementary"]"#)
    }

    fn composer() -> ElementQuery {
        ElementQuery::css("textarea").visible()
    }
}

#[async_trait]
impl MarketplaceSite for DefaultMarketplace {
    async fn open_home(&self, page: &dyn PageDriver) -> Result<()> {
        let home = format!("{}/marketplace", self.base_url);
        page.navigate(&home, WaitPolicy::DomContentLoaded)
            .await
            .with_context(|| format!("failed to open {}", home))?;
        settle(500).await;
        Ok(())
    }

    async fn is_authenticated(&self, page: &dyn PageDriver) -> Result<bool, DriverError> {
        let body = body_text(page).await?;
        let has_marker = count(page, &ElementQuery::css(PROFILE_MARKERS)).await? > 0;
        Ok(looks_logged_in(&body, has_marker))
    }

    async fn search(&self, page: &dyn PageDriver, term: &str, scroll_passes: u32) -> Result<()> {
        let url = self.search_url(term)?;
        debug!("searching marketplace: {}", url);
        page.navigate(&url, WaitPolicy::DomContentLoaded).await?;
        settle(600).await;
        for _ in 0..scroll_passes {
            page.scroll_by(900).await?;
            settle(200).await;
        }
        Ok(())
    }

    async fn discover_listings(&self, page: &dyn PageDriver) -> Result<Vec<Candidate>> {
        let links = page.query_all(&Self::listing_links()).await?;
        let found = links.into_iter().filter_map(|el| {
            if el.text.contains("Unread") {
                return None;
            }
            let href = el.href?;
            Some((canonical_listing_url(&href), listing_label(&el.text)))
        });
        Ok(Candidate::ranked(found))
    }

    async fn open_listing(&self, page: &dyn PageDriver, listing: &Candidate) -> Result<()> {
        page.navigate(&listing.url, WaitPolicy::NetworkIdle).await?;
        settle(1500).await;
        Ok(())
    }

    async fn find_composer(
        &self,
        page: &dyn PageDriver,
    ) -> Result<Option<ElementHandle>, DriverError> {
        query_first(page, &Self::composer()).await
    }

    async fn listing_price(&self, page: &dyn PageDriver) -> Result<Option<u64>, DriverError> {
        Ok(parse_price(&body_text(page).await?))
    }

    async fn draft_message(
        &self,
        page: &dyn PageDriver,
        composer: &ElementHandle,
        text: &str,
    ) -> Result<()> {
        page.click(composer).await?;
        settle(300).await;
        page.type_text(composer, text).await?;
        settle(300).await;

        let typed = query_first(page, &Self::composer())
            .await?
            .and_then(|el| el.value)
            .unwrap_or_default();
        if typed != text {
            bail!(
                "composer holds {} char(s), expected {}",
                typed.chars().count(),
                text.chars().count()
            );
        }
        Ok(())
    }

    async fn composer_cleared(&self, page: &dyn PageDriver) -> Result<bool, DriverError> {
        Ok(query_first(page, &Self::composer())
            .await?
            .is_some_and(|el| el.value.as_deref().unwrap_or_default().is_empty()))
    }

    async fn dismiss_composer(&self, page: &dyn PageDriver) -> Result<()> {
        page.press_key("Escape").await?;
        settle(300).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_from_navigation_chrome() {
        assert!(looks_logged_in("Home Marketplace Groups", false));
        assert!(looks_logged_in("Home  Messages", false));
        assert!(!looks_logged_in("Home", false));
        assert!(!looks_logged_in("Log In Create New Account", false));
        assert!(looks_logged_in("Log In", true));
    }

    #[test]
    fn listing_urls_drop_tracking_params() {
        assert_eq!(
            canonical_listing_url("https://www.facebook.com/marketplace/item/123/?ref=search&tracking=abc"),
            "https://www.facebook.com/marketplace/item/123/"
        );
        assert_eq!(canonical_listing_url("/marketplace/item/9?x=1"), "/marketplace/item/9");
    }

    #[test]
    fn search_url_encodes_term() {
        let site = DefaultMarketplace::new("https://www.facebook.com/");
        assert_eq!(
            site.search_url("standing desk & chair").unwrap(),
            "https://www.facebook.com/marketplace/category/search/?query=standing+desk+%26+chair"
        );
    }

    #[test]
    fn labels_are_trimmed_and_bounded() {
        assert_eq!(listing_label("   "), "Unknown");
        assert_eq!(listing_label(" $40\n  Oak desk "), "$40 Oak desk");
        assert_eq!(listing_label(&"x".repeat(200)).len(), LABEL_LIMIT);
    }
}
