//! Storefront order: log in, prepare the cart, find a store that carries the
//! items, hold a cancellation window, then open checkout and hand the browser
//! to the human for the final step.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{await_login, Outcome, Workflow};
use crate::browser::{PageDriver, WaitPolicy};
use crate::session::error::SessionError;
use crate::session::model::{Candidate, OrderIntent, SessionStatus};
use crate::session::poller::ConfirmationPoller;
use crate::session::registry::SessionHandle;
use crate::session::retry::{CandidateAction, RetryCoordinator};
use crate::session::window::{self, WindowOutcome};
use crate::sites::{settle, StorefrontSite};

/// One store attempt: open the store and add up to `per_store` items.
/// Reset returns to the category page stores were discovered on.
struct StoreAttempt<'a> {
    session: &'a SessionHandle,
    site: &'a dyn StorefrontSite,
    page: &'a dyn PageDriver,
    category_url: &'a str,
    preference: &'a str,
    per_store: u32,
}

#[async_trait]
impl CandidateAction for StoreAttempt<'_> {
    type Output = u32;

    async fn run(&mut self, store: &Candidate) -> Result<u32> {
        self.session.update(|s| s.record_candidate_tried());
        self.site.open_store(self.page, store).await?;
        let added = self
            .site
            .add_items(self.page, self.preference, self.per_store)
            .await?;
        if added == 0 {
            bail!("no items added at {}", store.label);
        }
        Ok(added)
    }

    async fn reset(&mut self) -> Result<()> {
        self.page
            .navigate(self.category_url, WaitPolicy::DomContentLoaded)
            .await?;
        settle(500).await;
        Ok(())
    }
}

fn degraded(step: &'static str, reason: impl std::fmt::Display) {
    warn!("{}", SessionError::degraded(step, reason));
}

pub async fn run(
    flow: &Workflow<'_>,
    site: &dyn StorefrontSite,
    intent: &OrderIntent,
) -> Result<Outcome, SessionError> {
    let Workflow {
        session,
        page,
        settings,
    } = *flow;
    let cfg = &settings.order;

    if let Err(e) = site.open_home(page).await {
        degraded("pending-auth", format!("{:#}", e));
    }
    await_login(settings.auth_poll, || site.is_authenticated(page)).await?;

    session.transition(SessionStatus::Configuring)?;
    match intent.delivery_address.as_deref() {
        Some(address) => {
            if let Err(e) = site.set_delivery_address(page, address).await {
                degraded("configuring", format!("{:#}; using the saved address", e));
            }
        }
        None => debug!("no delivery address given; keeping the saved one"),
    }

    session.transition(SessionStatus::ClearingCart)?;
    if let Err(e) = site.clear_cart(page).await {
        degraded("clearing-cart", format!("{:#}", e));
    }

    session.transition(SessionStatus::SelectingCandidate)?;
    let category_url = site.open_category(page).await.map_err(|e| {
        warn!("category page unavailable: {:#}", e);
        SessionError::NoViableCandidate { tried: 0 }
    })?;
    let stores = site.discover_stores(page).await.unwrap_or_else(|e| {
        warn!("store discovery failed: {:#}", e);
        Vec::new()
    });
    info!("discovered {} store(s)", stores.len());

    let mut attempt = StoreAttempt {
        session,
        site,
        page,
        category_url: &category_url,
        preference: &intent.item_preference,
        per_store: intent.quantity.min(cfg.items_per_store),
    };
    let won = RetryCoordinator::new(cfg.max_store_attempts)
        .attempt(&stores, &mut attempt)
        .await
        .map_err(|e| {
            warn!("{} (last error: {})", e, e.last_error.as_deref().unwrap_or("none"));
            SessionError::NoViableCandidate { tried: e.tried }
        })?;
    info!(
        "{} item(s) added at {} after {} attempt(s)",
        won.value, won.candidate.label, won.tried
    );

    session.transition(SessionStatus::AddingItems)?;
    session.update(|s| s.record_items(won.value));
    match site.cart_count(page).await {
        Ok(n) if n == won.value => debug!("cart readback confirms {} item(s)", n),
        Ok(n) => degraded(
            "adding-items",
            format!("cart shows {} item(s), expected {}", n, won.value),
        ),
        Err(e) => degraded("adding-items", e),
    }

    let (handle, timer) = window::arm(cfg.cancel_window);
    session.arm_cancellation(handle)?;
    info!("order pending; cancel within {:?}", cfg.cancel_window);
    if timer.expired().await == WindowOutcome::Cancelled {
        info!("cancelled during the window");
        return Ok(Outcome::Cancelled);
    }

    session.transition(SessionStatus::Finalizing)?;
    if let Err(e) = site.open_checkout(page).await {
        degraded("finalizing", format!("{:#}", e));
    }
    let modal = ConfirmationPoller::new("consent modal", cfg.modal_poll)
        .wait_for(|_| site.dismiss_consent_modal(page))
        .await;
    if modal.is_found() {
        info!("consent modal handled");
    } else {
        debug!("no consent modal after {} check(s)", modal.attempts());
    }

    session.transition(SessionStatus::AwaitingManualConfirmation)?;
    info!(
        "checkout is open; place the order in the browser (holding it for {:?})",
        cfg.manual_confirmation_window
    );
    tokio::time::sleep(cfg.manual_confirmation_window).await;
    Ok(Outcome::Completed)
}
