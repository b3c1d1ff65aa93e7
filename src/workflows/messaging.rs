//! Marketplace messaging: search once, then walk the listings in discovery
//! order drafting an offer on each. The human presses send; the run counts a
//! message once the composer empties.

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{await_login, Outcome, Workflow};
use crate::browser::PageDriver;
use crate::session::error::SessionError;
use crate::session::model::{Candidate, MessagingIntent, SessionStatus};
use crate::session::poller::ConfirmationPoller;
use crate::sites::offer::offer_message;
use crate::sites::{settle, MarketplaceSite};

pub async fn run(
    flow: &Workflow<'_>,
    site: &dyn MarketplaceSite,
    intent: &MessagingIntent,
) -> Result<Outcome, SessionError> {
    let Workflow {
        session,
        page,
        settings,
    } = *flow;
    let cfg = &settings.messaging;

    if let Err(e) = site.open_home(page).await {
        warn!("{}", SessionError::degraded("pending-auth", format!("{:#}", e)));
    }
    await_login(settings.auth_poll, || site.is_authenticated(page)).await?;

    session.transition(SessionStatus::Searching)?;
    if let Err(e) = site.search(page, &intent.search_term, cfg.scroll_passes).await {
        warn!("{}", SessionError::degraded("searching", format!("{:#}", e)));
    }
    let listings = site.discover_listings(page).await.unwrap_or_else(|e| {
        warn!("listing discovery failed: {:#}", e);
        Vec::new()
    });
    if listings.is_empty() {
        warn!("no listings found for {:?}", intent.search_term);
        return Err(SessionError::NoViableCandidate { tried: 0 });
    }
    info!(
        "discovered {} listing(s); target is {} message(s)",
        listings.len(),
        intent.target_count
    );

    session.transition(SessionStatus::ContactingCandidate)?;
    let poller = ConfirmationPoller::new("message send", cfg.send_poll).log_every(10);
    let mut sent = 0u32;
    for listing in &listings {
        info!(
            "listing {}/{}: {} ({}/{} sent)",
            listing.rank,
            listings.len(),
            listing.label,
            sent,
            intent.target_count
        );
        session.update(|s| s.record_candidate_tried());

        match contact(site, page, listing, &poller, cfg.offer_ratio).await {
            Ok(true) => {
                sent += 1;
                session.update(|s| s.record_message_sent());
                info!("message {} sent", sent);
            }
            Ok(false) => {}
            Err(e) => warn!("skipping listing {}: {:#}", listing.rank, e),
        }

        if sent >= intent.target_count {
            break;
        }
        settle(300).await;
    }

    if sent < intent.target_count {
        info!(
            "listings exhausted with {}/{} message(s) sent",
            sent, intent.target_count
        );
    }
    debug!("holding the browser for review ({:?})", cfg.review_hold);
    tokio::time::sleep(cfg.review_hold).await;
    Ok(Outcome::Completed)
}

/// Draft an offer on one listing and wait for the human to send it.
/// `Ok(false)` when the listing was skipped or the send never happened.
async fn contact(
    site: &dyn MarketplaceSite,
    page: &dyn PageDriver,
    listing: &Candidate,
    poller: &ConfirmationPoller,
    ratio: f64,
) -> Result<bool> {
    site.open_listing(page, listing).await?;

    let Some(composer) = site.find_composer(page).await? else {
        info!("no message box; seller already contacted");
        return Ok(false);
    };

    let price = site.listing_price(page).await.unwrap_or_else(|e| {
        debug!("price lookup failed: {}", e);
        None
    });
    let message = offer_message(price, ratio);
    site.draft_message(page, &composer, &message).await?;
    info!("offer drafted ({:?}); press send in the browser", price);

    let outcome = poller.wait_for(|_| site.composer_cleared(page)).await;
    if !outcome.is_found() {
        info!("no send after {} check(s); moving on", outcome.attempts());
    }
    if let Err(e) = site.dismiss_composer(page).await {
        debug!("could not dismiss composer: {:#}", e);
    }
    Ok(outcome.is_found())
}
