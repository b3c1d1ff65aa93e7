mod support;

use std::time::Duration;

use handoff::session::model::MessagingIntent;
use handoff::session::{FailureCode, SessionIntent, SessionStatus::*};
use support::{status_is, FakeMarketplace, FakeStorefront, Harness, Listing};

fn messaging(harness: &Harness, term: &str, target: i64) -> SessionIntent {
    SessionIntent::Messaging(
        MessagingIntent::new(
            Some(term.into()),
            Some(target),
            &harness.services.settings.messaging,
        )
        .unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn stops_as_soon_as_target_is_reached() {
    use Listing::*;
    let h = Harness::new(
        FakeStorefront::default(),
        FakeMarketplace::new(&[TimesOut, Sends, TimesOut, Sends, Sends, Sends]),
    );
    let id = h.manager.start(messaging(&h, "road bike", 3)).await;

    let done = h.wait_until_terminal(id).await;
    assert!(status_is(&done, Completed));
    let progress = done.progress.unwrap();
    assert_eq!(progress.messages_sent, 3);
    assert_eq!(progress.target, 3);
    assert_eq!(progress.candidates_tried, 5);
    assert_eq!(h.marketplace.opened(), vec![1, 2, 3, 4, 5]);
    assert_eq!(
        done.transitions,
        vec![PendingAuth, Searching, ContactingCandidate, Completed]
    );
    assert_eq!(h.browser.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn fewer_contactable_listings_than_target_still_completes() {
    use Listing::*;
    let h = Harness::new(
        FakeStorefront::default(),
        FakeMarketplace::new(&[Sends, AlreadyContacted, Sends, TimesOut]),
    );
    let id = h.manager.start(messaging(&h, "desk", 10)).await;

    let done = h.wait_until_terminal(id).await;
    assert!(status_is(&done, Completed));
    assert_eq!(done.progress.unwrap().messages_sent, 2);
    assert_eq!(h.marketplace.opened(), vec![1, 2, 3, 4]);
    // Nothing is drafted for a seller that was already contacted.
    assert_eq!(h.marketplace.drafts().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn drafted_offer_uses_listing_price() {
    let h = Harness::new(
        FakeStorefront::default(),
        FakeMarketplace::new(&[Listing::Sends]),
    );
    let id = h.manager.start(messaging(&h, "lamp", 1)).await;
    h.wait_until_terminal(id).await;

    assert_eq!(
        h.marketplace.drafts(),
        vec!["Hey! I'm really interested in this! Would you be willing to accept $20? Let me know, thanks!"]
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_send_waits_the_full_poll_budget() {
    let h = Harness::new(
        FakeStorefront::default(),
        FakeMarketplace::new(&[Listing::TimesOut]),
    );
    let started = tokio::time::Instant::now();
    let id = h.manager.start(messaging(&h, "chair", 1)).await;

    let contacting = h.wait_for_status(id, ContactingCandidate).await;
    assert_eq!(contacting.progress.unwrap().messages_sent, 0);

    let done = h.wait_until_terminal(id).await;
    assert!(status_is(&done, Completed));
    assert_eq!(done.progress.unwrap().messages_sent, 0);
    // 60 polls at 500 ms, then the review hold.
    assert!(started.elapsed() >= Duration::from_secs(30 + 30));
}

#[tokio::test(start_paused = true)]
async fn no_listings_fails_no_viable_candidate() {
    let h = Harness::new(FakeStorefront::default(), FakeMarketplace::new(&[]));
    let id = h.manager.start(messaging(&h, "unobtainium", 5)).await;

    let done = h.wait_until_terminal(id).await;
    assert!(status_is(&done, Failed));
    assert_eq!(done.failure, Some(FailureCode::NoViableCandidate));
    assert_eq!(done.transitions, vec![PendingAuth, Searching, Failed]);
    assert_eq!(h.browser.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_messaging() {
    let h = Harness::new(
        FakeStorefront::default(),
        FakeMarketplace::new(&[Listing::TimesOut, Listing::TimesOut]),
    );
    let id = h.manager.start(messaging(&h, "bike", 2)).await;
    h.wait_for_status(id, ContactingCandidate).await;
    assert_eq!(h.manager.active_counts().await.messaging, 1);

    h.manager.shutdown(Duration::from_secs(5)).await;

    let done = h.manager.status(id).await;
    assert!(status_is(&done, Failed));
    assert_eq!(done.failure, Some(FailureCode::Interrupted));
    assert_eq!(h.browser.closed(), 1);
    assert_eq!(h.manager.active_counts().await.messaging, 0);
}
