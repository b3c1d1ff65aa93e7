//! The two session workflows. Each one sequences site-adapter calls, moves
//! the session through its states and returns how the run ended; releasing
//! the browser and recording the final status belong to the controller.

pub mod messaging;
pub mod order;

use std::future::Future;
use tracing::{debug, info};

use crate::browser::{DriverError, PageDriver};
use crate::core::config::{PollSettings, Settings};
use crate::session::error::SessionError;
use crate::session::poller::ConfirmationPoller;
use crate::session::registry::SessionHandle;

/// How a workflow that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ready for `completed` once the browser is released.
    Completed,
    /// A caller cancelled during the window; status is already `cancelled`.
    Cancelled,
}

/// Everything a workflow step needs.
pub struct Workflow<'a> {
    pub session: &'a SessionHandle,
    pub page: &'a dyn PageDriver,
    pub settings: &'a Settings,
}

/// Wait for a human to log in: one immediate check, then the login poller.
pub(crate) async fn await_login<F, Fut>(poll: PollSettings, mut probe: F) -> Result<(), SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, DriverError>>,
{
    match probe().await {
        Ok(true) => {
            info!("already logged in");
            return Ok(());
        }
        Ok(false) => {}
        Err(e) => debug!("initial login check failed: {}", e),
    }

    info!(
        "not logged in; log in from the browser window (waiting up to {:?})",
        poll.budget()
    );
    let outcome = ConfirmationPoller::new("login", poll)
        .log_every(5)
        .wait_for(|_| probe())
        .await;

    if outcome.is_found() {
        info!("login detected after {} check(s)", outcome.attempts());
        Ok(())
    } else {
        Err(SessionError::NotAuthenticated)
    }
}
