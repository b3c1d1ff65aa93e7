//! Owns one session from launch to teardown.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};

use super::error::SessionError;
use super::manager::SessionServices;
use super::model::{FailureCode, SessionIntent, SessionStatus};
use super::registry::SessionHandle;
use crate::browser::PageDriver;
use crate::workflows::{self, Outcome, Workflow};

pub struct SessionController {
    handle: Arc<SessionHandle>,
    intent: SessionIntent,
    services: SessionServices,
}

/// Resolves once the abort flag is raised. Never resolves if the sender is gone.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|abort| *abort).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl SessionController {
    pub fn new(handle: Arc<SessionHandle>, intent: SessionIntent, services: SessionServices) -> Self {
        Self {
            handle,
            intent,
            services,
        }
    }

    /// Drive the session to a terminal status. The browser is released on
    /// every path before the final status is recorded.
    pub async fn run(self) {
        let span = info_span!("session", id = %self.handle.id, kind = %self.handle.kind);
        async move {
            info!("session started");
            let mut abort = self.handle.abort_signal();

            let opened = tokio::select! {
                opened = self.services.drivers.open(self.handle.kind.site()) => {
                    opened.map_err(|e| SessionError::BrowserUnavailable(format!("{:#}", e)))
                }
                _ = aborted(&mut abort) => Err(SessionError::Interrupted),
            };
            let page = match opened {
                Ok(page) => page,
                Err(e) => {
                    error!("{}", e);
                    self.settle(Err(e));
                    self.handle.mark_finished();
                    return;
                }
            };

            let result = tokio::select! {
                result = self.drive(page.as_ref()) => result,
                _ = aborted(&mut abort) => {
                    warn!("interrupted");
                    Err(SessionError::Interrupted)
                }
            };

            self.release(page.as_ref()).await;
            self.settle(result);
            self.handle.mark_finished();
            info!("session finished as {}", self.handle.status());
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, page: &dyn PageDriver) -> Result<Outcome, SessionError> {
        let flow = Workflow {
            session: &self.handle,
            page,
            settings: &self.services.settings,
        };
        match &self.intent {
            SessionIntent::Order(intent) => {
                workflows::order::run(&flow, self.services.storefront.as_ref(), intent).await
            }
            SessionIntent::Messaging(intent) => {
                workflows::messaging::run(&flow, self.services.marketplace.as_ref(), intent).await
            }
        }
    }

    async fn release(&self, page: &dyn PageDriver) {
        if let Err(e) = page.close().await {
            warn!(
                "{}",
                SessionError::ResourceTeardownFailure(e.to_string())
            );
        }
    }

    fn settle(&self, result: Result<Outcome, SessionError>) {
        match result {
            Ok(Outcome::Completed) => {
                let _ = self.handle.transition(SessionStatus::Completed);
            }
            Ok(Outcome::Cancelled) => {}
            Err(SessionError::Interrupted)
                if self.handle.status() == SessionStatus::PendingCancellation =>
            {
                if self.handle.cancel().is_err() {
                    self.handle.fail(FailureCode::Interrupted);
                }
            }
            Err(e) => {
                if !self.handle.status().is_terminal() {
                    error!("session failed: {}", e);
                }
                self.handle
                    .fail(e.failure_code().unwrap_or(FailureCode::Internal));
            }
        }
    }
}
