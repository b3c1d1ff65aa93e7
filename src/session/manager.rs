//! The session API: start, cancel, status, shutdown.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::controller::SessionController;
use super::error::SessionError;
use super::model::{FailureCode, Session, SessionId, SessionIntent, SessionKind, SessionSnapshot};
use super::registry::{SessionHandle, SessionRegistry};
use crate::browser::DriverFactory;
use crate::core::config::Settings;
use crate::sites::{MarketplaceSite, StorefrontSite};

/// Collaborators every session controller is built from.
#[derive(Clone)]
pub struct SessionServices {
    pub drivers: Arc<dyn DriverFactory>,
    pub storefront: Arc<dyn StorefrontSite>,
    pub marketplace: Arc<dyn MarketplaceSite>,
    pub settings: Arc<Settings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveCounts {
    pub orders: usize,
    pub messaging: usize,
}

#[derive(Clone)]
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    services: SessionServices,
}

impl SessionManager {
    pub fn new(services: SessionServices) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            services,
        }
    }

    /// Register a new session and spawn its controller. The session is
    /// visible to `status` by the time this returns.
    pub async fn start(&self, intent: SessionIntent) -> SessionId {
        let id = uuid::Uuid::new_v4();
        let handle = Arc::new(SessionHandle::new(Session::new(id, intent.clone())));
        self.registry.insert(Arc::clone(&handle)).await;
        info!("session {} ({}) registered", id, handle.kind);

        let controller = SessionController::new(Arc::clone(&handle), intent, self.services.clone());
        let registry = Arc::clone(&self.registry);
        let eviction_delay = self.services.settings.eviction_delay;
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(controller.run()).await {
                error!("session {} controller aborted: {}", id, e);
                handle.fail(FailureCode::Internal);
                handle.mark_finished();
            }
            tokio::time::sleep(eviction_delay).await;
            registry.remove(&id).await;
            debug!("session {} evicted", id);
        });
        id
    }

    pub async fn cancel(&self, id: SessionId) -> Result<(), SessionError> {
        let handle = self
            .registry
            .get(&id)
            .await
            .ok_or(SessionError::NotFound(id))?;
        handle.cancel()
    }

    pub async fn status(&self, id: SessionId) -> SessionSnapshot {
        match self.registry.get(&id).await {
            Some(handle) => handle.snapshot(),
            None => SessionSnapshot::not_found(id),
        }
    }

    /// Non-terminal sessions per kind.
    pub async fn active_counts(&self) -> ActiveCounts {
        let mut counts = ActiveCounts::default();
        for handle in self.registry.all().await {
            if handle.status().is_terminal() {
                continue;
            }
            match handle.kind {
                SessionKind::Order => counts.orders += 1,
                SessionKind::Messaging => counts.messaging += 1,
            }
        }
        counts
    }

    /// Interrupt every running session and wait up to `grace` for their
    /// browsers to be released.
    pub async fn shutdown(&self, grace: Duration) {
        let running: Vec<_> = self
            .registry
            .all()
            .await
            .into_iter()
            .filter(|h| !h.is_finished())
            .collect();
        if running.is_empty() {
            return;
        }

        info!("interrupting {} running session(s)", running.len());
        for handle in &running {
            handle.interrupt();
        }
        let all_done = join_all(running.iter().map(|h| h.finished()));
        if tokio::time::timeout(grace, all_done).await.is_err() {
            warn!("some sessions did not finish within {:?}", grace);
        }
    }
}
