//! In-memory session registry and the per-session handle shared between the
//! controller task and API callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use super::error::SessionError;
use super::model::{FailureCode, Session, SessionId, SessionKind, SessionSnapshot, SessionStatus};
use super::window::WindowHandle;

/// Shared view of one session.
///
/// The session itself sits behind a `std::sync::Mutex` that is only ever held
/// for a handful of field updates, never across an `.await`.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub kind: SessionKind,
    state: Mutex<Session>,
    abort: watch::Sender<bool>,
    finished: watch::Sender<bool>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            id: session.id,
            kind: session.kind(),
            state: Mutex::new(session),
            abort: watch::Sender::new(false),
            finished: watch::Sender::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status()
    }

    pub fn transition(&self, next: SessionStatus) -> Result<(), SessionError> {
        let mut session = self.lock();
        let from = session.status();
        match session.transition(next) {
            Ok(()) => {
                info!("{} -> {}", from, next);
                Ok(())
            }
            Err(e) => {
                warn!("rejected: {}", e);
                Err(e)
            }
        }
    }

    /// Apply a progress update.
    pub fn update<F: FnOnce(&mut Session)>(&self, f: F) {
        f(&mut self.lock());
    }

    pub fn arm_cancellation(&self, window: WindowHandle) -> Result<(), SessionError> {
        let mut session = self.lock();
        let from = session.status();
        session.arm_cancellation(window)?;
        info!("{} -> {}", from, SessionStatus::PendingCancellation);
        Ok(())
    }

    /// Cancel a session sitting in its cancellation window.
    ///
    /// The status check, the window decision and the `cancelled` transition
    /// all happen under the session lock; the controller's own move to
    /// `finalizing` takes the same lock, so the two cannot interleave.
    pub fn cancel(&self) -> Result<(), SessionError> {
        let mut session = self.lock();
        let status = session.status();
        if status != SessionStatus::PendingCancellation {
            return Err(SessionError::InvalidOperation(format!(
                "session is {}; cancel is only accepted while pending-cancellation",
                status
            )));
        }
        let won = session.window().is_some_and(WindowHandle::cancel);
        if !won {
            return Err(SessionError::InvalidOperation(
                "cancellation window has elapsed".to_string(),
            ));
        }
        session.transition(SessionStatus::Cancelled)?;
        info!("{} -> {}", status, SessionStatus::Cancelled);
        Ok(())
    }

    /// Move to `failed` with `code`. No-op (logged) once terminal.
    pub fn fail(&self, code: FailureCode) {
        let mut session = self.lock();
        let from = session.status();
        match session.fail(code) {
            Ok(()) => warn!("{} -> failed ({:?})", from, code),
            Err(e) => warn!("could not record failure {:?}: {}", code, e),
        }
    }

    /// Ask the controller to stop at its next await point.
    pub fn interrupt(&self) {
        self.abort.send_replace(true);
    }

    pub fn abort_signal(&self) -> watch::Receiver<bool> {
        self.abort.subscribe()
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.send_replace(true);
    }

    /// Resolves once the controller has released the browser and settled the
    /// final status.
    pub async fn finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions.write().await.insert(handle.id, handle);
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn all(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().await.values().cloned().collect()
    }
}
