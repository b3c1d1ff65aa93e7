//! Time-boxed cancellation window.
//!
//! [`arm`] returns a [`WindowHandle`] (held by the session, used to cancel and
//! to report time remaining) and a [`WindowTimer`] (awaited by the
//! controller). Expiry and cancellation are both decided under the window's
//! own lock, so exactly one of them wins.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

// Deadline used when `now + duration` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowState {
    Armed,
    Cancelled,
    Expired,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<WindowState>,
    deadline: Instant,
    notify: Notify,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn arm(duration: Duration) -> (WindowHandle, WindowTimer) {
    let now = Instant::now();
    let deadline = now.checked_add(duration).unwrap_or(now + FAR_FUTURE);
    let shared = Arc::new(Shared {
        state: Mutex::new(WindowState::Armed),
        deadline,
        notify: Notify::new(),
    });
    (
        WindowHandle {
            shared: Arc::clone(&shared),
        },
        WindowTimer { shared },
    )
}

#[derive(Debug, Clone)]
pub struct WindowHandle {
    shared: Arc<Shared>,
}

impl WindowHandle {
    /// Cancel the window. Returns `true` only for the call that moved an armed
    /// window to cancelled; after expiry or an earlier cancel this is a no-op.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state();
        if *state != WindowState::Armed {
            return false;
        }
        *state = WindowState::Cancelled;
        drop(state);
        self.shared.notify.notify_one();
        true
    }

    pub fn is_armed(&self) -> bool {
        *self.shared.state() == WindowState::Armed
    }

    /// Time left before expiry; zero once the window is decided.
    pub fn remaining(&self) -> Duration {
        if !self.is_armed() {
            return Duration::ZERO;
        }
        self.shared
            .deadline
            .saturating_duration_since(Instant::now())
    }
}

#[derive(Debug)]
pub struct WindowTimer {
    shared: Arc<Shared>,
}

impl WindowTimer {
    /// Resolve once the window either expires or is cancelled.
    pub async fn expired(self) -> WindowOutcome {
        tokio::select! {
            _ = tokio::time::sleep_until(self.shared.deadline) => {}
            _ = self.shared.notify.notified() => {}
        }

        let mut state = self.shared.state();
        match *state {
            WindowState::Armed => {
                *state = WindowState::Expired;
                WindowOutcome::Expired
            }
            WindowState::Cancelled => WindowOutcome::Cancelled,
            WindowState::Expired => WindowOutcome::Expired,
        }
    }
}
