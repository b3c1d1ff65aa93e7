use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::DriverError;
use crate::core::config::PollSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Found { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PollOutcome::Found { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Found { attempts } | PollOutcome::Exhausted { attempts } => *attempts,
        }
    }
}

/// Fixed-interval, bounded-attempt wait for a page condition.
///
/// Sleeps one interval before every probe. A probe error (page navigated
/// away, element gone) counts as "not yet" for that attempt.
#[derive(Debug, Clone)]
pub struct ConfirmationPoller {
    label: &'static str,
    interval: Duration,
    max_attempts: u32,
    log_every: u32,
}

impl ConfirmationPoller {
    pub fn new(label: &'static str, settings: PollSettings) -> Self {
        Self {
            label,
            interval: settings.interval,
            max_attempts: settings.max_attempts,
            log_every: 0,
        }
    }

    /// Emit a progress line every `n` unsuccessful attempts (0 = never).
    pub fn log_every(mut self, n: u32) -> Self {
        self.log_every = n;
        self
    }

    pub async fn wait_for<F, Fut>(&self, mut probe: F) -> PollOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<bool, DriverError>>,
    {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;

            match probe(attempt).await {
                Ok(true) => {
                    debug!("{}: confirmed on attempt {}", self.label, attempt);
                    return PollOutcome::Found { attempts: attempt };
                }
                Ok(false) => {}
                Err(e) => debug!("{}: probe error on attempt {}: {}", self.label, attempt, e),
            }

            if self.log_every > 0 && attempt % self.log_every == 0 {
                info!(
                    "{}: still waiting ({:?} elapsed, attempt {}/{})",
                    self.label,
                    self.interval.saturating_mul(attempt),
                    attempt,
                    self.max_attempts
                );
            }
        }

        PollOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}
