//! Multi-candidate retry.
//!
//! Candidates are tried strictly in discovery order until one succeeds, up to
//! `min(candidates.len(), max_attempts)` attempts. The action's `reset` runs
//! before every retry (never before the first attempt) to put the page back
//! at a known baseline.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use super::model::Candidate;

#[async_trait]
pub trait CandidateAction: Send {
    type Output: Send;

    async fn run(&mut self, candidate: &Candidate) -> anyhow::Result<Self::Output>;

    /// Restore the baseline the next attempt starts from.
    async fn reset(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct RetrySuccess<T> {
    pub value: T,
    pub candidate: Candidate,
    /// Attempts made, including the successful one.
    pub tried: usize,
}

#[derive(Debug, Error)]
#[error("no candidate succeeded after {tried} attempt(s)")]
pub struct RetryExhausted {
    pub tried: usize,
    /// For logs only.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryCoordinator {
    max_attempts: usize,
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RetryCoordinator {
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts }
    }

    pub fn ceiling(&self, candidates: usize) -> usize {
        candidates.min(self.max_attempts)
    }

    pub async fn attempt<A>(
        &self,
        candidates: &[Candidate],
        action: &mut A,
    ) -> Result<RetrySuccess<A::Output>, RetryExhausted>
    where
        A: CandidateAction,
    {
        let ceiling = self.ceiling(candidates.len());
        let mut last_error = None;

        for (i, candidate) in candidates.iter().take(ceiling).enumerate() {
            if i > 0 {
                if let Err(e) = action.reset().await {
                    warn!("reset before attempt {} failed: {:#}", i + 1, e);
                }
            }

            info!(
                "attempt {}/{}: {} ({})",
                i + 1,
                ceiling,
                candidate.label,
                candidate.url
            );
            match action.run(candidate).await {
                Ok(value) => {
                    return Ok(RetrySuccess {
                        value,
                        candidate: candidate.clone(),
                        tried: i + 1,
                    })
                }
                Err(e) => {
                    warn!("attempt {}/{} failed: {:#}", i + 1, ceiling, e);
                    last_error = Some(format!("{:#}", e));
                }
            }
        }

        Err(RetryExhausted {
            tried: ceiling,
            last_error,
        })
    }
}
