use thiserror::Error;

use super::model::{FailureCode, SessionId, SessionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no logged-in session detected within the login window")]
    NotAuthenticated,

    #[error("no viable candidate after {tried} attempt(s)")]
    NoViableCandidate { tried: usize },

    #[error("step `{step}` degraded: {reason}")]
    StepDegraded { step: &'static str, reason: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("browser teardown failed: {0}")]
    ResourceTeardownFailure(String),

    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("session interrupted by shutdown")]
    Interrupted,

    #[error("illegal transition {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("invalid request: {0}")]
    InvalidIntent(String),
}

impl SessionError {
    /// Errors that end the session as `failed`.
    pub fn is_fatal(&self) -> bool {
        self.failure_code().is_some()
    }

    /// The code recorded on a failed session. `None` for non-fatal errors.
    pub fn failure_code(&self) -> Option<FailureCode> {
        match self {
            SessionError::NotAuthenticated => Some(FailureCode::NotAuthenticated),
            SessionError::NoViableCandidate { .. } => Some(FailureCode::NoViableCandidate),
            SessionError::BrowserUnavailable(_) => Some(FailureCode::BrowserUnavailable),
            SessionError::Interrupted => Some(FailureCode::Interrupted),
            SessionError::InvalidTransition { .. } => Some(FailureCode::Internal),
            _ => None,
        }
    }

    pub fn degraded(step: &'static str, reason: impl std::fmt::Display) -> Self {
        SessionError::StepDegraded {
            step,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_carry_failure_codes() {
        assert_eq!(
            SessionError::NotAuthenticated.failure_code(),
            Some(FailureCode::NotAuthenticated)
        );
        assert!(SessionError::NoViableCandidate { tried: 5 }.is_fatal());
        assert!(SessionError::Interrupted.is_fatal());
        assert!(!SessionError::degraded("clearing-cart", "no button").is_fatal());
        assert!(!SessionError::InvalidOperation("x".into()).is_fatal());
        assert!(!SessionError::ResourceTeardownFailure("x".into()).is_fatal());
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = SessionError::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Finalizing,
        };
        assert_eq!(err.to_string(), "illegal transition completed -> finalizing");
    }
}
