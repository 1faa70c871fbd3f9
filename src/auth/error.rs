use thiserror::Error;

use crate::error::Error;
use crate::logging::{Level, Severity};
use crate::model::session::AuthStep;

/// Ways a login step can fail. None of them is fatal; the session is always
/// left in a well-defined step.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("This account has been deactivated")]
    AccountDeactivated,
    #[error("Incorrect PIN, {attempts_remaining} attempts remaining")]
    IncorrectPin { attempts_remaining: u8 },
    #[error("Security key authentication failed")]
    SecurityKeyFailed,
    #[error("Biometric verification failed")]
    BiometricFailed,
    #[error("Expected the {expected} step but the session is at {actual}")]
    OutOfSequence { expected: AuthStep, actual: AuthStep },
    #[error("No login in progress")]
    NoPendingLogin,
    #[error(transparent)]
    Storage(#[from] Error),
}

impl AuthError {
    /// Whether the caller may try the same step again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IncorrectPin { attempts_remaining } if *attempts_remaining > 0)
    }
}

impl Severity for AuthError {
    fn severity(&self) -> Level {
        match self {
            Self::Storage(_) => Level::Failed,
            _ => Level::Rejected,
        }
    }
}
