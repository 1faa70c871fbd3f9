//! The multi-factor login sequence.
//!
//! A login starts at [`AuthStep::Login`] with a password check, then walks
//! through whichever of the hardware-key and biometric steps the identity has
//! switched on, and always ends with a PIN. Each step is a separate call so
//! that the caller can present it however it likes.

use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::logging::OperationId;
use crate::model::{
    identity::{Identity, Pin},
    session::{AuthStep, Session},
};

pub use error::AuthError;
pub use events::{AuthEvent, AuthEventSink, LoginHistoryRecorder};

mod error;
mod events;

#[cfg(test)]
pub(crate) use events::testing::{EventLog, FailingSink};

type Result<T> = std::result::Result<T, AuthError>;

/// A step the user can fail or walk away from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepKind {
    SecurityKey,
    Biometric,
    Pin,
}

impl StepKind {
    fn step(self) -> AuthStep {
        match self {
            StepKind::SecurityKey => AuthStep::SecurityKeyAuth,
            StepKind::Biometric => AuthStep::Biometric,
            StepKind::Pin => AuthStep::Pin,
        }
    }
}

/// Drives sessions through the login steps.
#[derive(Clone)]
pub struct AuthSequencer {
    credentials: CredentialStore,
    sinks: Vec<Arc<dyn AuthEventSink>>,
    max_pin_attempts: u8,
}

impl AuthSequencer {
    pub fn new(credentials: CredentialStore, config: &Config) -> Self {
        Self {
            credentials,
            sinks: Vec::new(),
            max_pin_attempts: config.max_pin_attempts().max(1),
        }
    }

    /// Add a consumer for auth events. Consumers that write to the store
    /// should be added last; see [`AuthEventSink`].
    pub fn with_sink(mut self, sink: impl AuthEventSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn max_pin_attempts(&self) -> u8 {
        self.max_pin_attempts
    }

    /// Check an email and password and work out which step comes next.
    ///
    /// The identity's login history is updated here, as soon as the password
    /// matches, not when the whole sequence completes.
    pub fn attempt_primary_login(
        &self,
        session: &mut Session,
        email: &str,
        password: &str,
    ) -> Result<AuthStep> {
        let op = OperationId::start("attempt_primary_login", email.trim());
        let result = self.attempt_primary_login_inner(session, email, password);
        op.finish(&result);
        result
    }

    fn attempt_primary_login_inner(
        &self,
        session: &mut Session,
        email: &str,
        password: &str,
    ) -> Result<AuthStep> {
        expect_step(session, AuthStep::Login)?;
        let identity = match self.credentials.find_by_email(email)? {
            Some(identity) if identity.password_hash.verify(password)? => identity,
            _ => return Err(AuthError::InvalidCredentials),
        };
        if !identity.is_active() {
            return Err(AuthError::AccountDeactivated);
        }
        let next = first_factor(&identity);
        self.publish(AuthEvent::PrimaryLoginSucceeded {
            identity_id: identity.id,
            email: identity.email.clone(),
            at: Utc::now(),
        })?;
        // Pick up anything the sinks wrote, e.g. the new history entry.
        let identity = self
            .credentials
            .find_by_email(&identity.email)?
            .unwrap_or(identity);
        session.begin(identity, next);
        Ok(next)
    }

    /// The hardware key was accepted.
    pub fn advance_after_security_key(&self, session: &mut Session) -> Result<AuthStep> {
        let op = OperationId::start("advance_after_security_key", session.step());
        let result = expect_step(session, AuthStep::SecurityKeyAuth)
            .and_then(|_| pending(session))
            .map(|identity| {
                if identity.uses_biometrics() {
                    AuthStep::Biometric
                } else {
                    AuthStep::Pin
                }
            });
        if let Ok(next) = result {
            session.advance(next);
        }
        op.finish(&result);
        result
    }

    /// The biometric check passed.
    pub fn advance_after_biometric(&self, session: &mut Session) -> Result<AuthStep> {
        let op = OperationId::start("advance_after_biometric", session.step());
        let result = expect_step(session, AuthStep::Biometric)
            .and_then(|_| pending(session))
            .map(|_| AuthStep::Pin);
        if let Ok(next) = result {
            session.advance(next);
        }
        op.finish(&result);
        result
    }

    /// Compare the entered PIN with the pending identity's.
    ///
    /// On a match the session is established. Otherwise the attempt is
    /// counted, and once the budget is spent the login is abandoned.
    pub fn complete_pin(&self, session: &mut Session, entered: &Pin) -> Result<Identity> {
        let op = OperationId::start("complete_pin", session.step());
        let result = self.complete_pin_inner(session, entered);
        op.finish(&result);
        result
    }

    fn complete_pin_inner(&self, session: &mut Session, entered: &Pin) -> Result<Identity> {
        expect_step(session, AuthStep::Pin)?;
        let identity = pending(session)?;
        if identity.pin.as_ref() != Some(entered) {
            return Err(self.pin_failure(session));
        }
        self.publish(AuthEvent::SessionEstablished {
            identity_id: identity.id,
            at: Utc::now(),
        })?;
        session
            .establish()
            .cloned()
            .ok_or(AuthError::NoPendingLogin)
    }

    /// The user failed or abandoned `kind`. Returns the error to report.
    ///
    /// Hardware-key and biometric failures send the session back to the start.
    /// A PIN failure uses up one attempt and only restarts once the budget runs out.
    pub fn fail(&self, session: &mut Session, kind: StepKind) -> AuthError {
        let op = OperationId::start("fail", session.step());
        let error = match expect_step(session, kind.step()) {
            Err(err) => err,
            Ok(()) => match kind {
                StepKind::SecurityKey => {
                    session.reset();
                    AuthError::SecurityKeyFailed
                }
                StepKind::Biometric => {
                    session.reset();
                    AuthError::BiometricFailed
                }
                StepKind::Pin => self.pin_failure(session),
            },
        };
        op.finish(&Err::<(), _>(&error));
        error
    }

    /// Go back to the start from any step.
    pub fn cancel(&self, session: &mut Session) {
        if session.step() != AuthStep::Login || session.pending().is_some() {
            info!("Login abandoned at the {} step", session.step());
        }
        session.reset();
    }

    /// End the current session, and any login in progress.
    pub fn logout(&self, session: &mut Session) -> Result<()> {
        let op = OperationId::start("logout", session.current().map_or("-", |i| i.email.as_str()));
        let result = match session.current() {
            Some(identity) => self.publish(AuthEvent::LoggedOut {
                identity_id: identity.id,
                at: Utc::now(),
            }),
            None => Ok(()),
        };
        if result.is_ok() {
            session.clear();
        }
        op.finish(&result);
        result
    }

    fn pin_failure(&self, session: &mut Session) -> AuthError {
        let failures = session.record_pin_failure();
        let attempts_remaining = self.max_pin_attempts.saturating_sub(failures);
        if attempts_remaining == 0 {
            warn!("PIN attempts exhausted, returning to login");
            session.reset();
        }
        AuthError::IncorrectPin { attempts_remaining }
    }

    fn publish(&self, event: AuthEvent) -> Result<()> {
        for sink in &self.sinks {
            sink.publish(&event)?;
        }
        Ok(())
    }
}

/// The first step after a password, by priority: hardware key, then
/// biometrics, then PIN.
fn first_factor(identity: &Identity) -> AuthStep {
    if identity.settings.uses_security_key() {
        AuthStep::SecurityKeyAuth
    } else if identity.uses_biometrics() {
        AuthStep::Biometric
    } else {
        AuthStep::Pin
    }
}

fn expect_step(session: &Session, expected: AuthStep) -> Result<()> {
    let actual = session.step();
    if actual == expected {
        Ok(())
    } else {
        Err(AuthError::OutOfSequence { expected, actual })
    }
}

fn pending(session: &Session) -> Result<Identity> {
    session.pending().cloned().ok_or(AuthError::NoPendingLogin)
}
