use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    identity::Identity,
    store::{Id, Store},
};

/// Something the auth sequencer wants the outside world to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The password matched. Emitted before the remaining factors are checked.
    PrimaryLoginSucceeded {
        identity_id: Id,
        email: String,
        at: DateTime<Utc>,
    },
    /// Every factor passed and the session now belongs to this identity.
    SessionEstablished { identity_id: Id, at: DateTime<Utc> },
    LoggedOut { identity_id: Id, at: DateTime<Utc> },
}

/// A consumer of [`AuthEvent`]s.
///
/// Events are published before the session moves on, so an error here leaves
/// the session exactly as it was. Sinks run in the order they were added and
/// the first error stops the rest; whatever earlier sinks did stays done.
/// Register sinks that persist state, like [`LoginHistoryRecorder`], last.
pub trait AuthEventSink: Send + Sync {
    fn publish(&self, event: &AuthEvent) -> Result<()>;
}

/// Appends "Logged In" to an identity's capped login history whenever its
/// password is accepted.
#[derive(Clone)]
pub struct LoginHistoryRecorder {
    store: Store,
}

impl LoginHistoryRecorder {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
        }
    }
}

impl AuthEventSink for LoginHistoryRecorder {
    fn publish(&self, event: &AuthEvent) -> Result<()> {
        if let AuthEvent::PrimaryLoginSucceeded { email, at, .. } = event {
            self.store.transaction(|txn| {
                let mut identity: Identity = txn
                    .find_one(email)?
                    .ok_or_else(|| Error::NotFound(format!("identity {email}")))?;
                identity.record_login(*at);
                txn.replace_one(&identity)
            })?;
            debug!("Recorded login for {email}");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Keeps every event it sees, for assertions.
    #[derive(Clone, Default)]
    pub struct EventLog(Arc<Mutex<Vec<AuthEvent>>>);

    impl EventLog {
        pub fn events(&self) -> Vec<AuthEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AuthEventSink for EventLog {
        fn publish(&self, event: &AuthEvent) -> Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Refuses every event.
    pub struct FailingSink;

    impl AuthEventSink for FailingSink {
        fn publish(&self, _event: &AuthEvent) -> Result<()> {
            Err(Error::NotFound("event consumer".into()))
        }
    }
}
