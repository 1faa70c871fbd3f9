use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    identity::{Identity, Role},
    store::Store,
};

const AUTH_STEP_KEY: &str = "votesmart_auth_step";
const CURRENT_USER_KEY: &str = "votesmart_current_user";
const DARK_MODE_KEY: &str = "votesmart_dark_mode";
const FONT_STYLE_KEY: &str = "votesmart_font_style";
const FONT_SIZE_KEY: &str = "votesmart_font_size";

/// Steps of the login sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStep {
    Login,
    SecurityKeyAuth,
    Biometric,
    Pin,
}

impl Display for AuthStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AuthStep::Login => "login",
            AuthStep::SecurityKeyAuth => "security_key_auth",
            AuthStep::Biometric => "biometric",
            AuthStep::Pin => "pin",
        })
    }
}

/// One user's session: who is logged in, and how far a login in progress has got.
///
/// Only the auth sequencer moves a session between steps; everything else
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    current: Option<Identity>,
    step: AuthStep,
    /// Password accepted, remaining factors outstanding. Never persisted.
    pending: Option<Identity>,
    pin_failures: u8,
}

impl Session {
    pub fn new() -> Self {
        Self {
            current: None,
            step: AuthStep::Login,
            pending: None,
            pin_failures: 0,
        }
    }

    /// The fully authenticated identity, if any.
    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> Option<&Identity> {
        self.pending.as_ref()
    }

    pub fn step(&self) -> AuthStep {
        self.step
    }

    pub fn role(&self) -> Option<Role> {
        self.current.as_ref().map(|identity| identity.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    pub fn pin_failures(&self) -> u8 {
        self.pin_failures
    }

    pub(crate) fn begin(&mut self, pending: Identity, next: AuthStep) {
        self.pending = Some(pending);
        self.step = next;
        self.pin_failures = 0;
    }

    pub(crate) fn advance(&mut self, next: AuthStep) {
        self.step = next;
    }

    /// Count a failed PIN entry and return the running total.
    pub(crate) fn record_pin_failure(&mut self) -> u8 {
        self.pin_failures = self.pin_failures.saturating_add(1);
        self.pin_failures
    }

    /// Promote the pending identity to the current one.
    pub(crate) fn establish(&mut self) -> Option<&Identity> {
        let identity = self.pending.take()?;
        self.current = Some(identity);
        self.step = AuthStep::Login;
        self.pin_failures = 0;
        self.current.as_ref()
    }

    /// Abandon any login in progress. The current identity is kept.
    pub(crate) fn reset(&mut self) {
        self.pending = None;
        self.step = AuthStep::Login;
        self.pin_failures = 0;
    }

    /// Forget everything.
    pub(crate) fn clear(&mut self) {
        self.reset();
        self.current = None;
    }

    /// Replace the current identity with a fresher copy of the same account.
    pub(crate) fn refresh(&mut self, identity: Identity) {
        if self.current.as_ref().map(|c| c.id) == Some(identity.id) {
            self.current = Some(identity);
        }
    }

    /// Persist the step and who is logged in.
    pub fn save(&self, store: &Store) -> Result<()> {
        store.transaction(|txn| {
            txn.set_value(AUTH_STEP_KEY, &self.step)?;
            match &self.current {
                Some(identity) => txn.set_value(CURRENT_USER_KEY, &identity.email)?,
                None => {
                    txn.remove(CURRENT_USER_KEY);
                }
            }
            Ok(())
        })
    }

    /// Rebuild a session from persisted values.
    ///
    /// A half-finished login cannot be resumed because the pending identity
    /// is never persisted, so the step always comes back as `Login`. A saved
    /// user whose account has gone or been deactivated is dropped.
    pub fn restore(store: &Store) -> Result<Self> {
        let current = store.transaction(|txn| -> Result<Option<Identity>> {
            let saved_step: Option<AuthStep> = txn.get_value(AUTH_STEP_KEY)?;
            if let Some(step) = saved_step.filter(|step| *step != AuthStep::Login) {
                debug!("Discarding saved auth step {step}: no pending identity survives a restart");
            }
            match txn.get_value::<String>(CURRENT_USER_KEY)? {
                Some(email) => Ok(txn.find_one::<Identity>(&email)?.filter(Identity::is_active)),
                None => Ok(None),
            }
        })?;
        Ok(Self {
            current,
            ..Self::new()
        })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Display preferences that survive restarts. Not security-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiPreferences {
    pub dark_mode: bool,
    pub font_style: String,
    pub font_size: String,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            dark_mode: false,
            font_style: "var(--font-family-sans)".to_string(),
            font_size: "16px".to_string(),
        }
    }
}

impl UiPreferences {
    pub fn load(store: &Store) -> Result<Self> {
        let defaults = Self::default();
        store.transaction(|txn| {
            Ok(Self {
                dark_mode: txn.get_value(DARK_MODE_KEY)?.unwrap_or(defaults.dark_mode),
                font_style: txn.get_value(FONT_STYLE_KEY)?.unwrap_or(defaults.font_style),
                font_size: txn.get_value(FONT_SIZE_KEY)?.unwrap_or(defaults.font_size),
            })
        })
    }

    pub fn save(&self, store: &Store) -> Result<()> {
        store.transaction(|txn| {
            txn.set_value(DARK_MODE_KEY, &self.dark_mode)?;
            txn.set_value(FONT_STYLE_KEY, &self.font_style)?;
            txn.set_value(FONT_SIZE_KEY, &self.font_size)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::identity::Registration;
    use crate::model::store::Coll;

    fn stored_voter(store: &Store) -> Identity {
        let identity = Identity::register(Registration::example()).unwrap();
        Coll::<Identity>::from_store(store)
            .insert_one(&identity)
            .unwrap();
        identity
    }

    #[test]
    fn step_names_match_stored_form() {
        assert_eq!(
            serde_json::to_string(&AuthStep::SecurityKeyAuth).unwrap(),
            "\"security_key_auth\""
        );
        assert_eq!(AuthStep::Pin.to_string(), "pin");
    }

    #[test]
    fn establish_promotes_pending() {
        let store = Store::in_memory();
        let voter = stored_voter(&store);
        let mut session = Session::new();
        session.begin(voter.clone(), AuthStep::Pin);
        assert_eq!(session.record_pin_failure(), 1);
        assert_eq!(session.establish().map(|i| i.id), Some(voter.id));
        assert_eq!(session.step(), AuthStep::Login);
        assert!(session.pending().is_none());
        assert_eq!(session.pin_failures(), 0);
        assert_eq!(session.role(), Some(Role::Voter));
    }

    #[test]
    fn restore_brings_back_current_user_only() {
        let store = Store::in_memory();
        let voter = stored_voter(&store);
        let mut session = Session::new();
        session.begin(voter, AuthStep::Pin);
        session.establish();
        session.advance(AuthStep::Biometric);
        session.save(&store).unwrap();

        let restored = Session::restore(&store).unwrap();
        assert_eq!(restored.current(), session.current());
        assert_eq!(restored.step(), AuthStep::Login);

        session.clear();
        session.save(&store).unwrap();
        assert!(!Session::restore(&store).unwrap().is_authenticated());
    }

    #[test]
    fn ui_preferences_default_then_persist() {
        let store = Store::in_memory();
        assert_eq!(UiPreferences::load(&store).unwrap(), UiPreferences::default());
        let prefs = UiPreferences {
            dark_mode: true,
            font_size: "18px".into(),
            ..UiPreferences::default()
        };
        prefs.save(&store).unwrap();
        assert_eq!(UiPreferences::load(&store).unwrap(), prefs);
    }
}
