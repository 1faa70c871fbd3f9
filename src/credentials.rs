//! The credential store: one record per registered identity, keyed by
//! normalised email.

use chrono::Utc;
use thiserror::Error;

use crate::config::Config;
use crate::error::Error;
use crate::logging::{Level, OperationId, Severity};
use crate::model::{
    identity::{
        normalise_email, AccountStatus, Identity, PasswordHash, Pin, PinParseError, Registration,
        Role, SecurityKey, Toggle,
    },
    session::Session,
    store::{Coll, Id, Store, Txn},
};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("That email address is reserved")]
    EmailReserved,
    #[error("An account with that email address already exists")]
    EmailTaken,
    #[error("Email address must not be empty")]
    EmptyEmail,
    #[error("Name must not be empty")]
    EmptyName,
    #[error("No such account")]
    IdentityNotFound,
    #[error("Incorrect current password")]
    IncorrectPassword,
    #[error("Incorrect current PIN")]
    IncorrectPin,
    #[error("Invalid PIN: {0}")]
    InvalidPin(#[from] PinParseError),
    #[error("No security key with ID {0}")]
    SecurityKeyNotFound(Id),
    #[error("Not logged in")]
    NotAuthenticated,
    #[error(transparent)]
    Storage(#[from] Error),
}

impl Severity for CredentialError {
    fn severity(&self) -> Level {
        match self {
            Self::Storage(_) => Level::Failed,
            _ => Level::Rejected,
        }
    }
}

type Result<T> = std::result::Result<T, CredentialError>;

/// Typed access to identity records.
#[derive(Clone)]
pub struct CredentialStore {
    store: Store,
    identities: Coll<Identity>,
    /// The administrator's email; never available to self-registration.
    reserved_email: String,
}

impl CredentialStore {
    pub fn new(store: &Store, config: &Config) -> Self {
        Self {
            store: store.clone(),
            identities: Coll::from_store(store),
            reserved_email: normalise_email(config.admin_email()),
        }
    }

    /// Seed the configured administrator if they do not exist yet.
    /// Returns whether an account was created.
    pub fn ensure_admin_exists(&self, config: &Config) -> crate::error::Result<bool> {
        let email = normalise_email(config.admin_email());
        if self.identities.find_one(&email)?.is_some() {
            return Ok(false);
        }
        let mut admin = Identity::register(Registration {
            name: config.admin_name().to_string(),
            email,
            password: config.admin_password().to_string(),
            pin: config.admin_pin(),
            use_biometrics: false,
        })?;
        admin.role = Role::Admin;
        // Another caller may have seeded it in between; that is fine too.
        match self.identities.insert_one(&admin) {
            Ok(()) => {
                info!("Seeded administrator account {}", admin.email);
                Ok(true)
            }
            Err(Error::DuplicateKey(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Create a new voter account.
    pub fn register(&self, registration: Registration) -> Result<Identity> {
        let op = OperationId::start("register", normalise_email(&registration.email));
        let result = self.register_inner(registration);
        op.finish(&result);
        result
    }

    fn register_inner(&self, registration: Registration) -> Result<Identity> {
        let email = normalise_email(&registration.email);
        if email.is_empty() {
            return Err(CredentialError::EmptyEmail);
        }
        if registration.name.trim().is_empty() {
            return Err(CredentialError::EmptyName);
        }
        if email == self.reserved_email {
            return Err(CredentialError::EmailReserved);
        }
        let identity = Identity::register(registration)?;
        match self.identities.insert_one(&identity) {
            Ok(()) => Ok(identity),
            Err(Error::DuplicateKey(_)) => Err(CredentialError::EmailTaken),
            Err(err) => Err(err.into()),
        }
    }

    pub fn find_by_email(&self, email: &str) -> crate::error::Result<Option<Identity>> {
        self.identities.find_one(&normalise_email(email))
    }

    pub fn find_by_id(&self, id: Id) -> crate::error::Result<Option<Identity>> {
        Ok(self.identities.find(|identity| identity.id == id)?.pop())
    }

    /// Every identity, oldest registration first.
    pub fn list(&self) -> crate::error::Result<Vec<Identity>> {
        let mut identities = self.identities.find(|_| true)?;
        identities.sort_by_key(|identity| identity.registered_at);
        Ok(identities)
    }

    pub fn update_profile(&self, session: &mut Session, name: &str) -> Result<Identity> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(CredentialError::EmptyName);
        }
        self.modify_current(session, "update_profile", |identity| {
            identity.name = name;
            Ok(())
        })
    }

    /// Move the current identity to a new email, which is also its store key.
    pub fn change_email(&self, session: &mut Session, new_email: &str) -> Result<Identity> {
        let op = OperationId::start("change_email", normalise_email(new_email));
        let result = self.change_email_inner(session, new_email);
        op.finish(&result);
        result
    }

    fn change_email_inner(&self, session: &mut Session, new_email: &str) -> Result<Identity> {
        let (id, old_email) = current_account(session)?;
        let new_email = normalise_email(new_email);
        if new_email.is_empty() {
            return Err(CredentialError::EmptyEmail);
        }
        if new_email == old_email {
            return self.reload(session);
        }
        if new_email == self.reserved_email {
            return Err(CredentialError::EmailReserved);
        }
        let updated = self.store.transaction(|txn| -> Result<Identity> {
            let mut identity = stored_current(txn, id, &old_email)?;
            if txn.find_one::<Identity>(&new_email)?.is_some() {
                return Err(CredentialError::EmailTaken);
            }
            txn.delete_one::<Identity>(&old_email);
            identity.email = new_email.clone();
            txn.insert_one(&identity)?;
            Ok(identity)
        })?;
        session.refresh(updated.clone());
        Ok(updated)
    }

    pub fn change_password(
        &self,
        session: &mut Session,
        current: &str,
        new: &str,
    ) -> Result<Identity> {
        let new_hash = PasswordHash::new(new)?;
        self.modify_current(session, "change_password", |identity| {
            if !identity.password_hash.verify(current)? {
                return Err(CredentialError::IncorrectPassword);
            }
            identity.password_hash = new_hash;
            Ok(())
        })
    }

    /// Change the PIN. `current` must match, or be empty if no PIN is set yet.
    pub fn change_pin(&self, session: &mut Session, current: &str, new: &str) -> Result<Identity> {
        self.modify_current(session, "change_pin", |identity| {
            let matches = match identity.pin {
                Some(pin) => pin.to_string() == current,
                None => current.is_empty(),
            };
            if !matches {
                return Err(CredentialError::IncorrectPin);
            }
            identity.pin = Some(new.parse::<Pin>()?);
            Ok(())
        })
    }

    pub fn update_setting(
        &self,
        session: &mut Session,
        toggle: Toggle,
        value: bool,
    ) -> Result<Identity> {
        self.modify_current(session, "update_setting", |identity| {
            identity.settings.set(toggle, value);
            Ok(())
        })
    }

    /// Record a new hardware-key handle for the current identity.
    pub fn register_security_key(&self, session: &mut Session, name: &str) -> Result<SecurityKey> {
        let key = SecurityKey::new(name.trim().to_string());
        let added = key.clone();
        self.modify_current(session, "register_security_key", move |identity| {
            identity.settings.security_keys.push(added);
            Ok(())
        })?;
        Ok(key)
    }

    pub fn revoke_security_key(&self, session: &mut Session, key_id: Id) -> Result<Identity> {
        self.modify_current(session, "revoke_security_key", |identity| {
            let keys = &mut identity.settings.security_keys;
            let before = keys.len();
            keys.retain(|key| key.id != key_id);
            if keys.len() == before {
                return Err(CredentialError::SecurityKeyNotFound(key_id));
            }
            Ok(())
        })
    }

    /// Close the current account. Records are never deleted; the account is
    /// marked deactivated and the session is signed out.
    pub fn deactivate(&self, session: &mut Session) -> Result<Identity> {
        let identity = self.modify_current(session, "deactivate", |identity| {
            identity.status = AccountStatus::Deactivated { at: Utc::now() };
            Ok(())
        })?;
        session.clear();
        Ok(identity)
    }

    /// Re-read the current identity from the store.
    pub fn reload(&self, session: &mut Session) -> Result<Identity> {
        let (id, email) = current_account(session)?;
        let identity = self
            .store
            .transaction(|txn| stored_current(txn, id, &email))?;
        session.refresh(identity.clone());
        Ok(identity)
    }

    /// Read-modify-write the current identity in one transaction, then refresh
    /// the session's copy.
    fn modify_current<F>(&self, session: &mut Session, name: &str, f: F) -> Result<Identity>
    where
        F: FnOnce(&mut Identity) -> Result<()>,
    {
        let op = OperationId::start(name, session.current().map_or("-", |i| i.email.as_str()));
        let result = current_account(session).and_then(|(id, email)| {
            self.store.transaction(|txn| -> Result<Identity> {
                let mut identity = stored_current(txn, id, &email)?;
                f(&mut identity)?;
                txn.replace_one(&identity)?;
                Ok(identity)
            })
        });
        op.finish(&result);
        let identity = result?;
        session.refresh(identity.clone());
        Ok(identity)
    }
}

fn current_account(session: &Session) -> Result<(Id, String)> {
    session
        .current()
        .map(|identity| (identity.id, identity.email.clone()))
        .ok_or(CredentialError::NotAuthenticated)
}

/// The stored record behind a session. A session whose account has since
/// been deactivated no longer counts as logged in.
fn stored_current(txn: &Txn<'_>, id: Id, email: &str) -> Result<Identity> {
    let identity = txn
        .find_one::<Identity>(email)?
        .filter(|identity| identity.id == id)
        .ok_or(CredentialError::IdentityNotFound)?;
    if !identity.is_active() {
        return Err(CredentialError::NotAuthenticated);
    }
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::identity::LoginEventKind;

    fn logged_in(credentials: &CredentialStore, registration: Registration) -> Session {
        let identity = credentials.register(registration).unwrap();
        let mut session = Session::new();
        session.begin(identity, crate::model::session::AuthStep::Pin);
        session.establish();
        session
    }

    fn setup() -> (Store, CredentialStore) {
        let store = Store::in_memory();
        let credentials = CredentialStore::new(&store, &Config::example());
        (store, credentials)
    }

    #[test]
    fn register_rejects_taken_and_reserved_emails() {
        let (_, credentials) = setup();
        credentials.register(Registration::example()).unwrap();

        let mut again = Registration::example();
        again.email = " ADA@example.com".into();
        assert!(matches!(
            credentials.register(again),
            Err(CredentialError::EmailTaken)
        ));

        let mut admin = Registration::example();
        admin.email = Config::example().admin_email().to_uppercase();
        assert!(matches!(
            credentials.register(admin),
            Err(CredentialError::EmailReserved)
        ));
    }

    #[test]
    fn admin_seed_is_idempotent() {
        let (_, credentials) = setup();
        let config = Config::example();
        assert!(credentials.ensure_admin_exists(&config).unwrap());
        assert!(!credentials.ensure_admin_exists(&config).unwrap());
        let admin = credentials
            .find_by_email(config.admin_email())
            .unwrap()
            .unwrap();
        assert!(admin.is_admin());
        assert_eq!(admin.pin, Some(config.admin_pin()));
        assert_eq!(
            admin.login_history.latest().map(|e| e.event),
            Some(LoginEventKind::AccountRegistered)
        );
    }

    #[test]
    fn change_email_moves_the_record() {
        let (_, credentials) = setup();
        let mut session = logged_in(&credentials, Registration::example());
        let id = session.current().unwrap().id;
        credentials.register(Registration::example2()).unwrap();

        assert!(matches!(
            credentials.change_email(&mut session, "brian@example.com"),
            Err(CredentialError::EmailTaken)
        ));

        let moved = credentials
            .change_email(&mut session, "Ada.Lovelace@Example.com")
            .unwrap();
        assert_eq!(moved.email, "ada.lovelace@example.com");
        assert_eq!(session.current().unwrap().email, moved.email);
        assert!(credentials
            .find_by_email("ada@example.com")
            .unwrap()
            .is_none());
        assert_eq!(credentials.find_by_id(id).unwrap().unwrap().email, moved.email);
    }

    #[test]
    fn change_password_checks_current() {
        let (_, credentials) = setup();
        let mut session = logged_in(&credentials, Registration::example());
        assert!(matches!(
            credentials.change_password(&mut session, "wrong", "new-password"),
            Err(CredentialError::IncorrectPassword)
        ));
        credentials
            .change_password(&mut session, "ada-password", "new-password")
            .unwrap();
        let stored = credentials.find_by_email("ada@example.com").unwrap().unwrap();
        assert!(stored.password_hash.verify("new-password").unwrap());
    }

    #[test]
    fn change_pin_rules() {
        let (_, credentials) = setup();
        let mut session = logged_in(&credentials, Registration::example());
        assert!(matches!(
            credentials.change_pin(&mut session, "", "1111"),
            Err(CredentialError::IncorrectPin)
        ));
        assert!(matches!(
            credentials.change_pin(&mut session, "1234", "12a4"),
            Err(CredentialError::InvalidPin(PinParseError::InvalidChar('a')))
        ));
        let updated = credentials.change_pin(&mut session, "1234", "9876").unwrap();
        assert_eq!(updated.pin.map(|p| p.to_string()).as_deref(), Some("9876"));
    }

    #[test]
    fn empty_current_pin_accepted_when_none_set() {
        let (store, credentials) = setup();
        let mut session = logged_in(&credentials, Registration::example());
        store
            .transaction(|txn| {
                let mut identity: Identity = txn.find_one("ada@example.com")?.unwrap();
                identity.pin = None;
                txn.replace_one(&identity)
            })
            .unwrap();
        credentials.change_pin(&mut session, "", "4321").unwrap();
    }

    #[test]
    fn security_keys_register_and_revoke() {
        let (_, credentials) = setup();
        let mut session = logged_in(&credentials, Registration::example());
        let key = credentials
            .register_security_key(&mut session, "YubiKey")
            .unwrap();
        credentials
            .update_setting(&mut session, Toggle::SecurityKey, true)
            .unwrap();
        assert!(session.current().unwrap().settings.uses_security_key());

        credentials.revoke_security_key(&mut session, key.id).unwrap();
        assert!(matches!(
            credentials.revoke_security_key(&mut session, key.id),
            Err(CredentialError::SecurityKeyNotFound(id)) if id == key.id
        ));
        assert!(!session.current().unwrap().settings.uses_security_key());
    }

    #[test]
    fn deactivate_signs_out_and_keeps_record() {
        let (_, credentials) = setup();
        let mut session = logged_in(&credentials, Registration::example());
        credentials.deactivate(&mut session).unwrap();
        assert!(!session.is_authenticated());
        let stored = credentials.find_by_email("ada@example.com").unwrap().unwrap();
        assert!(!stored.is_active());
        assert!(matches!(
            credentials.update_profile(&mut session, "Ghost"),
            Err(CredentialError::NotAuthenticated)
        ));
    }

    #[test]
    fn blank_names_and_emails_are_rejected() {
        let (_, credentials) = setup();
        let mut blank_email = Registration::example();
        blank_email.email = "   ".into();
        assert!(matches!(
            credentials.register(blank_email),
            Err(CredentialError::EmptyEmail)
        ));
        let mut blank_name = Registration::example();
        blank_name.name = " \t".into();
        assert!(matches!(
            credentials.register(blank_name),
            Err(CredentialError::EmptyName)
        ));
        assert!(credentials.list().unwrap().is_empty());

        let mut session = logged_in(&credentials, Registration::example());
        assert!(matches!(
            credentials.update_profile(&mut session, "  "),
            Err(CredentialError::EmptyName)
        ));
        assert!(matches!(
            credentials.change_email(&mut session, ""),
            Err(CredentialError::EmptyEmail)
        ));
        assert_eq!(credentials.reload(&mut session).unwrap().name, "Ada Voter");
    }

    #[test]
    fn closed_account_cannot_be_edited_from_another_session() {
        let (_, credentials) = setup();
        let mut stale = logged_in(&credentials, Registration::example());
        let mut closer = stale.clone();
        credentials.deactivate(&mut closer).unwrap();

        assert!(stale.current().unwrap().is_active());
        assert!(matches!(
            credentials.update_setting(&mut stale, Toggle::BiometricAuth, true),
            Err(CredentialError::NotAuthenticated)
        ));
        assert!(matches!(
            credentials.change_email(&mut stale, "ada.new@example.com"),
            Err(CredentialError::NotAuthenticated)
        ));
        assert!(matches!(
            credentials.reload(&mut stale),
            Err(CredentialError::NotAuthenticated)
        ));
        let stored = credentials.find_by_email("ada@example.com").unwrap().unwrap();
        assert!(!stored.settings.biometric_auth_enabled);
    }
}
