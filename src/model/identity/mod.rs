use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::store::{Id, StoreCollection};

mod login_history;
mod password;
mod pin;
mod settings;

pub use login_history::{
    BoundedLog, LoginEvent, LoginEventKind, LoginHistory, LOGIN_HISTORY_CAPACITY,
};
pub use password::PasswordHash;
pub use pin::{ParseError as PinParseError, Pin};
pub use settings::{SecurityKey, Settings, Toggle};

/// Emails are case-insensitive and stored trimmed and lower-cased.
pub fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Voter,
    Admin,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Deactivated { at: DateTime<Utc> },
}

/// A registered voter or administrator, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Id,
    pub name: String,
    /// Normalised; also the store key.
    pub email: String,
    pub password_hash: PasswordHash,
    pub pin: Option<Pin>,
    /// Opaque marker set when biometrics were enrolled.
    pub biometric_marker: Option<String>,
    pub role: Role,
    pub settings: Settings,
    pub login_history: LoginHistory,
    pub registered_at: DateTime<Utc>,
    pub status: AccountStatus,
}

impl Identity {
    /// Create a new active voter from a registration request.
    pub fn register(registration: Registration) -> Result<Self> {
        let now = Utc::now();
        let mut login_history = LoginHistory::new();
        login_history.push(LoginEvent::new(LoginEventKind::AccountRegistered, now));
        let biometric_marker = registration
            .use_biometrics
            .then(|| format!("bio_{}", Id::new()));
        Ok(Self {
            id: Id::new(),
            name: registration.name,
            email: normalise_email(&registration.email),
            password_hash: PasswordHash::new(&registration.password)?,
            pin: Some(registration.pin),
            biometric_marker,
            role: Role::Voter,
            settings: Settings {
                biometric_auth_enabled: registration.use_biometrics,
                ..Settings::default()
            },
            login_history,
            registered_at: now,
            status: AccountStatus::Active,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Biometric login applies only when enabled and a marker was enrolled.
    pub fn uses_biometrics(&self) -> bool {
        self.settings.biometric_auth_enabled && self.biometric_marker.is_some()
    }

    /// Record a successful login in the capped history.
    pub fn record_login(&mut self, at: DateTime<Utc>) {
        self.login_history
            .push(LoginEvent::new(LoginEventKind::LoggedIn, at));
    }
}

const IDENTITIES: &str = "user_";
impl StoreCollection for Identity {
    const NAME: &'static str = IDENTITIES;

    fn key(&self) -> String {
        self.email.clone()
    }
}

/// Raw registration details, received from a user. The password is hashed
/// before anything is stored.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub pin: Pin,
    #[serde(default)]
    pub use_biometrics: bool,
}
