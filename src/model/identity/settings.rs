use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::store::Id;

/// Per-identity feature toggles and registered hardware keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub biometric_auth_enabled: bool,
    pub security_key_enabled: bool,
    #[serde(default)]
    pub security_keys: Vec<SecurityKey>,
    pub require_security_key_for_voting: bool,
}

impl Settings {
    /// Hardware-key login applies only when enabled and at least one key exists.
    pub fn uses_security_key(&self) -> bool {
        self.security_key_enabled && !self.security_keys.is_empty()
    }

    pub fn has_security_key(&self, key_id: Id) -> bool {
        self.security_keys.iter().any(|key| key.id == key_id)
    }

    pub fn get(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::BiometricAuth => self.biometric_auth_enabled,
            Toggle::SecurityKey => self.security_key_enabled,
            Toggle::RequireSecurityKeyForVoting => self.require_security_key_for_voting,
        }
    }

    pub fn set(&mut self, toggle: Toggle, value: bool) {
        let slot = match toggle {
            Toggle::BiometricAuth => &mut self.biometric_auth_enabled,
            Toggle::SecurityKey => &mut self.security_key_enabled,
            Toggle::RequireSecurityKeyForVoting => &mut self.require_security_key_for_voting,
        };
        *slot = value;
    }
}

/// The boolean settings a user may flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Toggle {
    #[serde(rename = "biometricAuthEnabled")]
    BiometricAuth,
    #[serde(rename = "securityKeyEnabled")]
    SecurityKey,
    #[serde(rename = "requireSecurityKeyForVoting")]
    RequireSecurityKeyForVoting,
}

/// A registered hardware-key handle. The key material itself never reaches
/// this crate; only the handle the platform gave us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityKey {
    pub id: Id,
    pub name: String,
    pub registered_at: DateTime<Utc>,
}

impl SecurityKey {
    pub fn new(name: String) -> Self {
        Self {
            id: Id::new(),
            name,
            registered_at: Utc::now(),
        }
    }
}
