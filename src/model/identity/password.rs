use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An argon2-encoded password hash. Plaintext passwords are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash a plaintext password with a fresh random salt.
    pub fn new(password: &str) -> Result<Self> {
        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let encoded = argon2::hash_encoded(password.as_bytes(), &salt, &Config::default())?;
        Ok(Self(encoded))
    }

    /// Check whether the given password is correct.
    pub fn verify(&self, password: &str) -> Result<bool> {
        Ok(argon2::verify_encoded(&self.0, password.as_bytes())?)
    }
}
