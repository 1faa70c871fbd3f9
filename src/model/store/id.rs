use std::fmt::{Display, Formatter};
use std::str::FromStr;

use data_encoding::HEXLOWER;
use rand::Rng;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const LENGTH: usize = 12;

/// A random 12-byte identifier, rendered as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id([u8; LENGTH]);

impl Id {
    /// Generate a fresh random ID.
    pub fn new() -> Self {
        let mut bytes = [0_u8; LENGTH];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; LENGTH] {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&HEXLOWER.encode(&self.0))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid ID {0:?}: expected {len} hex characters", len = LENGTH * 2)]
pub struct ParseIdError(String);

impl FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER
            .decode(s.to_ascii_lowercase().as_bytes())
            .map_err(|_| ParseIdError(s.to_string()))?;
        let bytes: [u8; LENGTH] = bytes
            .try_into()
            .map_err(|_| ParseIdError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(D::Error::custom)
    }
}
