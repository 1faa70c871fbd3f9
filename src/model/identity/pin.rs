use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LENGTH: usize = 4;

/// A numeric login PIN.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pin {
    digits: [u8; LENGTH],
}

// Keep PINs out of logs.
impl std::fmt::Debug for Pin {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("Pin(****)")
    }
}

impl Display for Pin {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for digit in self.digits {
            write!(formatter, "{digit}")?;
        }
        Ok(())
    }
}

impl FromStr for Pin {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let len = string.chars().count();
        if len != LENGTH {
            return Err(Self::Err::InvalidLength(len));
        }
        let mut digits = [0; LENGTH];
        for (slot, c) in digits.iter_mut().zip(string.chars()) {
            *slot = match c.to_digit(10) {
                Some(digit) => digit as u8,
                None => return Err(Self::Err::InvalidChar(c)),
            };
        }
        Ok(Self { digits })
    }
}

impl TryFrom<String> for Pin {
    type Error = ParseError;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        string.parse()
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> Self {
        pin.to_string()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("PIN must contain exactly 4 digits, found {0} characters")]
    InvalidLength(usize),
    #[error("PIN must contain only digits, found {0:?}")]
    InvalidChar(char),
}
