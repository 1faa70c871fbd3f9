use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How many login events an identity keeps.
pub const LOGIN_HISTORY_CAPACITY: usize = 10;

/// A fixed-capacity log that drops its oldest entry when full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedLog<T, const N: usize> {
    entries: VecDeque<T>,
}

impl<T, const N: usize> BoundedLog<T, N> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(N),
        }
    }

    /// Append an entry, evicting the oldest if the log is full.
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == N {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T, const N: usize> Default for BoundedLog<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize, const N: usize> Serialize for BoundedLog<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.entries)
    }
}

/// Deserialising an over-long list keeps only the newest `N` entries.
impl<'de, T: Deserialize<'de>, const N: usize> Deserialize<'de> for BoundedLog<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut log = Self::new();
        for entry in Vec::<T>::deserialize(deserializer)? {
            log.push(entry);
        }
        Ok(log)
    }
}

/// Something that happened to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginEventKind {
    #[serde(rename = "Account Registered")]
    AccountRegistered,
    #[serde(rename = "Logged In")]
    LoggedIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub timestamp: DateTime<Utc>,
    pub event: LoginEventKind,
}

impl LoginEvent {
    pub fn new(event: LoginEventKind, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, event }
    }
}

pub type LoginHistory = BoundedLog<LoginEvent, LOGIN_HISTORY_CAPACITY>;
