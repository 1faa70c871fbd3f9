use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::store::Id;

use super::{Candidate, CandidateId};

/// An election specification, as submitted by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub candidates: Vec<CandidateSpec>,
}

/// A candidate specification. Supplying an `id` keeps an existing candidate
/// when editing; otherwise a fresh one is minted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CandidateId>,
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifesto: Option<String>,
}

impl CandidateSpec {
    pub fn new(name: impl Into<String>, position: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            position: position.into(),
            manifesto: None,
        }
    }
}

impl From<Candidate> for CandidateSpec {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: Some(candidate.id),
            name: candidate.name,
            position: candidate.position,
            manifesto: candidate.manifesto,
        }
    }
}

/// A partial edit; absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub candidates: Option<Vec<CandidateSpec>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidElection {
    #[error("election title must not be empty")]
    EmptyTitle,
    #[error("election must end strictly after it starts")]
    EndNotAfterStart,
    #[error("election must have at least one candidate")]
    NoCandidates,
    #[error("candidate names must not be empty")]
    EmptyCandidateName,
    #[error("candidate {0} appears more than once")]
    DuplicateCandidate(Id),
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl ElectionSpec {
        pub fn current_example() -> Self {
            Self {
                title: "Student Council 2026".to_string(),
                description: "Annual council elections".to_string(),
                start_time: Utc::now() - Duration::hours(1),
                end_time: Utc::now() + Duration::days(1),
                candidates: vec![
                    CandidateSpec::new("Chris Riches", "President"),
                    CandidateSpec::new("Parry Hotter", "President"),
                    CandidateSpec::new("Hermione Danger", "President"),
                ],
            }
        }
    }
}
