use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::store::{Id, StoreCollection};

pub use spec::{CandidateSpec, ElectionSpec, ElectionUpdate, InvalidElection};

mod spec;

/// Candidate IDs are store [`Id`]s, unique within their election.
pub type CandidateId = Id;

/// Election IDs are store [`Id`]s.
pub type ElectionId = Id;

/// An election, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// In ballot order; the tally breaks ties by this order.
    pub candidates: Vec<Candidate>,
    pub created_at: DateTime<Utc>,
}

impl Election {
    /// Create a new election from a validated specification.
    pub fn new(spec: ElectionSpec) -> Result<Self, InvalidElection> {
        let election = Self {
            id: Id::new(),
            title: spec.title,
            description: spec.description,
            start_time: spec.start_time,
            end_time: spec.end_time,
            candidates: spec.candidates.into_iter().map(Candidate::from).collect(),
            created_at: Utc::now(),
        };
        election.validate()?;
        Ok(election)
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<(), InvalidElection> {
        if self.title.trim().is_empty() {
            return Err(InvalidElection::EmptyTitle);
        }
        if self.end_time <= self.start_time {
            return Err(InvalidElection::EndNotAfterStart);
        }
        if self.candidates.is_empty() {
            return Err(InvalidElection::NoCandidates);
        }
        for (i, candidate) in self.candidates.iter().enumerate() {
            if candidate.name.trim().is_empty() {
                return Err(InvalidElection::EmptyCandidateName);
            }
            if self.candidates[..i].iter().any(|c| c.id == candidate.id) {
                return Err(InvalidElection::DuplicateCandidate(candidate.id));
            }
        }
        Ok(())
    }

    /// Merge an update into this election. On error, `self` is untouched.
    pub fn apply(&mut self, update: ElectionUpdate) -> Result<(), InvalidElection> {
        let mut updated = self.clone();
        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(description) = update.description {
            updated.description = description;
        }
        if let Some(start_time) = update.start_time {
            updated.start_time = start_time;
        }
        if let Some(end_time) = update.end_time {
            updated.end_time = end_time;
        }
        if let Some(candidates) = update.candidates {
            updated.candidates = candidates.into_iter().map(Candidate::from).collect();
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// Where the election stands at `now`. Both ends of the window are open for voting.
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if now < self.start_time {
            ElectionStatus::Upcoming
        } else if now > self.end_time {
            ElectionStatus::Ended
        } else {
            ElectionStatus::Active
        }
    }
}

const ELECTIONS: &str = "election_";
impl StoreCollection for Election {
    const NAME: &'static str = ELECTIONS;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// A single candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifesto: Option<String>,
}

impl From<CandidateSpec> for Candidate {
    fn from(spec: CandidateSpec) -> Self {
        Self {
            id: spec.id.unwrap_or_else(Id::new),
            name: spec.name,
            position: spec.position,
            manifesto: spec.manifesto,
        }
    }
}

/// States in the Election lifecycle, derived from the clock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionStatus {
    /// Not open for voting yet.
    Upcoming,
    /// Accepting votes.
    Active,
    /// Closed.
    Ended,
}

#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl Election {
        /// Open from an hour ago until tomorrow.
        pub fn current_example() -> Self {
            Self::new(ElectionSpec::current_example()).unwrap()
        }

        /// Opens tomorrow.
        pub fn future_example() -> Self {
            let mut spec = ElectionSpec::current_example();
            spec.start_time = Utc::now() + Duration::days(1);
            spec.end_time = Utc::now() + Duration::days(2);
            Self::new(spec).unwrap()
        }

        /// Closed yesterday.
        pub fn past_example() -> Self {
            let mut spec = ElectionSpec::current_example();
            spec.start_time = Utc::now() - Duration::days(2);
            spec.end_time = Utc::now() - Duration::days(1);
            Self::new(spec).unwrap()
        }
    }
}
