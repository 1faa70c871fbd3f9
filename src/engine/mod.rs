//! Elections, votes and results.
//!
//! The engine is the only thing that writes elections or votes. Every check
//! that guards a write runs inside the same store transaction as the write.

use thiserror::Error;

use crate::config::Config;
use crate::error::Error;
use crate::logging::{Level, OperationId, Severity};
use crate::model::{
    election::{CandidateId, Election, ElectionId, InvalidElection},
    identity::Identity,
    session::Session,
    store::{Coll, Id, Store},
    vote::Vote,
};

pub use tally::{tally, ElectionResults, Standing};

mod casting;
mod lifecycle;
mod tally;

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("Not logged in")]
    NotAuthenticated,
    #[error("Only administrators can do that")]
    Forbidden,
    #[error("Election {0} not found")]
    ElectionNotFound(ElectionId),
    #[error("This election has not started yet")]
    ElectionNotStarted,
    #[error("This election has ended")]
    ElectionEnded,
    #[error("You have already voted in this election")]
    DuplicateVote,
    #[error("Candidate {0} is not standing in this election")]
    CandidateNotFound(CandidateId),
    #[error("A registered security key is required to vote")]
    SecurityKeyRequired,
    #[error(transparent)]
    InvalidElection(#[from] InvalidElection),
    #[error(transparent)]
    Storage(#[from] Error),
}

impl Severity for ElectionError {
    fn severity(&self) -> Level {
        match self {
            Self::Storage(_) => Level::Failed,
            _ => Level::Rejected,
        }
    }
}

type Result<T> = std::result::Result<T, ElectionError>;

/// Owns elections and votes.
#[derive(Clone)]
pub struct ElectionEngine {
    store: Store,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    signing_secret: Vec<u8>,
}

impl ElectionEngine {
    pub fn new(store: &Store, config: &Config) -> Self {
        Self {
            store: store.clone(),
            elections: Coll::from_store(store),
            votes: Coll::from_store(store),
            signing_secret: config.signing_secret().to_vec(),
        }
    }

    /// Every election, oldest first.
    pub fn list_elections(&self) -> Result<Vec<Election>> {
        let mut elections = self.elections.find(|_| true)?;
        elections.sort_by_key(|election| election.created_at);
        Ok(elections)
    }

    pub fn get_election(&self, election_id: ElectionId) -> Result<Election> {
        self.elections
            .find_one(&election_id.to_string())?
            .ok_or(ElectionError::ElectionNotFound(election_id))
    }

    /// Every vote cast in an election, for the audit view. Admin only.
    pub fn votes_for_election(
        &self,
        session: &Session,
        election_id: ElectionId,
    ) -> Result<Vec<Vote>> {
        require_admin(session)?;
        self.get_election(election_id)?;
        let mut votes = self.votes.find(|vote| vote.election_id == election_id)?;
        votes.sort_by_key(|vote| vote.cast_at);
        Ok(votes)
    }

    /// The current user's own votes, oldest first.
    pub fn my_votes(&self, session: &Session) -> Result<Vec<Vote>> {
        let voter = require_voter(session)?;
        self.votes_by_voter(voter.id)
    }

    pub fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>> {
        let mut votes = self.votes.find(|vote| vote.voter_id == voter_id)?;
        votes.sort_by_key(|vote| vote.cast_at);
        Ok(votes)
    }

    pub fn has_voted(&self, election_id: ElectionId, voter_id: Id) -> Result<bool> {
        Ok(!self
            .votes
            .find(|vote| vote.election_id == election_id && vote.voter_id == voter_id)?
            .is_empty())
    }

    /// Whether a stored vote still carries a valid signature.
    pub fn verify_vote(&self, vote_id: Id) -> Result<bool> {
        let op = OperationId::start("verify_vote", vote_id);
        let result = self
            .votes
            .find_one(&vote_id.to_string())
            .map_err(ElectionError::from)
            .map(|vote| {
                vote.map_or(false, |vote| vote.verify_signature(&self.signing_secret))
            });
        op.finish(&result);
        result
    }
}

fn require_voter(session: &Session) -> Result<&Identity> {
    session.current().ok_or(ElectionError::NotAuthenticated)
}

fn require_admin(session: &Session) -> Result<&Identity> {
    let identity = require_voter(session)?;
    if identity.is_admin() {
        Ok(identity)
    } else {
        Err(ElectionError::Forbidden)
    }
}
