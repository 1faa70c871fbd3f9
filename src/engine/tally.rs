use std::collections::HashMap;

use serde::Serialize;

use crate::logging::OperationId;
use crate::model::{
    election::{Candidate, CandidateId, Election, ElectionId},
    store::Id,
    vote::Vote,
};

use super::{ElectionEngine, ElectionError, Result};

/// Vote counts for an election, and who (if anyone) won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: ElectionId,
    /// Every candidate currently on the election, including those with no votes.
    pub counts: HashMap<CandidateId, u64>,
    /// `None` on a tie, or when nobody has voted.
    pub winner: Option<Candidate>,
    /// The same counts in ballot order.
    pub standings: Vec<Standing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub candidate: Candidate,
    pub votes: u64,
}

impl ElectionResults {
    pub fn total_votes(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn count_for(&self, candidate_id: Id) -> Option<u64> {
        self.counts.get(&candidate_id).copied()
    }
}

/// Count `votes` for `election`.
///
/// Votes for other elections, or for candidates no longer on the ballot, are
/// skipped. The winner is found in one pass over the candidates in ballot
/// order: a count above the running maximum takes the lead, and a count equal
/// to a non-zero maximum clears the winner without lowering the maximum, so a
/// later, higher count can still win outright.
pub fn tally(election: &Election, votes: &[Vote]) -> ElectionResults {
    let mut counts: HashMap<CandidateId, u64> = election
        .candidates
        .iter()
        .map(|candidate| (candidate.id, 0))
        .collect();
    for vote in votes.iter().filter(|vote| vote.election_id == election.id) {
        if let Some(count) = counts.get_mut(&vote.candidate_id) {
            *count += 1;
        }
    }

    let mut winner = None;
    let mut max_votes: i64 = -1;
    for candidate in &election.candidates {
        let votes = counts[&candidate.id] as i64;
        if votes > max_votes {
            max_votes = votes;
            winner = Some(candidate);
        } else if votes == max_votes && max_votes != 0 {
            winner = None;
        }
    }
    // With no votes at all the loop leaves the first candidate leading on zero.
    if max_votes <= 0 {
        winner = None;
    }

    let standings = election
        .candidates
        .iter()
        .map(|candidate| Standing {
            candidate: candidate.clone(),
            votes: counts[&candidate.id],
        })
        .collect();

    ElectionResults {
        election_id: election.id,
        counts,
        winner: winner.cloned(),
        standings,
    }
}

impl ElectionEngine {
    /// Count the votes cast so far in an election.
    pub fn get_election_results(&self, election_id: ElectionId) -> Result<ElectionResults> {
        let op = OperationId::start("get_election_results", election_id);
        let result = self.store.transaction(|txn| {
            let election: Election = txn
                .find_one(&election_id.to_string())?
                .ok_or(ElectionError::ElectionNotFound(election_id))?;
            let votes = txn.find::<Vote, _>(|vote| vote.election_id == election_id)?;
            Ok(tally(&election, &votes))
        });
        op.finish(&result);
        result
    }
}
