use chrono::{DateTime, Utc};

use crate::logging::OperationId;
use crate::model::{
    election::{CandidateId, Election, ElectionId, ElectionStatus},
    identity::Identity,
    session::Session,
    store::Id,
    vote::Vote,
};

use super::{require_voter, ElectionEngine, ElectionError, Result};

impl ElectionEngine {
    /// Cast the current user's vote.
    pub fn cast_vote(
        &self,
        session: &Session,
        election_id: ElectionId,
        candidate_id: CandidateId,
    ) -> Result<Vote> {
        self.cast_vote_at(session, election_id, candidate_id, None, Utc::now())
    }

    /// Cast a vote after the user tapped one of their registered hardware keys.
    pub fn cast_vote_with_security_key(
        &self,
        session: &Session,
        election_id: ElectionId,
        candidate_id: CandidateId,
        key_id: Id,
    ) -> Result<Vote> {
        self.cast_vote_at(session, election_id, candidate_id, Some(key_id), Utc::now())
    }

    /// Cast a vote as if the clock read `now`.
    ///
    /// Checks run in a fixed order so the caller always gets the most useful
    /// error: who is voting, which election, whether it is open, whether they
    /// already voted, then the choice itself.
    pub fn cast_vote_at(
        &self,
        session: &Session,
        election_id: ElectionId,
        candidate_id: CandidateId,
        presented_key: Option<Id>,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        let op = OperationId::start("cast_vote", format_args!("{election_id}/{candidate_id}"));
        let result = self.cast(session, election_id, candidate_id, presented_key, now);
        if let Ok(vote) = &result {
            debug!("Vote {} recorded for {}", vote.id, vote.voter_email);
        }
        op.finish(&result);
        result
    }

    fn cast(
        &self,
        session: &Session,
        election_id: ElectionId,
        candidate_id: CandidateId,
        presented_key: Option<Id>,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        let cached = require_voter(session)?;

        self.store.transaction(|txn| {
            // Get the voter as stored; the session's copy may be stale.
            let voter: Identity = txn
                .find_one::<Identity>(&cached.email)?
                .filter(|voter| voter.id == cached.id && voter.is_active())
                .ok_or(ElectionError::NotAuthenticated)?;

            // Get the election and check it is open.
            let election: Election = txn
                .find_one(&election_id.to_string())?
                .ok_or(ElectionError::ElectionNotFound(election_id))?;
            match election.status_at(now) {
                ElectionStatus::Upcoming => return Err(ElectionError::ElectionNotStarted),
                ElectionStatus::Ended => return Err(ElectionError::ElectionEnded),
                ElectionStatus::Active => {}
            }

            // One vote per voter per election.
            let already_voted = !txn
                .find::<Vote, _>(|vote| {
                    vote.election_id == election_id && vote.voter_id == voter.id
                })?
                .is_empty();
            if already_voted {
                return Err(ElectionError::DuplicateVote);
            }

            // Check the choice and any key the voter has to present.
            if election.candidate(candidate_id).is_none() {
                return Err(ElectionError::CandidateNotFound(candidate_id));
            }
            let settings = &voter.settings;
            if settings.require_security_key_for_voting
                && !presented_key.map_or(false, |key| settings.has_security_key(key))
            {
                return Err(ElectionError::SecurityKeyRequired);
            }

            // Record the vote.
            let vote = Vote::new(election_id, candidate_id, &voter, now, &self.signing_secret);
            txn.insert_one(&vote)?;
            Ok(vote)
        })
    }
}
