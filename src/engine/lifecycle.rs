use crate::logging::OperationId;
use crate::model::{
    election::{Election, ElectionId, ElectionSpec, ElectionUpdate},
    session::Session,
    vote::Vote,
};

use super::{require_admin, ElectionEngine, ElectionError, Result};

impl ElectionEngine {
    /// Create a new election. Admin only.
    pub fn create_election(&self, session: &Session, spec: ElectionSpec) -> Result<Election> {
        let op = OperationId::start("create_election", &spec.title);
        let result = require_admin(session).and_then(|_| {
            let election = Election::new(spec)?;
            self.store.transaction(|txn| txn.insert_one(&election))?;
            Ok(election)
        });
        op.finish(&result);
        result
    }

    /// Edit an election. Fields left out of `update` are kept. Admin only.
    pub fn update_election(
        &self,
        session: &Session,
        election_id: ElectionId,
        update: ElectionUpdate,
    ) -> Result<Election> {
        let op = OperationId::start("update_election", election_id);
        let result = require_admin(session).and_then(|_| {
            self.store.transaction(|txn| {
                let mut election: Election = txn
                    .find_one(&election_id.to_string())?
                    .ok_or(ElectionError::ElectionNotFound(election_id))?;
                election.apply(update)?;
                txn.replace_one(&election)?;
                Ok(election)
            })
        });
        op.finish(&result);
        result
    }

    /// Delete an election along with every vote cast in it. Admin only.
    /// Returns how many votes went with it.
    pub fn delete_election(&self, session: &Session, election_id: ElectionId) -> Result<usize> {
        let op = OperationId::start("delete_election", election_id);
        let result = require_admin(session).and_then(|_| {
            self.store.transaction(|txn| {
                if !txn.delete_one::<Election>(&election_id.to_string()) {
                    return Err(ElectionError::ElectionNotFound(election_id));
                }
                Ok(txn.delete_many::<Vote, _>(|vote| vote.election_id == election_id)?)
            })
        });
        if let Ok(removed) = &result {
            info!("Deleted election {election_id} and {removed} votes");
        }
        op.finish(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::auth::AuthSequencer;
    use crate::credentials::CredentialStore;
    use crate::model::{election::CandidateSpec, store::Coll};
    use crate::testing::voter_session;

    use super::*;

    #[engine_test(admin)]
    fn delete_cascades_to_votes(
        engine: ElectionEngine,
        session: Session,
        credentials: CredentialStore,
        auth: AuthSequencer,
        votes: Coll<Vote>,
    ) {
        let doomed = engine
            .create_election(&session, ElectionSpec::current_example())
            .unwrap();
        let kept = engine
            .create_election(&session, ElectionSpec::current_example())
            .unwrap();
        let voter = voter_session(&credentials, &auth);
        engine
            .cast_vote(&voter, doomed.id, doomed.candidates[0].id)
            .unwrap();
        engine
            .cast_vote(&voter, kept.id, kept.candidates[0].id)
            .unwrap();

        assert_eq!(engine.delete_election(&session, doomed.id).unwrap(), 1);
        assert!(votes.find(|v| v.election_id == doomed.id).unwrap().is_empty());
        assert_eq!(votes.count().unwrap(), 1);
        assert!(matches!(
            engine.get_election_results(doomed.id),
            Err(ElectionError::ElectionNotFound(_))
        ));
        assert!(matches!(
            engine.delete_election(&session, doomed.id),
            Err(ElectionError::ElectionNotFound(_))
        ));
        assert_eq!(
            engine.get_election_results(kept.id).unwrap().total_votes(),
            1
        );
    }

    #[engine_test(voter)]
    fn voters_cannot_manage_elections(engine: ElectionEngine, session: Session) {
        assert!(matches!(
            engine.create_election(&session, ElectionSpec::current_example()),
            Err(ElectionError::Forbidden)
        ));
        assert!(matches!(
            engine.create_election(&Session::new(), ElectionSpec::current_example()),
            Err(ElectionError::NotAuthenticated)
        ));
        assert!(engine.list_elections().unwrap().is_empty());
    }

    #[engine_test(admin)]
    fn update_revalidates(engine: ElectionEngine, session: Session) {
        let election = engine
            .create_election(&session, ElectionSpec::current_example())
            .unwrap();

        let broken = ElectionUpdate {
            end_time: Some(election.start_time - Duration::minutes(5)),
            ..ElectionUpdate::default()
        };
        assert!(matches!(
            engine.update_election(&session, election.id, broken),
            Err(ElectionError::InvalidElection(_))
        ));
        assert_eq!(engine.get_election(election.id).unwrap(), election);

        let update = ElectionUpdate {
            title: Some("By-election".into()),
            candidates: Some(vec![
                CandidateSpec::from(election.candidates[0].clone()),
                CandidateSpec::new("Late Entrant", "President"),
            ]),
            ..ElectionUpdate::default()
        };
        let updated = engine
            .update_election(&session, election.id, update)
            .unwrap();
        assert_eq!(updated.title, "By-election");
        assert_eq!(updated.candidates[0].id, election.candidates[0].id);
        assert_eq!(engine.get_election(election.id).unwrap(), updated);
    }

    #[engine_test(admin)]
    fn invalid_spec_is_rejected(engine: ElectionEngine, session: Session) {
        let mut spec = ElectionSpec::current_example();
        spec.candidates.clear();
        assert!(matches!(
            engine.create_election(&session, spec),
            Err(ElectionError::InvalidElection(_))
        ));
        assert!(engine.list_elections().unwrap().is_empty());
    }
}
