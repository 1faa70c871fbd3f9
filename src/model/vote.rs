use chrono::{DateTime, SecondsFormat, Utc};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::model::{
    election::{CandidateId, ElectionId},
    identity::Identity,
    store::{Id, StoreCollection},
};

pub type HmacSha256 = Hmac<Sha256>;

/// A cast vote, as stored. Votes are never edited; they only disappear
/// together with their election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Id,
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub voter_id: Id,
    pub voter_name: String,
    pub voter_email: String,
    pub cast_at: DateTime<Utc>,
    /// HMAC over the fields above, keyed with the configured signing secret.
    pub signature: String,
}

impl Vote {
    /// Create and sign a new vote.
    pub fn new(
        election_id: ElectionId,
        candidate_id: CandidateId,
        voter: &Identity,
        cast_at: DateTime<Utc>,
        secret: &[u8],
    ) -> Self {
        let mut vote = Self {
            id: Id::new(),
            election_id,
            candidate_id,
            voter_id: voter.id,
            voter_name: voter.name.clone(),
            voter_email: voter.email.clone(),
            cast_at,
            signature: String::new(),
        };
        let tag = vote.mac(secret).finalize().into_bytes();
        vote.signature = BASE64URL_NOPAD.encode(&tag);
        vote
    }

    /// Check the signature against the signing secret.
    pub fn verify_signature(&self, secret: &[u8]) -> bool {
        match BASE64URL_NOPAD.decode(self.signature.as_bytes()) {
            Ok(tag) => self.mac(secret).verify_slice(&tag).is_ok(),
            Err(_) => false,
        }
    }

    fn mac(&self, secret: &[u8]) -> HmacSha256 {
        let mut hmac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
        hmac.update(&self.id.to_bytes());
        hmac.update(&self.election_id.to_bytes());
        hmac.update(&self.candidate_id.to_bytes());
        hmac.update(&self.voter_id.to_bytes());
        hmac.update(
            self.cast_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        hmac
    }
}

const VOTES: &str = "vote_";
impl StoreCollection for Vote {
    const NAME: &'static str = VOTES;

    fn key(&self) -> String {
        self.id.to_string()
    }
}
