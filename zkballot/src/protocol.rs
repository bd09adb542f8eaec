use crate::*;

use rand_core::{CryptoRng, RngCore};
use std::path::PathBuf;
use std::str::FromStr;

/// The protocol phases, in their mandatory order. `init_voter` runs once
/// per voter before `init_admin`; `vote` runs once per voter after it;
/// `tally_admin` runs exactly once after all votes; `vote_verify` and
/// `tally_voter` are repeatable read-only audits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    InitVoter,
    InitAdmin,
    Vote,
    VoteVerify,
    TallyAdmin,
    TallyVoter,
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init_voter" => Ok(Phase::InitVoter),
            "init_admin" => Ok(Phase::InitAdmin),
            "vote" => Ok(Phase::Vote),
            "vote_verify" => Ok(Phase::VoteVerify),
            "tally_admin" => Ok(Phase::TallyAdmin),
            "tally_voter" => Ok(Phase::TallyVoter),
            _ => Err(Error::Config("unknown protocol phase")),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Phase::InitVoter => "init_voter",
            Phase::InitAdmin => "init_admin",
            Phase::Vote => "vote",
            Phase::VoteVerify => "vote_verify",
            Phase::TallyAdmin => "tally_admin",
            Phase::TallyVoter => "tally_voter",
        };
        write!(f, "{}", name)
    }
}

/// Sequences the protocol phases over an artifact store. Phases share no
/// in-memory state; each one reads its prerequisites from the store and
/// persists its outputs, so independent processes can run disjoint voter
/// indices concurrently.
pub struct Orchestrator {
    pub config: ElectionConfig,
    pub parameters: CensusParameters,
    pub store: ArtifactStore,
}

impl Orchestrator {
    pub fn new(config: ElectionConfig, store: ArtifactStore) -> Self {
        Orchestrator {
            config,
            parameters: CensusParameters::deterministic(),
            store,
        }
    }

    /// Generate and persist one voter's keypair. The secret key file is the
    /// only artifact that must never be shared. Returns the public key and
    /// the paths whose writes were skipped because the files already
    /// existed.
    pub fn init_voter<R: RngCore + CryptoRng>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<(VoterPublicKey, Vec<PathBuf>), Error> {
        if index >= self.config.participants() {
            return Err(Error::IndexOutOfRange {
                index,
                capacity: self.config.participants(),
            });
        }
        let (secret, public) = generate_voter_keypair(&self.parameters, rng)?;
        let skipped = self.store.write_voter_keys(index, &public, &secret)?;
        Ok((public, skipped))
    }

    /// Initialize the election over the complete public-key list.
    pub fn init_admin<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(ElectionArtifacts, Vec<PathBuf>), Error> {
        let public_keys = self
            .store
            .read_voter_public_keys(self.config.participants())?;
        let artifacts = initialize_election(&self.config, &self.parameters, &public_keys, rng)?;
        let skipped = self.store.write_election(&artifacts)?;
        Ok((artifacts, skipped))
    }

    /// Cast and persist one voter's ballot. `choice` defaults to a random
    /// option when not given.
    pub fn vote<R: RngCore + CryptoRng>(
        &self,
        index: usize,
        choice: Option<usize>,
        rng: &mut R,
    ) -> Result<(VoteArtifact, Vec<PathBuf>), Error> {
        let public_keys = self
            .store
            .read_voter_public_keys(self.config.participants())?;
        let secret_key = self.store.read_voter_secret_key(index)?;
        let election = ElectionPublic {
            eid: self.store.read_eid()?,
            root: self.store.read_root()?,
            session_public: self.store.read_session_public_key()?,
            proving: self.store.read_proving_key()?,
            verifying: self.store.read_verifying_key()?,
        };
        let choice = match choice {
            Some(option) => option,
            None => rng.next_u32() as usize % self.config.options,
        };
        let vote = cast_vote(
            &self.config,
            &self.parameters,
            index,
            &secret_key,
            &public_keys,
            &election,
            choice,
            rng,
        )?;
        let skipped =
            self.store
                .write_vote(index, &vote, &election.verifying, &election.session_public)?;
        Ok((vote, skipped))
    }

    /// Verify every published vote against the election keys.
    pub fn vote_verify(&self) -> Result<(), Error> {
        let mut votes = Vec::with_capacity(self.config.participants());
        for index in 0..self.config.participants() {
            votes.push(self.store.read_vote(&self.config, index)?);
        }
        let verifying = self.store.read_verifying_key()?;
        let session_public = self.store.read_session_public_key()?;
        let eid = self.store.read_eid()?;
        let root = self.store.read_root()?;
        verify_cast_votes(&self.config, &votes, &verifying, &session_public, &eid, &root)
    }

    /// Aggregate, decrypt and publish the tally with its decryption proof.
    pub fn tally_admin<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(TallyResult, Vec<PathBuf>), Error> {
        let ciphertexts = self.store.read_ciphertexts(self.config.participants())?;
        let session_secret = self.store.read_session_secret_key()?;
        let session_verification = self.store.read_session_verification_key()?;
        let verifying = self.store.read_verifying_key()?;
        let tally = tally_votes(
            &self.config,
            &ciphertexts,
            &session_secret,
            &session_verification,
            &verifying,
            rng,
        )?;
        let skipped = self.store.write_tally(&tally)?;
        Ok((tally, skipped))
    }

    /// Audit the published tally; returns the verified counts.
    pub fn tally_voter(&self) -> Result<Vec<u64>, Error> {
        let ciphertexts = self.store.read_ciphertexts(self.config.participants())?;
        let session_verification = self.store.read_session_verification_key()?;
        let verifying = self.store.read_verifying_key()?;
        let (counts, proof) = self.store.read_tally()?;
        verify_tally(
            &self.config,
            &ciphertexts,
            &session_verification,
            &verifying,
            &counts,
            &proof,
        )?;
        Ok(counts)
    }

    /// Single-process demo mode: run every phase in order through the
    /// store, with random ballots, and return the verified counts.
    pub fn run_demo<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Vec<u64>, Error> {
        for index in 0..self.config.participants() {
            self.init_voter(index, rng)?;
        }
        self.init_admin(rng)?;
        for index in 0..self.config.participants() {
            self.vote(index, None, rng)?;
        }
        self.vote_verify()?;
        self.tally_admin(rng)?;
        self.tally_voter()
    }
}
