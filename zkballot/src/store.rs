use crate::*;

use ark_bls12_381::Bls12_381;
use ark_groth16::{ProvingKey, VerifyingKey};
use std::fs;
use std::path::{Path, PathBuf};

/// File-name prefixes for every artifact kind. Per-voter artifacts are
/// written as `<prefix><index>.bin`, election-wide singletons as
/// `<prefix>.bin`. The defaults match the reference deployment.
#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub voter_public_key: String,
    pub voter_secret_key: String,
    pub proof: String,
    pub primary_input: String,
    pub proving_key: String,
    pub verification_key: String,
    pub verifier_input: String,
    pub session_public_key: String,
    pub session_secret_key: String,
    pub session_verification_key: String,
    pub ciphertext: String,
    pub decryption_proof: String,
    pub voting_result: String,
    pub eid: String,
    pub serial_number: String,
    pub root: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        ArtifactPaths {
            dir: PathBuf::from("."),
            voter_public_key: "voter_public_key".into(),
            voter_secret_key: "voter_secret_key".into(),
            proof: "r1cs_proof".into(),
            primary_input: "r1cs_primary_input".into(),
            proving_key: "r1cs_proving_key".into(),
            verification_key: "r1cs_verification_key".into(),
            verifier_input: "r1cs_verification_input".into(),
            session_public_key: "pk_eid".into(),
            session_secret_key: "sk_eid".into(),
            session_verification_key: "vk_eid".into(),
            ciphertext: "cipher_text".into(),
            decryption_proof: "decryption_proof".into(),
            voting_result: "voting_result".into(),
            eid: "eid".into(),
            serial_number: "sn".into(),
            root: "rt".into(),
        }
    }
}

impl ArtifactPaths {
    pub fn single(&self, prefix: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", prefix))
    }

    pub fn indexed(&self, prefix: &str, index: usize) -> PathBuf {
        self.dir.join(format!("{}{}.bin", prefix, index))
    }

    /// The chunked verifier-input file carries an infix before the index.
    pub fn chunked(&self, prefix: &str, index: usize) -> PathBuf {
        self.dir.join(format!("{}_chunked{}.bin", prefix, index))
    }
}

/// Outcome of a persistence attempt under the no-clobber policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The path already existed; its contents were left untouched.
    SkippedExisting,
}

/// Artifact persistence. Writes never overwrite an existing file; the
/// existence check and the write are not atomic, so two processes racing to
/// be the first writer remain a best-effort case, not data corruption.
pub struct ArtifactStore {
    pub paths: ArtifactPaths,
}

impl ArtifactStore {
    pub fn new(paths: ArtifactPaths) -> Self {
        ArtifactStore { paths }
    }

    pub fn write(&self, path: &Path, chunks: &[&[u8]]) -> Result<WriteOutcome, Error> {
        if path.exists() {
            return Ok(WriteOutcome::SkippedExisting);
        }
        let mut blob = Vec::with_capacity(chunks.iter().map(|c| c.len()).sum());
        for chunk in chunks {
            blob.extend_from_slice(chunk);
        }
        fs::write(path, blob)?;
        Ok(WriteOutcome::Written)
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>, Error> {
        if !path.exists() {
            return Err(Error::FileMissing(path.to_path_buf()));
        }
        Ok(fs::read(path)?)
    }

    fn read_as<T: Marshal>(&self, path: &Path) -> Result<T, Error> {
        T::from_bytes(&self.read(path)?)
    }

    /// Write one artifact, collecting the path when an existing file made
    /// the write a no-op, so callers can report the soft conflict.
    fn write_tracked(
        &self,
        path: PathBuf,
        chunks: &[&[u8]],
        skipped: &mut Vec<PathBuf>,
    ) -> Result<(), Error> {
        if let WriteOutcome::SkippedExisting = self.write(&path, chunks)? {
            skipped.push(path);
        }
        Ok(())
    }

    // ---- voter keys ------------------------------------------------------

    pub fn write_voter_keys(
        &self,
        index: usize,
        public: &VoterPublicKey,
        secret: &VoterSecretKey,
    ) -> Result<Vec<PathBuf>, Error> {
        let mut skipped = Vec::new();
        self.write_tracked(
            self.paths.indexed(&self.paths.voter_public_key, index),
            &[&public.to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            self.paths.indexed(&self.paths.voter_secret_key, index),
            &[&secret.to_bytes()?],
            &mut skipped,
        )?;
        Ok(skipped)
    }

    pub fn read_voter_public_keys(&self, participants: usize) -> Result<Vec<VoterPublicKey>, Error> {
        let mut keys = Vec::with_capacity(participants);
        for index in 0..participants {
            keys.push(self.read_as(&self.paths.indexed(&self.paths.voter_public_key, index))?);
        }
        Ok(keys)
    }

    pub fn read_voter_secret_key(&self, index: usize) -> Result<VoterSecretKey, Error> {
        self.read_as(&self.paths.indexed(&self.paths.voter_secret_key, index))
    }

    // ---- election singletons --------------------------------------------

    pub fn write_election(&self, artifacts: &ElectionArtifacts) -> Result<Vec<PathBuf>, Error> {
        let paths = &self.paths;
        let mut skipped = Vec::new();
        self.write_tracked(
            paths.single(&paths.proving_key),
            &[&artifacts.circuit.proving.to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.single(&paths.verification_key),
            &[&artifacts.circuit.verifying.to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.single(&paths.session_public_key),
            &[&artifacts.session_public.to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.single(&paths.session_secret_key),
            &[&artifacts.session_secret.to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.single(&paths.session_verification_key),
            &[&artifacts.session_verification.to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.single(&paths.eid),
            &[&ScalarVector::from_bits(&artifacts.eid).to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.single(&paths.root),
            &[&ScalarVector::single(artifacts.root).to_bytes()?],
            &mut skipped,
        )?;
        Ok(skipped)
    }

    pub fn read_proving_key(&self) -> Result<ProvingKey<Bls12_381>, Error> {
        self.read_as(&self.paths.single(&self.paths.proving_key))
    }

    pub fn read_verifying_key(&self) -> Result<VerifyingKey<Bls12_381>, Error> {
        self.read_as(&self.paths.single(&self.paths.verification_key))
    }

    pub fn read_session_public_key(&self) -> Result<SessionPublicKey, Error> {
        self.read_as(&self.paths.single(&self.paths.session_public_key))
    }

    pub fn read_session_secret_key(&self) -> Result<SessionSecretKey, Error> {
        self.read_as(&self.paths.single(&self.paths.session_secret_key))
    }

    pub fn read_session_verification_key(&self) -> Result<SessionVerificationKey, Error> {
        self.read_as(&self.paths.single(&self.paths.session_verification_key))
    }

    pub fn read_eid(&self) -> Result<Vec<bool>, Error> {
        let vector: ScalarVector = self.read_as(&self.paths.single(&self.paths.eid))?;
        vector.to_bits()
    }

    pub fn read_root(&self) -> Result<FieldElement, Error> {
        let vector: ScalarVector = self.read_as(&self.paths.single(&self.paths.root))?;
        if vector.len() != 1 {
            return Err(Error::SizeMismatch {
                expected: 1,
                actual: vector.len(),
            });
        }
        Ok(vector.0[0])
    }

    // ---- per-voter vote artifacts ---------------------------------------

    /// Persist a cast vote: proof, primary input, ciphertext and serial
    /// number under their per-voter names, plus the combined verifier-input
    /// file and its chunked variant.
    pub fn write_vote(
        &self,
        index: usize,
        vote: &VoteArtifact,
        verifying: &VerifyingKey<Bls12_381>,
        session_public: &SessionPublicKey,
    ) -> Result<Vec<PathBuf>, Error> {
        let paths = &self.paths;
        let mut skipped = Vec::new();
        let proof = vote.proof.to_bytes()?;
        let primary_input = vote.primary_input.to_bytes()?;
        let ciphertext = vote.ciphertext.to_bytes()?;
        let serial = ScalarVector::single(vote.serial_number).to_bytes()?;

        self.write_tracked(paths.indexed(&paths.proof, index), &[&proof], &mut skipped)?;
        self.write_tracked(
            paths.indexed(&paths.primary_input, index),
            &[&primary_input],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.indexed(&paths.ciphertext, index),
            &[&ciphertext],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.indexed(&paths.serial_number, index),
            &[&serial],
            &mut skipped,
        )?;

        let vk_crs = verifying.to_bytes()?;
        let pk_eid = session_public.to_bytes()?;
        let eid = ScalarVector::from_bits(&vote.eid).to_bytes()?;
        let root = ScalarVector::single(vote.root).to_bytes()?;
        self.write_tracked(
            paths.indexed(&paths.verifier_input, index),
            &[&proof, &vk_crs, &pk_eid, &ciphertext, &primary_input],
            &mut skipped,
        )?;
        self.write_tracked(
            paths.chunked(&paths.verifier_input, index),
            &[&proof, &vk_crs, &pk_eid, &ciphertext, &eid, &serial, &root],
            &mut skipped,
        )?;
        Ok(skipped)
    }

    pub fn read_vote(&self, config: &ElectionConfig, index: usize) -> Result<VoteArtifact, Error> {
        let paths = &self.paths;
        let proof: VoteProof = self.read_as(&paths.indexed(&paths.proof, index))?;
        let primary_input: ScalarVector =
            self.read_as(&paths.indexed(&paths.primary_input, index))?;
        let ciphertext: Ciphertext = self.read_as(&paths.indexed(&paths.ciphertext, index))?;
        let vote = VoteArtifact::from_parts(config, proof, primary_input, ciphertext)?;

        let serial: ScalarVector = self.read_as(&paths.indexed(&paths.serial_number, index))?;
        if serial.len() != 1 || serial.0[0] != vote.serial_number {
            return Err(Error::Malformed(
                "serial number artifact disagrees with the primary input",
            ));
        }
        Ok(vote)
    }

    pub fn read_ciphertexts(&self, participants: usize) -> Result<Vec<Ciphertext>, Error> {
        let mut ciphertexts = Vec::with_capacity(participants);
        for index in 0..participants {
            ciphertexts.push(self.read_as(&self.paths.indexed(&self.paths.ciphertext, index))?);
        }
        Ok(ciphertexts)
    }

    // ---- tally artifacts -------------------------------------------------

    pub fn write_tally(&self, tally: &TallyResult) -> Result<Vec<PathBuf>, Error> {
        let mut skipped = Vec::new();
        self.write_tracked(
            self.paths.single(&self.paths.decryption_proof),
            &[&tally.proof.to_bytes()?],
            &mut skipped,
        )?;
        self.write_tracked(
            self.paths.single(&self.paths.voting_result),
            &[&ScalarVector::from_counts(&tally.counts).to_bytes()?],
            &mut skipped,
        )?;
        Ok(skipped)
    }

    pub fn read_tally(&self) -> Result<(Vec<u64>, DecryptionProof), Error> {
        let result: ScalarVector = self.read_as(&self.paths.single(&self.paths.voting_result))?;
        let proof: DecryptionProof =
            self.read_as(&self.paths.single(&self.paths.decryption_proof))?;
        Ok((result.to_counts()?, proof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clobber_leaves_existing_contents_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = ArtifactPaths::default();
        paths.dir = dir.path().to_path_buf();
        let store = ArtifactStore::new(paths.clone());

        let path = paths.single(&paths.eid);
        assert_eq!(
            store.write(&path, &[b"first" as &[u8]]).unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            store.write(&path, &[b"second" as &[u8]]).unwrap(),
            WriteOutcome::SkippedExisting
        );
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn chunks_are_concatenated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = ArtifactPaths::default();
        paths.dir = dir.path().to_path_buf();
        let store = ArtifactStore::new(paths.clone());

        let path = paths.indexed(&paths.verifier_input, 0);
        store
            .write(&path, &[b"ab" as &[u8], b"" as &[u8], b"cd" as &[u8]])
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abcd");
    }

    #[test]
    fn missing_artifact_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = ArtifactPaths::default();
        paths.dir = dir.path().to_path_buf();
        let store = ArtifactStore::new(paths.clone());

        match store.read(&paths.single(&paths.root)) {
            Err(Error::FileMissing(path)) => assert_eq!(path, paths.single(&paths.root)),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
