use crate::*;

use ark_bls12_381::Bls12_381;
use ark_ff::{One, Zero};
use ark_groth16::VerifyingKey;
use rand_core::{CryptoRng, RngCore};
use std::collections::HashMap;

/// The proofs published with a vote: the membership proof from the proof
/// engine and the ballot-validity proof from the encryption engine.
pub struct VoteProof {
    pub membership: MembershipProof,
    pub ballot: BallotProof,
}

/// A cast, published ballot. Immutable once created; contains nothing that
/// identifies the voter.
pub struct VoteArtifact {
    pub proof: VoteProof,
    /// Exported primary input: session id bits, serial number, root. The
    /// ballot block stays in zero knowledge and is never exported.
    pub primary_input: ScalarVector,
    pub ciphertext: Ciphertext,
    pub serial_number: FieldElement,
    pub eid: Vec<bool>,
    pub root: FieldElement,
}

impl VoteArtifact {
    /// Reassemble a published vote from its marshalled parts, splitting the
    /// primary input into its named sub-fields at the fixed offsets.
    pub fn from_parts(
        config: &ElectionConfig,
        proof: VoteProof,
        primary_input: ScalarVector,
        ciphertext: Ciphertext,
    ) -> Result<Self, Error> {
        if primary_input.len() != config.eid_bits + 2 {
            return Err(VerificationError::PrimaryInputShape.into());
        }
        let eid = ScalarVector(primary_input.0[..config.eid_bits].to_vec())
            .to_bits()
            .map_err(|_| VerificationError::PrimaryInputShape)?;
        let serial_number = primary_input.0[config.eid_bits];
        let root = primary_input.0[config.eid_bits + 1];
        Ok(VoteArtifact {
            proof,
            primary_input,
            ciphertext,
            serial_number,
            eid,
            root,
        })
    }
}

/// Cast a ballot: derive the inclusion path and serial number, prove the
/// voting relation, encrypt the one-hot ballot, rerandomize it and
/// self-verify everything before the artifact is allowed to exist.
pub fn cast_vote<R: RngCore + CryptoRng>(
    config: &ElectionConfig,
    parameters: &CensusParameters,
    voter_index: usize,
    secret_key: &VoterSecretKey,
    public_keys: &[VoterPublicKey],
    election: &ElectionPublic,
    choice: usize,
    rng: &mut R,
) -> Result<VoteArtifact, Error> {
    if voter_index >= config.participants() {
        return Err(Error::IndexOutOfRange {
            index: voter_index,
            capacity: config.participants(),
        });
    }
    if choice >= config.options {
        return Err(Error::IndexOutOfRange {
            index: choice,
            capacity: config.options,
        });
    }
    if election.eid.len() != config.eid_bits {
        return Err(Error::Malformed("session id has the wrong length"));
    }
    if election.session_public.options != config.options
        || election.session_public.crs_digest != crs_digest(&election.verifying)?
    {
        return Err(Error::KeyBindingMismatch);
    }

    // a voter never trusts the published root blindly
    let tree = CensusTree::build(parameters, config, public_keys)?;
    if tree.root() != election.root {
        return Err(Error::RootMismatch);
    }
    let sn = serial_number(parameters, &election.eid, secret_key)?;

    let assemble = |path: CensusPath| BallotCircuit {
        parameters: parameters.clone(),
        eid: election.eid.clone(),
        serial_number: sn,
        root: tree.root(),
        secret_key: *secret_key.as_bytes(),
        path,
    };
    if !relation_is_satisfied(assemble(tree.proof(voter_index)?))? {
        return Err(Error::UnsatisfiedRelation);
    }
    let membership = prove_membership(&election.proving, assemble(tree.proof(voter_index)?), rng)?;

    // full primary input: ballot, eid bits, serial number, root; only the
    // sub-fields from the eid offset onward are exported
    let mut primary = vec![FieldElement::zero(); config.options];
    primary[choice] = FieldElement::one();
    primary.extend(membership_public_inputs(&election.eid, &sn, &tree.root()));
    debug_assert_eq!(primary.len(), config.primary_input_len());
    let exported = ScalarVector(primary[config.eid_offset()..].to_vec());
    let binding = exported.to_bytes()?;

    let (ciphertext, opening) = encrypt_ballot(rng, &election.session_public, choice)?;
    let (ciphertext, _, ballot) = rerandomize_ballot(
        rng,
        &election.session_public,
        &ciphertext,
        &opening,
        &binding,
    )?;

    // never publish an artifact that would fail third-party verification
    verify_ballot(&election.session_public, &ciphertext, &ballot, &binding)?;
    verify_membership(&election.verifying, &exported.0, &membership)?;

    Ok(VoteArtifact {
        proof: VoteProof { membership, ballot },
        primary_input: exported,
        ciphertext,
        serial_number: sn,
        eid: election.eid.clone(),
        root: tree.root(),
    })
}

/// Verify a set of published votes: membership and ballot proofs against
/// the election keys, session and root consistency across artifacts, and
/// serial-number uniqueness (two equal serial numbers in one session are
/// the same voter replaying).
pub fn verify_cast_votes(
    config: &ElectionConfig,
    votes: &[VoteArtifact],
    verifying: &VerifyingKey<Bls12_381>,
    session_public: &SessionPublicKey,
    eid: &[bool],
    root: &FieldElement,
) -> Result<(), Error> {
    if session_public.crs_digest != crs_digest(verifying)? {
        return Err(Error::KeyBindingMismatch);
    }
    let mut seen: HashMap<[u8; 32], usize> = HashMap::with_capacity(votes.len());
    for (index, vote) in votes.iter().enumerate() {
        if vote.primary_input.len() != config.eid_bits + 2 {
            return Err(VerificationError::PrimaryInputShape.into());
        }
        if vote.eid != eid {
            return Err(VerificationError::SessionMismatch.into());
        }
        if vote.root != *root {
            return Err(VerificationError::RootMismatch.into());
        }
        let binding = vote.primary_input.to_bytes()?;
        verify_membership(verifying, &vote.primary_input.0, &vote.proof.membership)?;
        verify_ballot(session_public, &vote.ciphertext, &vote.proof.ballot, &binding)?;

        let key = field_to_bytes(&vote.serial_number)?;
        if let Some(previous) = seen.insert(key, index) {
            return Err(VerificationError::DuplicateSerialNumber(previous, index).into());
        }
    }
    Ok(())
}
