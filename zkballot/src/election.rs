use crate::*;

use ark_bls12_381::Bls12_381;
use ark_groth16::{ProvingKey, VerifyingKey};
use rand_core::{CryptoRng, RngCore};

/// Everything `init_admin` produces: the circuit CRS, the encryption keys
/// bound to it, the session id and the census root.
pub struct ElectionArtifacts {
    pub circuit: CircuitKeys,
    pub session_public: SessionPublicKey,
    pub session_secret: SessionSecretKey,
    pub session_verification: SessionVerificationKey,
    pub eid: Vec<bool>,
    pub root: FieldElement,
}

impl ElectionArtifacts {
    /// The part a voter needs; the decryption key stays with the tally
    /// authority.
    pub fn public_view(&self) -> ElectionPublic {
        ElectionPublic {
            eid: self.eid.clone(),
            root: self.root,
            session_public: self.session_public.clone(),
            proving: self.circuit.proving.clone(),
            verifying: self.circuit.verifying.clone(),
        }
    }
}

/// The published election parameters consumed by the vote phase.
pub struct ElectionPublic {
    pub eid: Vec<bool>,
    pub root: FieldElement,
    pub session_public: SessionPublicKey,
    pub proving: ProvingKey<Bls12_381>,
    pub verifying: VerifyingKey<Bls12_381>,
}

/// Initialize an election over the full public-key list: build the census
/// tree, sample the session id, compile the voting relation into a CRS and
/// derive the encryption keys bound to it. Mutates nothing that has already
/// been published.
pub fn initialize_election<R: RngCore + CryptoRng>(
    config: &ElectionConfig,
    parameters: &CensusParameters,
    public_keys: &[VoterPublicKey],
    rng: &mut R,
) -> Result<ElectionArtifacts, Error> {
    let tree = CensusTree::build(parameters, config, public_keys)?;
    let root = tree.root();

    let eid: Vec<bool> = (0..config.eid_bits)
        .map(|_| rng.next_u32() & 1 == 1)
        .collect();

    let shape = BallotCircuit::setup_shape(parameters, config, &tree)?;
    let circuit = generate_circuit_keys(shape, rng)?;

    let digest = crs_digest(&circuit.verifying)?;
    let (session_public, session_secret, session_verification) =
        generate_session_keys(rng, digest, config.options);

    Ok(ElectionArtifacts {
        circuit,
        session_public,
        session_secret,
        session_verification,
        eid,
        root,
    })
}
