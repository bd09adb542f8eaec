use crate::*;

use ark_bls12_381::Bls12_381;
use ark_crypto_primitives::crh::CRHGadget;
use ark_ff::Zero;
use ark_groth16::{
    create_random_proof, generate_random_parameters, prepare_verifying_key, verify_proof, Proof,
    ProvingKey, VerifyingKey,
};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::ns;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, ConstraintSystemRef, SynthesisError};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

pub type MembershipProof = Proof<Bls12_381>;

/// One-time setup output of the proof engine for the voting relation.
pub struct CircuitKeys {
    pub proving: ProvingKey<Bls12_381>,
    pub verifying: VerifyingKey<Bls12_381>,
}

/// The voting relation.
///
/// Public inputs, in primary-input order after the ballot block: the
/// session id bits, the serial number, the census root. The witness is the
/// voter's secret key and Merkle inclusion path (address bits travel inside
/// the path). Constraints: the leaf derived from the secret key sits in the
/// tree under the public root, and `sn = Hash(eid ‖ sk)`. Ballot one-hot
/// validity is delegated to the encryption engine's ballot proof.
pub struct BallotCircuit {
    pub parameters: CensusParameters,
    // public
    pub eid: Vec<bool>,
    pub serial_number: FieldElement,
    pub root: FieldElement,
    // witness
    pub secret_key: [u8; PACKED_KEY_BYTES],
    pub path: CensusPath,
}

impl BallotCircuit {
    /// A structurally complete instance for key generation; the assignment
    /// is a placeholder and need not satisfy the relation.
    pub fn setup_shape(
        parameters: &CensusParameters,
        config: &ElectionConfig,
        tree: &CensusTree,
    ) -> Result<Self, Error> {
        Ok(BallotCircuit {
            parameters: parameters.clone(),
            eid: vec![false; config.eid_bits],
            serial_number: FieldElement::zero(),
            root: tree.root(),
            secret_key: [0u8; PACKED_KEY_BYTES],
            path: tree.proof(0)?,
        })
    }
}

/// Pack boolean variables into bytes the same way [`pack_bits`] does:
/// first bit into the most significant position, zero-padded tail.
fn bytes_from_bits(
    bits: &[Boolean<FieldElement>],
) -> Result<Vec<UInt8<FieldElement>>, SynthesisError> {
    let mut bytes = Vec::with_capacity((bits.len() + 7) / 8);
    for chunk in bits.chunks(8) {
        let mut le_bits = vec![Boolean::FALSE; 8];
        for (k, bit) in chunk.iter().enumerate() {
            le_bits[7 - k] = bit.clone();
        }
        bytes.push(UInt8::from_bits_le(&le_bits));
    }
    Ok(bytes)
}

impl ConstraintSynthesizer<FieldElement> for BallotCircuit {
    fn generate_constraints(
        self,
        cs: ConstraintSystemRef<FieldElement>,
    ) -> Result<(), SynthesisError> {
        let leaf_params =
            LeafHashParamsVar::new_constant(ns!(cs, "leaf_params"), &self.parameters.leaf)?;
        let node_params =
            NodeHashParamsVar::new_constant(ns!(cs, "node_params"), &self.parameters.node)?;

        // public inputs, in primary-input order
        let mut eid_inputs = Vec::with_capacity(self.eid.len());
        for bit in &self.eid {
            eid_inputs.push(FpVar::new_input(ns!(cs, "eid"), || {
                Ok(FieldElement::from(*bit as u64))
            })?);
        }
        let sn_input = FpVar::new_input(ns!(cs, "sn"), || Ok(self.serial_number))?;
        let root_input = FpVar::new_input(ns!(cs, "rt"), || Ok(self.root))?;

        // session id bits as booleans, tied to their public field elements
        let mut eid_bits = Vec::with_capacity(self.eid.len());
        for bit in &self.eid {
            eid_bits.push(Boolean::new_witness(ns!(cs, "eid_bit"), || Ok(*bit))?);
        }
        for (bit, input) in eid_bits.iter().zip(&eid_inputs) {
            FpVar::from(bit.clone()).enforce_equal(input)?;
        }

        let secret_key = UInt8::new_witness_vec(ns!(cs, "sk"), &self.secret_key)?;
        let path = CensusPathVar::new_witness(ns!(cs, "path"), || Ok(&self.path))?;

        // the census leaf is the hash commitment to the secret key
        let leaf = LeafHashGadget::evaluate(&leaf_params, &secret_key)?;
        let leaf_bytes = leaf.to_bytes()?;
        let leaf_slice: &[_] = leaf_bytes.as_slice();
        path.verify_membership(&leaf_params, &node_params, &root_input, &leaf_slice)?
            .enforce_equal(&Boolean::TRUE)?;

        // sn = Hash(eid ‖ sk) pins the serial number to this session
        let mut preimage = bytes_from_bits(&eid_bits)?;
        preimage.extend_from_slice(&secret_key);
        let serial = LeafHashGadget::evaluate(&leaf_params, &preimage)?;
        serial.enforce_equal(&sn_input)?;

        Ok(())
    }
}

/// Public-input vector of the relation for a given statement, matching the
/// allocation order in `generate_constraints`.
pub fn membership_public_inputs(
    eid: &[bool],
    serial_number: &FieldElement,
    root: &FieldElement,
) -> Vec<FieldElement> {
    let mut inputs: Vec<FieldElement> = eid
        .iter()
        .map(|bit| FieldElement::from(*bit as u64))
        .collect();
    inputs.push(*serial_number);
    inputs.push(*root);
    inputs
}

/// One-time CRS generation for the relation.
pub fn generate_circuit_keys<R: RngCore + CryptoRng>(
    circuit: BallotCircuit,
    rng: &mut R,
) -> Result<CircuitKeys, Error> {
    let proving = generate_random_parameters::<Bls12_381, _, _>(circuit, rng)?;
    let verifying = proving.vk.clone();
    Ok(CircuitKeys { proving, verifying })
}

pub fn prove_membership<R: RngCore + CryptoRng>(
    proving: &ProvingKey<Bls12_381>,
    circuit: BallotCircuit,
    rng: &mut R,
) -> Result<MembershipProof, Error> {
    Ok(create_random_proof(circuit, proving, rng)?)
}

pub fn verify_membership(
    verifying: &VerifyingKey<Bls12_381>,
    public_inputs: &[FieldElement],
    proof: &MembershipProof,
) -> Result<(), VerificationError> {
    let pvk = prepare_verifying_key(verifying);
    match verify_proof(&pvk, proof, public_inputs) {
        Ok(true) => Ok(()),
        _ => Err(VerificationError::MembershipProofFailed),
    }
}

/// Digest binding the encryption keys to the circuit CRS.
pub fn crs_digest(verifying: &VerifyingKey<Bls12_381>) -> Result<[u8; 32], Error> {
    Ok(Sha256::digest(&verifying.to_bytes()?).into())
}

/// Evaluate the relation on a fully assigned circuit without proving.
/// An unsatisfied relation on honestly derived inputs is a programming
/// error, not a user error.
pub fn relation_is_satisfied(circuit: BallotCircuit) -> Result<bool, Error> {
    let cs = ConstraintSystem::<FieldElement>::new_ref();
    circuit.generate_constraints(cs.clone())?;
    Ok(cs.is_satisfied()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn honest_assignment_satisfies_the_relation() {
        let parameters = CensusParameters::deterministic();
        let config = ElectionConfig::new(2, 16, 3).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(31);

        let mut secrets = Vec::new();
        let mut publics = Vec::new();
        for _ in 0..config.participants() {
            let (sk, pk) = generate_voter_keypair(&parameters, &mut rng).unwrap();
            secrets.push(sk);
            publics.push(pk);
        }
        let tree = CensusTree::build(&parameters, &config, &publics).unwrap();
        let eid: Vec<bool> = (0..config.eid_bits).map(|i| i % 2 == 0).collect();
        let sn = serial_number(&parameters, &eid, &secrets[1]).unwrap();

        let circuit = BallotCircuit {
            parameters: parameters.clone(),
            eid: eid.clone(),
            serial_number: sn,
            root: tree.root(),
            secret_key: *secrets[1].as_bytes(),
            path: tree.proof(1).unwrap(),
        };
        assert!(relation_is_satisfied(circuit).unwrap());

        // a serial number computed for a different session must not satisfy
        let other_eid: Vec<bool> = (0..config.eid_bits).map(|i| i % 3 == 0).collect();
        let stale_sn = serial_number(&parameters, &other_eid, &secrets[1]).unwrap();
        let bad = BallotCircuit {
            parameters,
            eid,
            serial_number: stale_sn,
            root: tree.root(),
            secret_key: *secrets[1].as_bytes(),
            path: tree.proof(1).unwrap(),
        };
        assert!(!relation_is_satisfied(bad).unwrap());
    }
}
