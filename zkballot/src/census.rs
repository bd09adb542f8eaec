use crate::*;

use ark_crypto_primitives::crh::injective_map::constraints::{
    PedersenCRHCompressorGadget, TECompressorGadget,
};
use ark_crypto_primitives::crh::injective_map::{PedersenCRHCompressor, TECompressor};
use ark_crypto_primitives::crh::{pedersen, CRHGadget, TwoToOneCRH, TwoToOneCRHGadget, CRH};
use ark_crypto_primitives::merkle_tree::constraints::PathVar;
use ark_crypto_primitives::merkle_tree::{self, MerkleTree, Path};
use ark_ed_on_bls12_381::constraints::EdwardsVar;
use ark_ed_on_bls12_381::EdwardsProjective;
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};

/// Scalar field of the proving curve; digests, session bits and ballot
/// entries are all carried as elements of this field.
pub type FieldElement = ark_bls12_381::Fr;

/// Secret keys are bit vectors as long as a hash digest.
pub const SECRET_KEY_BITS: usize = 255;

/// Canonical packed size of a digest-length bit vector.
pub const PACKED_KEY_BYTES: usize = 32;

/// Upper bound on the session id length, set by the capacity of the hash
/// window minus the secret-key block it is hashed together with.
pub const MAX_EID_BITS: usize = 320;

#[derive(Clone)]
pub struct LeafWindow;
impl pedersen::Window for LeafWindow {
    const WINDOW_SIZE: usize = 4;
    const NUM_WINDOWS: usize = 144;
}

#[derive(Clone)]
pub struct NodeWindow;
impl pedersen::Window for NodeWindow {
    const WINDOW_SIZE: usize = 4;
    const NUM_WINDOWS: usize = 128;
}

pub type LeafHash = PedersenCRHCompressor<EdwardsProjective, TECompressor, LeafWindow>;
pub type NodeHash = PedersenCRHCompressor<EdwardsProjective, TECompressor, NodeWindow>;

pub type LeafHashGadget =
    PedersenCRHCompressorGadget<EdwardsProjective, TECompressor, LeafWindow, EdwardsVar, TECompressorGadget>;
pub type NodeHashGadget =
    PedersenCRHCompressorGadget<EdwardsProjective, TECompressor, NodeWindow, EdwardsVar, TECompressorGadget>;

pub type LeafHashParamsVar = <LeafHashGadget as CRHGadget<LeafHash, FieldElement>>::ParametersVar;
pub type NodeHashParamsVar =
    <NodeHashGadget as TwoToOneCRHGadget<NodeHash, FieldElement>>::ParametersVar;

/// Census tree shape: binary tree with Pedersen-compressed hashes at both
/// the leaf and inner layers.
#[derive(Clone)]
pub struct CensusShape;
impl merkle_tree::Config for CensusShape {
    type LeafHash = LeafHash;
    type TwoToOneHash = NodeHash;
}

pub type CensusPath = Path<CensusShape>;
pub type CensusPathVar = PathVar<CensusShape, LeafHashGadget, NodeHashGadget, FieldElement>;

/// Generator sets for the two hash layers.
///
/// Derived from a fixed domain-separation seed so that every party, in any
/// process, hashes with the same generators; voters can therefore create
/// their key commitments before the election is initialized.
#[derive(Clone)]
pub struct CensusParameters {
    pub leaf: <LeafHash as CRH>::Parameters,
    pub node: <NodeHash as TwoToOneCRH>::Parameters,
}

impl CensusParameters {
    pub fn deterministic() -> Self {
        let seed: [u8; 32] = Sha256::digest(b"zkballot.census.generators.v1").into();
        let mut rng = ChaCha20Rng::from_seed(seed);
        let leaf = <LeafHash as CRH>::setup(&mut rng)
            .expect("zkballot: Pedersen generator setup cannot fail");
        let node = <NodeHash as TwoToOneCRH>::setup(&mut rng)
            .expect("zkballot: Pedersen generator setup cannot fail");
        CensusParameters { leaf, node }
    }
}

/// A voter's secret key: 255 uniformly random bits in their packed form.
#[derive(Clone, PartialEq, Eq)]
pub struct VoterSecretKey(pub(crate) [u8; PACKED_KEY_BYTES]);

impl VoterSecretKey {
    pub fn as_bytes(&self) -> &[u8; PACKED_KEY_BYTES] {
        &self.0
    }
}

/// A voter's public key: the hash commitment to the secret key, doubling as
/// the voter's census-tree leaf.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VoterPublicKey(pub(crate) FieldElement);

impl VoterPublicKey {
    /// Engine-native byte form used as the Merkle leaf value.
    pub fn leaf_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(field_to_bytes(&self.0)?.to_vec())
    }

    pub fn as_field(&self) -> &FieldElement {
        &self.0
    }
}

impl std::fmt::Display for VoterPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.to_bytes() {
            Ok(bytes) => write!(f, "{}", hex::encode(bytes)),
            Err(_) => write!(f, "<unencodable public key>"),
        }
    }
}

/// Generate a voter keypair: a fresh digest-length secret bit vector and
/// its hash commitment.
pub fn generate_voter_keypair<R: RngCore + CryptoRng>(
    parameters: &CensusParameters,
    rng: &mut R,
) -> Result<(VoterSecretKey, VoterPublicKey), Error> {
    let mut bytes = [0u8; PACKED_KEY_BYTES];
    rng.fill_bytes(&mut bytes);
    // 255 significant bits; the trailing padding bit stays clear
    bytes[PACKED_KEY_BYTES - 1] &= 0xfe;
    let secret = VoterSecretKey(bytes);
    let public = voter_public_key(parameters, &secret)?;
    Ok((secret, public))
}

pub fn voter_public_key(
    parameters: &CensusParameters,
    secret: &VoterSecretKey,
) -> Result<VoterPublicKey, Error> {
    let digest = <LeafHash as CRH>::evaluate(&parameters.leaf, &secret.0)
        .map_err(|e| Error::Hash(e.to_string()))?;
    Ok(VoterPublicKey(digest))
}

/// One-time serial number for a `(session, voter)` pair:
/// `sn = Hash(eid ‖ secret_key)`.
pub fn serial_number(
    parameters: &CensusParameters,
    eid: &[bool],
    secret: &VoterSecretKey,
) -> Result<FieldElement, Error> {
    let mut preimage = pack_bits(eid);
    preimage.extend_from_slice(&secret.0);
    <LeafHash as CRH>::evaluate(&parameters.leaf, &preimage).map_err(|e| Error::Hash(e.to_string()))
}

/// The registered voter set: an immutable Merkle tree over public keys in
/// index order.
pub struct CensusTree {
    tree: MerkleTree<CensusShape>,
    root: FieldElement,
    capacity: usize,
}

impl CensusTree {
    /// Build the tree; the public-key list must exactly fill the configured
    /// capacity.
    pub fn build(
        parameters: &CensusParameters,
        config: &ElectionConfig,
        public_keys: &[VoterPublicKey],
    ) -> Result<Self, Error> {
        if public_keys.len() != config.participants() {
            return Err(Error::ParticipantCountMismatch {
                expected: config.participants(),
                actual: public_keys.len(),
            });
        }
        let mut leaves = Vec::with_capacity(public_keys.len());
        for key in public_keys {
            leaves.push(key.leaf_bytes()?);
        }
        let tree = MerkleTree::new(&parameters.leaf, &parameters.node, &leaves)
            .map_err(|e| Error::Hash(e.to_string()))?;
        let root = tree.root();
        Ok(CensusTree {
            tree,
            root,
            capacity: public_keys.len(),
        })
    }

    pub fn root(&self) -> FieldElement {
        self.root
    }

    /// Inclusion path for the voter at `index`.
    pub fn proof(&self, index: usize) -> Result<CensusPath, Error> {
        if index >= self.capacity {
            return Err(Error::IndexOutOfRange {
                index,
                capacity: self.capacity,
            });
        }
        self.tree
            .generate_proof(index)
            .map_err(|e| Error::Hash(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn test_keys(n: usize, seed: u64) -> (CensusParameters, Vec<VoterSecretKey>, Vec<VoterPublicKey>) {
        let parameters = CensusParameters::deterministic();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut secrets = Vec::new();
        let mut publics = Vec::new();
        for _ in 0..n {
            let (sk, pk) = generate_voter_keypair(&parameters, &mut rng).unwrap();
            secrets.push(sk);
            publics.push(pk);
        }
        (parameters, secrets, publics)
    }

    #[test]
    fn public_key_is_a_stable_commitment() {
        let (parameters, secrets, publics) = test_keys(2, 1);
        let recomputed = voter_public_key(&parameters, &secrets[0]).unwrap();
        assert_eq!(recomputed, publics[0]);
        assert_ne!(publics[0], publics[1]);
    }

    #[test]
    fn root_agreement_between_independent_builds() {
        let (parameters, _, publics) = test_keys(4, 2);
        let config = ElectionConfig::new(2, 64, 7).unwrap();
        let admin_tree = CensusTree::build(&parameters, &config, &publics).unwrap();
        let voter_tree = CensusTree::build(&parameters, &config, &publics).unwrap();
        assert_eq!(admin_tree.root(), voter_tree.root());
    }

    #[test]
    fn tree_build_rejects_wrong_participant_count() {
        let (parameters, _, publics) = test_keys(3, 3);
        let config = ElectionConfig::new(2, 64, 7).unwrap();
        match CensusTree::build(&parameters, &config, &publics) {
            Err(Error::ParticipantCountMismatch { expected: 4, actual: 3 }) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn serial_numbers_are_deterministic_and_separated() {
        let (parameters, secrets, _) = test_keys(2, 4);
        let eid: Vec<bool> = (0..64).map(|i| i % 3 == 0).collect();
        let eid2: Vec<bool> = (0..64).map(|i| i % 5 == 0).collect();

        let sn = serial_number(&parameters, &eid, &secrets[0]).unwrap();
        assert_eq!(sn, serial_number(&parameters, &eid, &secrets[0]).unwrap());
        assert_ne!(sn, serial_number(&parameters, &eid, &secrets[1]).unwrap());
        assert_ne!(sn, serial_number(&parameters, &eid2, &secrets[0]).unwrap());
    }

    #[test]
    fn inclusion_path_verifies_against_the_root() {
        let (parameters, _, publics) = test_keys(4, 5);
        let config = ElectionConfig::new(2, 64, 7).unwrap();
        let tree = CensusTree::build(&parameters, &config, &publics).unwrap();
        let path = tree.proof(3).unwrap();
        let ok = path
            .verify(
                &parameters.leaf,
                &parameters.node,
                &tree.root(),
                &publics[3].leaf_bytes().unwrap(),
            )
            .unwrap();
        assert!(ok);
        assert!(matches!(
            tree.proof(4),
            Err(Error::IndexOutOfRange { index: 4, capacity: 4 })
        ));
    }
}
