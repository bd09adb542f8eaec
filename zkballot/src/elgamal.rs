//! Verifiable additively-homomorphic ElGamal over Ristretto.
//!
//! Ballots are vectors of exponential-ElGamal ciphertexts, one per option.
//! Ballot validity (every coordinate encrypts 0 or 1, and the coordinates
//! sum to 1) is proven with an OR-composition of Chaum–Pedersen proofs plus
//! a log-equality proof over the coordinate sum; decryption of an aggregate
//! is proven correct with a batched Chaum–Pedersen proof. All challenges are
//! derived through a `merlin` transcript bound to the encryption key, the
//! circuit CRS digest and the vote's exported public input.

use crate::*;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};

/// Election encryption key, published to voters. Bound to the circuit CRS
/// through a digest so that ballots cannot be moved between elections.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SessionPublicKey {
    pub(crate) point: RistrettoPoint,
    pub options: usize,
    pub crs_digest: [u8; 32],
}

/// Tally authority's decryption key; never leaves the tally component.
#[derive(Clone)]
pub struct SessionSecretKey {
    pub(crate) scalar: Scalar,
    pub crs_digest: [u8; 32],
}

/// Key against which anyone can check encryption and decryption proofs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SessionVerificationKey {
    pub(crate) point: RistrettoPoint,
    pub options: usize,
    pub crs_digest: [u8; 32],
}

pub fn generate_session_keys<R: RngCore + CryptoRng>(
    rng: &mut R,
    crs_digest: [u8; 32],
    options: usize,
) -> (SessionPublicKey, SessionSecretKey, SessionVerificationKey) {
    let scalar = Scalar::random(rng);
    let point = scalar * RISTRETTO_BASEPOINT_POINT;
    (
        SessionPublicKey {
            point,
            options,
            crs_digest,
        },
        SessionSecretKey { scalar, crs_digest },
        SessionVerificationKey {
            point,
            options,
            crs_digest,
        },
    )
}

/// A ballot ciphertext: per option, `(r·G, r·K + m·G)` with `m ∈ {0, 1}`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Ciphertext(pub(crate) Vec<(RistrettoPoint, RistrettoPoint)>);

impl Ciphertext {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pointwise group sum; commutative and associative, so the order of
    /// the inputs cannot affect the result.
    pub fn aggregate(ciphertexts: &[Ciphertext]) -> Result<Ciphertext, Error> {
        let first = ciphertexts
            .first()
            .ok_or(Error::Malformed("no ciphertexts to aggregate"))?;
        let mut sum = first.0.clone();
        for ct in &ciphertexts[1..] {
            if ct.0.len() != sum.len() {
                return Err(Error::SizeMismatch {
                    expected: sum.len(),
                    actual: ct.0.len(),
                });
            }
            for (acc, term) in sum.iter_mut().zip(&ct.0) {
                acc.0 += term.0;
                acc.1 += term.1;
            }
        }
        Ok(Ciphertext(sum))
    }
}

/// The voter-held encryption witness: per-coordinate randomness and the
/// chosen option. Needed to prove validity and to rerandomize; discarded
/// once the vote artifact is assembled.
#[derive(Clone)]
pub struct BallotOpening {
    pub(crate) randomness: Vec<Scalar>,
    pub(crate) choice: usize,
}

/// Ballot-validity proof: an OR-proof per coordinate plus a sum proof.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BallotProof {
    pub(crate) challenge: Scalar,
    pub(crate) partials: Vec<Scalar>,
    pub(crate) zero_responses: Vec<Scalar>,
    pub(crate) one_responses: Vec<Scalar>,
    pub(crate) sum_challenge: Scalar,
    pub(crate) sum_response: Scalar,
}

/// Proof that a published tally is the decryption of the aggregate.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DecryptionProof {
    pub(crate) challenge: Scalar,
    pub(crate) response: Scalar,
}

fn append_point(transcript: &mut Transcript, label: &'static [u8], point: &RistrettoPoint) {
    transcript.append_message(label, point.compress().as_bytes());
}

fn challenge_scalar(transcript: &mut Transcript, label: &'static [u8]) -> Scalar {
    let mut buf = [0u8; 64];
    transcript.challenge_bytes(label, &mut buf);
    Scalar::from_bytes_mod_order_wide(&buf)
}

fn ballot_transcript(
    key: &SessionPublicKey,
    ciphertext: &Ciphertext,
    public_input: &[u8],
) -> Transcript {
    let mut transcript = Transcript::new(b"zkballot.ballot_validity");
    append_point(&mut transcript, b"pk", &key.point);
    transcript.append_message(b"crs", &key.crs_digest);
    transcript.append_u64(b"options", key.options as u64);
    transcript.append_message(b"public_input", public_input);
    for (blinding, payload) in &ciphertext.0 {
        append_point(&mut transcript, b"c1", blinding);
        append_point(&mut transcript, b"c2", payload);
    }
    transcript
}

/// Encrypt a one-hot ballot for `choice` under the election key.
pub fn encrypt_ballot<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &SessionPublicKey,
    choice: usize,
) -> Result<(Ciphertext, BallotOpening), Error> {
    if choice >= key.options {
        return Err(Error::IndexOutOfRange {
            index: choice,
            capacity: key.options,
        });
    }
    let g = RISTRETTO_BASEPOINT_POINT;
    let mut pairs = Vec::with_capacity(key.options);
    let mut randomness = Vec::with_capacity(key.options);
    for i in 0..key.options {
        let r = Scalar::random(rng);
        let blinding = r * g;
        let mut payload = r * key.point;
        if i == choice {
            payload += g;
        }
        pairs.push((blinding, payload));
        randomness.push(r);
    }
    Ok((Ciphertext(pairs), BallotOpening { randomness, choice }))
}

/// Prove that the ciphertext encrypts a well-formed one-hot ballot, bound
/// to `public_input`.
pub fn prove_ballot<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &SessionPublicKey,
    ciphertext: &Ciphertext,
    opening: &BallotOpening,
    public_input: &[u8],
) -> Result<BallotProof, Error> {
    let n = key.options;
    if ciphertext.0.len() != n || opening.randomness.len() != n || opening.choice >= n {
        return Err(Error::Malformed("ballot opening does not match ciphertext"));
    }
    let g = RISTRETTO_BASEPOINT_POINT;
    let k = key.point;

    let mut transcript = ballot_transcript(key, ciphertext, public_input);

    let mut nonces = Vec::with_capacity(n);
    let mut simulated = vec![Scalar::ZERO; n];
    let mut partials = vec![Scalar::ZERO; n];
    let mut zero_responses = vec![Scalar::ZERO; n];
    let mut one_responses = vec![Scalar::ZERO; n];

    for (i, (blinding, payload)) in ciphertext.0.iter().enumerate() {
        let nonce = Scalar::random(rng);
        let (commitments, faked) = if i == opening.choice {
            // simulate the "encrypts 0" branch, answer the "encrypts 1"
            // branch honestly
            let c0 = Scalar::random(rng);
            let z0 = Scalar::random(rng);
            let a0 = z0 * g - c0 * blinding;
            let b0 = z0 * k - c0 * payload;
            partials[i] = c0;
            zero_responses[i] = z0;
            ((a0, b0, nonce * g, nonce * k), Scalar::ZERO)
        } else {
            let c1 = Scalar::random(rng);
            let z1 = Scalar::random(rng);
            let a1 = z1 * g - c1 * blinding;
            let b1 = z1 * k - c1 * (payload - g);
            one_responses[i] = z1;
            ((nonce * g, nonce * k, a1, b1), c1)
        };
        simulated[i] = faked;
        nonces.push(nonce);
        append_point(&mut transcript, b"a0", &commitments.0);
        append_point(&mut transcript, b"b0", &commitments.1);
        append_point(&mut transcript, b"a1", &commitments.2);
        append_point(&mut transcript, b"b1", &commitments.3);
    }

    let challenge = challenge_scalar(&mut transcript, b"c");
    for i in 0..n {
        let r = opening.randomness[i];
        if i == opening.choice {
            let c1 = challenge - partials[i];
            one_responses[i] = nonces[i] + c1 * r;
        } else {
            let c0 = challenge - simulated[i];
            partials[i] = c0;
            zero_responses[i] = nonces[i] + c0 * r;
        }
    }

    // the coordinates sum to exactly one ballot
    let total: Scalar = opening.randomness.iter().sum();
    let sum_nonce = Scalar::random(rng);
    append_point(&mut transcript, b"as", &(sum_nonce * g));
    append_point(&mut transcript, b"bs", &(sum_nonce * k));
    let sum_challenge = challenge_scalar(&mut transcript, b"cs");
    let sum_response = sum_nonce + sum_challenge * total;

    Ok(BallotProof {
        challenge,
        partials,
        zero_responses,
        one_responses,
        sum_challenge,
        sum_response,
    })
}

/// Check a ballot-validity proof against the election key and the vote's
/// exported public input.
pub fn verify_ballot(
    key: &SessionPublicKey,
    ciphertext: &Ciphertext,
    proof: &BallotProof,
    public_input: &[u8],
) -> Result<(), VerificationError> {
    let n = key.options;
    if ciphertext.0.len() != n
        || proof.partials.len() != n
        || proof.zero_responses.len() != n
        || proof.one_responses.len() != n
    {
        return Err(VerificationError::BallotProofFailed);
    }
    let g = RISTRETTO_BASEPOINT_POINT;
    let k = key.point;

    let mut transcript = ballot_transcript(key, ciphertext, public_input);
    for (i, (blinding, payload)) in ciphertext.0.iter().enumerate() {
        let c0 = proof.partials[i];
        let c1 = proof.challenge - c0;
        let z0 = proof.zero_responses[i];
        let z1 = proof.one_responses[i];
        append_point(&mut transcript, b"a0", &(z0 * g - c0 * blinding));
        append_point(&mut transcript, b"b0", &(z0 * k - c0 * payload));
        append_point(&mut transcript, b"a1", &(z1 * g - c1 * blinding));
        append_point(&mut transcript, b"b1", &(z1 * k - c1 * (payload - g)));
    }
    if challenge_scalar(&mut transcript, b"c") != proof.challenge {
        return Err(VerificationError::BallotProofFailed);
    }

    let sum_blinding: RistrettoPoint = ciphertext.0.iter().map(|(c1, _)| c1).sum();
    let sum_payload = ciphertext.0.iter().map(|(_, c2)| c2).sum::<RistrettoPoint>() - g;
    let cs = proof.sum_challenge;
    let zs = proof.sum_response;
    append_point(&mut transcript, b"as", &(zs * g - cs * sum_blinding));
    append_point(&mut transcript, b"bs", &(zs * k - cs * sum_payload));
    if challenge_scalar(&mut transcript, b"cs") != proof.sum_challenge {
        return Err(VerificationError::BallotProofFailed);
    }
    Ok(())
}

/// Re-blind every coordinate with fresh randomness and re-prove validity,
/// producing an artifact unlinkable to the one made at encryption time.
/// The result stays valid under the same keys and public input.
pub fn rerandomize_ballot<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &SessionPublicKey,
    ciphertext: &Ciphertext,
    opening: &BallotOpening,
    public_input: &[u8],
) -> Result<(Ciphertext, BallotOpening, BallotProof), Error> {
    if ciphertext.0.len() != opening.randomness.len() {
        return Err(Error::Malformed("ballot opening does not match ciphertext"));
    }
    let g = RISTRETTO_BASEPOINT_POINT;
    let mut pairs = Vec::with_capacity(ciphertext.0.len());
    let mut randomness = Vec::with_capacity(ciphertext.0.len());
    for ((blinding, payload), r) in ciphertext.0.iter().zip(&opening.randomness) {
        let delta = Scalar::random(rng);
        pairs.push((blinding + delta * g, payload + delta * key.point));
        randomness.push(r + delta);
    }
    let fresh = Ciphertext(pairs);
    let opening = BallotOpening {
        randomness,
        choice: opening.choice,
    };
    let proof = prove_ballot(rng, key, &fresh, &opening, public_input)?;
    Ok((fresh, opening, proof))
}

fn decryption_transcript(
    key: &SessionVerificationKey,
    aggregate: &Ciphertext,
    counts: &[u64],
) -> Transcript {
    let mut transcript = Transcript::new(b"zkballot.tally_decryption");
    append_point(&mut transcript, b"vk", &key.point);
    transcript.append_message(b"crs", &key.crs_digest);
    for (blinding, payload) in &aggregate.0 {
        append_point(&mut transcript, b"c1", blinding);
        append_point(&mut transcript, b"c2", payload);
    }
    for count in counts {
        transcript.append_u64(b"count", *count);
    }
    transcript
}

/// Decrypt an aggregate ciphertext into per-option counts and prove the
/// decryption correct. Counts are recovered by discrete-log lookup over
/// `0..=max_count`, so `max_count` must bound the number of aggregated
/// ballots.
pub fn decrypt_tally<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret: &SessionSecretKey,
    verification: &SessionVerificationKey,
    aggregate: &Ciphertext,
    max_count: u64,
) -> Result<(Vec<u64>, DecryptionProof), Error> {
    let g = RISTRETTO_BASEPOINT_POINT;
    let mut counts = Vec::with_capacity(aggregate.0.len());
    for (i, (blinding, payload)) in aggregate.0.iter().enumerate() {
        let target = payload - secret.scalar * blinding;
        let mut acc = RistrettoPoint::identity();
        let mut found = None;
        for t in 0..=max_count {
            if acc == target {
                found = Some(t);
                break;
            }
            acc += g;
        }
        counts.push(found.ok_or(Error::TallyOverflow(i))?);
    }

    let mut transcript = decryption_transcript(verification, aggregate, &counts);
    let nonce = Scalar::random(rng);
    append_point(&mut transcript, b"a", &(nonce * g));
    for (blinding, _) in &aggregate.0 {
        append_point(&mut transcript, b"b", &(nonce * blinding));
    }
    let challenge = challenge_scalar(&mut transcript, b"c");
    let response = nonce + challenge * secret.scalar;

    Ok((counts, DecryptionProof { challenge, response }))
}

/// Check a claimed tally against the aggregate and its decryption proof.
/// Requires no secret material.
pub fn verify_tally_decryption(
    verification: &SessionVerificationKey,
    aggregate: &Ciphertext,
    counts: &[u64],
    proof: &DecryptionProof,
) -> Result<(), VerificationError> {
    if counts.len() != aggregate.0.len() {
        return Err(VerificationError::DecryptionProofFailed);
    }
    let g = RISTRETTO_BASEPOINT_POINT;
    let c = proof.challenge;
    let z = proof.response;

    let mut transcript = decryption_transcript(verification, aggregate, counts);
    append_point(&mut transcript, b"a", &(z * g - c * verification.point));
    for ((blinding, payload), count) in aggregate.0.iter().zip(counts) {
        let decrypted = payload - Scalar::from(*count) * g;
        append_point(&mut transcript, b"b", &(z * blinding - c * decrypted));
    }
    if challenge_scalar(&mut transcript, b"c") != proof.challenge {
        return Err(VerificationError::DecryptionProofFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    const OPTIONS: usize = 7;

    fn session(seed: u64) -> (ChaCha20Rng, SessionPublicKey, SessionSecretKey, SessionVerificationKey) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (pk, sk, vk) = generate_session_keys(&mut rng, [7u8; 32], OPTIONS);
        (rng, pk, sk, vk)
    }

    #[test]
    fn tally_counts_one_hot_ballots() {
        let (mut rng, pk, sk, vk) = session(21);
        let choices = [2usize, 2, 5, 0];
        let mut cts = Vec::new();
        for &choice in &choices {
            let (ct, _) = encrypt_ballot(&mut rng, &pk, choice).unwrap();
            cts.push(ct);
        }

        let aggregate = Ciphertext::aggregate(&cts).unwrap();
        let (counts, proof) = decrypt_tally(&mut rng, &sk, &vk, &aggregate, 4).unwrap();
        assert_eq!(counts, vec![1, 0, 2, 0, 0, 1, 0]);
        verify_tally_decryption(&vk, &aggregate, &counts, &proof).unwrap();
    }

    #[test]
    fn aggregation_is_order_independent() {
        let (mut rng, pk, _, _) = session(22);
        let cts: Vec<_> = [0usize, 3, 6, 3]
            .iter()
            .map(|&c| encrypt_ballot(&mut rng, &pk, c).unwrap().0)
            .collect();
        let permuted: Vec<_> = [3usize, 0, 1, 2].iter().map(|&i| cts[i].clone()).collect();
        assert_eq!(
            Ciphertext::aggregate(&cts).unwrap(),
            Ciphertext::aggregate(&permuted).unwrap()
        );
    }

    #[test]
    fn aggregation_rejects_mismatched_widths() {
        let (mut rng, pk, _, _) = session(23);
        let (ct, _) = encrypt_ballot(&mut rng, &pk, 1).unwrap();
        let narrow = Ciphertext(ct.0[..OPTIONS - 1].to_vec());
        assert!(matches!(
            Ciphertext::aggregate(&[ct, narrow]),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn decryption_proof_rejects_mutated_counts() {
        let (mut rng, pk, sk, vk) = session(24);
        let cts: Vec<_> = [1usize, 4, 4]
            .iter()
            .map(|&c| encrypt_ballot(&mut rng, &pk, c).unwrap().0)
            .collect();
        let aggregate = Ciphertext::aggregate(&cts).unwrap();
        let (counts, proof) = decrypt_tally(&mut rng, &sk, &vk, &aggregate, 3).unwrap();

        for i in 0..counts.len() {
            let mut mutated = counts.clone();
            mutated[i] += 1;
            assert!(verify_tally_decryption(&vk, &aggregate, &mutated, &proof).is_err());
        }
        verify_tally_decryption(&vk, &aggregate, &counts, &proof).unwrap();
    }

    #[test]
    fn rerandomization_preserves_validity_and_plaintext() {
        let (mut rng, pk, sk, vk) = session(25);
        let binding = b"public input bytes";
        let (ct, opening) = encrypt_ballot(&mut rng, &pk, 5).unwrap();
        let proof = prove_ballot(&mut rng, &pk, &ct, &opening, binding).unwrap();
        verify_ballot(&pk, &ct, &proof, binding).unwrap();

        let (fresh, _, fresh_proof) =
            rerandomize_ballot(&mut rng, &pk, &ct, &opening, binding).unwrap();
        assert_ne!(fresh, ct);
        verify_ballot(&pk, &fresh, &fresh_proof, binding).unwrap();
        // the old proof must not transfer to the rerandomized ciphertext
        assert!(verify_ballot(&pk, &fresh, &proof, binding).is_err());

        let (counts, _) = decrypt_tally(&mut rng, &sk, &vk, &fresh, 1).unwrap();
        assert_eq!(counts, vec![0, 0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn ballot_proof_is_bound_to_the_public_input() {
        let (mut rng, pk, _, _) = session(26);
        let (ct, opening) = encrypt_ballot(&mut rng, &pk, 0).unwrap();
        let proof = prove_ballot(&mut rng, &pk, &ct, &opening, b"input A").unwrap();
        verify_ballot(&pk, &ct, &proof, b"input A").unwrap();
        assert!(verify_ballot(&pk, &ct, &proof, b"input B").is_err());
    }
}
