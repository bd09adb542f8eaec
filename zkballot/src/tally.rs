use crate::*;

use ark_bls12_381::Bls12_381;
use ark_groth16::VerifyingKey;
use rand_core::{CryptoRng, RngCore};

/// The decrypted outcome: per-option vote counts plus a publicly checkable
/// decryption proof. Created exactly once per election.
pub struct TallyResult {
    pub counts: Vec<u64>,
    pub proof: DecryptionProof,
}

/// Aggregate all published ciphertexts, decrypt the aggregate and prove the
/// decryption. The decryption key never leaves this function's caller.
pub fn tally_votes<R: RngCore + CryptoRng>(
    config: &ElectionConfig,
    ciphertexts: &[Ciphertext],
    session_secret: &SessionSecretKey,
    session_verification: &SessionVerificationKey,
    verifying: &VerifyingKey<Bls12_381>,
    rng: &mut R,
) -> Result<TallyResult, Error> {
    let digest = crs_digest(verifying)?;
    if session_secret.crs_digest != digest || session_verification.crs_digest != digest {
        return Err(Error::KeyBindingMismatch);
    }

    let aggregate = Ciphertext::aggregate(ciphertexts)?;
    let (counts, proof) = decrypt_tally(
        rng,
        session_secret,
        session_verification,
        &aggregate,
        ciphertexts.len() as u64,
    )?;
    if counts.len() != config.options {
        return Err(Error::TallyLengthMismatch {
            expected: config.options,
            actual: counts.len(),
        });
    }
    Ok(TallyResult { counts, proof })
}

/// Independently re-aggregate the ciphertexts and check the published tally
/// against its decryption proof. Needs only public artifacts, so any
/// observer can run it; a failed check is reported, never swallowed.
pub fn verify_tally(
    config: &ElectionConfig,
    ciphertexts: &[Ciphertext],
    session_verification: &SessionVerificationKey,
    verifying: &VerifyingKey<Bls12_381>,
    counts: &[u64],
    proof: &DecryptionProof,
) -> Result<(), Error> {
    if session_verification.crs_digest != crs_digest(verifying)? {
        return Err(Error::KeyBindingMismatch);
    }
    if counts.len() != config.options {
        return Err(Error::TallyLengthMismatch {
            expected: config.options,
            actual: counts.len(),
        });
    }
    let aggregate = Ciphertext::aggregate(ciphertexts)?;
    verify_tally_decryption(session_verification, &aggregate, counts, proof)?;
    Ok(())
}
