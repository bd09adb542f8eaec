use crate::*;

use ark_bls12_381::Bls12_381;
use ark_ff::{One, PrimeField, Zero};
use ark_groth16::{Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;

/// Binary (de)serialization of one artifact kind.
///
/// The field-level packing of cryptographic objects is delegated to the
/// engines (`ark-serialize`, `curve25519-dalek`); the codec's own framing
/// (counts, offsets, scalar packing) is big-endian fixed-field.
pub trait Marshal: Sized {
    fn to_bytes(&self) -> Result<Vec<u8>, Error>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, Error>;
}

pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.buf.len() < n {
            return Err(Error::SizeMismatch {
                expected: n,
                actual: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn u32_be(&mut self) -> Result<u32, Error> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(bytes))
    }

    /// Read a count prefix and check that exactly `count * item_len` bytes
    /// follow, before anything is allocated for them.
    pub fn counted(&mut self, item_len: usize) -> Result<usize, Error> {
        let count = self.u32_be()? as usize;
        if self.buf.len() != count * item_len {
            return Err(Error::SizeMismatch {
                expected: count * item_len,
                actual: self.buf.len(),
            });
        }
        Ok(count)
    }

    /// The whole buffer must have been consumed.
    pub fn finish(self) -> Result<(), Error> {
        if !self.buf.is_empty() {
            return Err(Error::SizeMismatch {
                expected: 0,
                actual: self.buf.len(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Field elements and bit vectors

/// Engine-native (little-endian) byte form of a field element.
pub(crate) fn field_to_bytes(x: &FieldElement) -> Result<[u8; 32], Error> {
    let mut out = Vec::with_capacity(32);
    x.serialize(&mut out)?;
    if out.len() != 32 {
        return Err(Error::SizeMismatch {
            expected: 32,
            actual: out.len(),
        });
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    Ok(buf)
}

pub(crate) fn field_to_be_bytes(x: &FieldElement) -> Result<[u8; 32], Error> {
    let mut buf = field_to_bytes(x)?;
    buf.reverse();
    Ok(buf)
}

pub(crate) fn field_from_be_bytes(bytes: &[u8]) -> Result<FieldElement, Error> {
    if bytes.len() != 32 {
        return Err(Error::SizeMismatch {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut le = bytes.to_vec();
    le.reverse();
    Ok(FieldElement::deserialize(&le[..])?)
}

/// The 255 significant bits of a digest, lowest first.
pub(crate) fn field_to_bits(x: &FieldElement) -> Result<Vec<bool>, Error> {
    let bytes = field_to_bytes(x)?;
    let mut bits = Vec::with_capacity(SECRET_KEY_BITS);
    for k in 0..SECRET_KEY_BITS {
        bits.push((bytes[k / 8] >> (k % 8)) & 1 == 1);
    }
    Ok(bits)
}

pub(crate) fn field_from_bits(bits: &[bool]) -> Result<FieldElement, Error> {
    if bits.len() != SECRET_KEY_BITS {
        return Err(Error::SizeMismatch {
            expected: SECRET_KEY_BITS,
            actual: bits.len(),
        });
    }
    let mut bytes = [0u8; 32];
    for (k, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[k / 8] |= 1 << (k % 8);
        }
    }
    Ok(FieldElement::deserialize(&bytes[..])?)
}

/// Pack a bit vector into octets, first bit into the most significant
/// position of the first octet; the tail is zero-padded. A 255-bit digest
/// therefore lands in exactly 32 octets with a cleared final padding bit.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; (bits.len() + 7) / 8];
    for (k, bit) in bits.iter().enumerate() {
        if *bit {
            out[k / 8] |= 1 << (7 - (k % 8));
        }
    }
    out
}

/// Inverse of [`pack_bits`]: read `count` bits, discarding the padding.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Result<Vec<bool>, Error> {
    let expected = (count + 7) / 8;
    if bytes.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    let mut bits = Vec::with_capacity(count);
    for k in 0..count {
        bits.push((bytes[k / 8] >> (7 - (k % 8))) & 1 == 1);
    }
    Ok(bits)
}

impl Marshal for VoterPublicKey {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(pack_bits(&field_to_bits(&self.0)?))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let bits = unpack_bits(bytes, SECRET_KEY_BITS)?;
        Ok(VoterPublicKey(field_from_bits(&bits)?))
    }
}

impl Marshal for VoterSecretKey {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(self.0.to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PACKED_KEY_BYTES {
            return Err(Error::SizeMismatch {
                expected: PACKED_KEY_BYTES,
                actual: bytes.len(),
            });
        }
        let mut packed = [0u8; PACKED_KEY_BYTES];
        packed.copy_from_slice(bytes);
        if packed[PACKED_KEY_BYTES - 1] & 1 != 0 {
            return Err(Error::Malformed("secret key padding bit is set"));
        }
        Ok(VoterSecretKey(packed))
    }
}

// ---------------------------------------------------------------------------
// Scalar vectors

/// A vector of field elements: the carrier for primary inputs, session id
/// bits, serial numbers, roots and decrypted tallies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalarVector(pub Vec<FieldElement>);

impl ScalarVector {
    pub fn single(x: FieldElement) -> Self {
        ScalarVector(vec![x])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_bits(bits: &[bool]) -> Self {
        ScalarVector(bits.iter().map(|b| FieldElement::from(*b as u64)).collect())
    }

    /// Interpret every entry as a bit; anything but 0 or 1 is malformed.
    pub fn to_bits(&self) -> Result<Vec<bool>, Error> {
        let mut bits = Vec::with_capacity(self.0.len());
        for x in &self.0 {
            if x.is_zero() {
                bits.push(false);
            } else if x.is_one() {
                bits.push(true);
            } else {
                return Err(Error::Malformed("scalar vector entry is not a bit"));
            }
        }
        Ok(bits)
    }

    pub fn from_counts(counts: &[u64]) -> Self {
        ScalarVector(counts.iter().map(|c| FieldElement::from(*c)).collect())
    }

    /// Interpret every entry as a small count.
    pub fn to_counts(&self) -> Result<Vec<u64>, Error> {
        let mut counts = Vec::with_capacity(self.0.len());
        for x in &self.0 {
            let repr = x.into_repr();
            let limbs = repr.as_ref();
            if limbs[1..].iter().any(|limb| *limb != 0) {
                return Err(Error::Malformed("tally entry does not fit in 64 bits"));
            }
            counts.push(limbs[0]);
        }
        Ok(counts)
    }
}

impl Marshal for ScalarVector {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(4 + 32 * self.0.len());
        out.extend_from_slice(&(self.0.len() as u32).to_be_bytes());
        for x in &self.0 {
            out.extend_from_slice(&field_to_be_bytes(x)?);
        }
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.counted(32)?;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(field_from_be_bytes(reader.take(32)?)?);
        }
        reader.finish()?;
        Ok(ScalarVector(elements))
    }
}

// ---------------------------------------------------------------------------
// Encryption-engine artifacts

pub(crate) fn put_scalar(out: &mut Vec<u8>, s: &Scalar) {
    let mut bytes = s.to_bytes();
    bytes.reverse();
    out.extend_from_slice(&bytes);
}

pub(crate) fn take_scalar(reader: &mut ByteReader) -> Result<Scalar, Error> {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(reader.take(32)?);
    bytes.reverse();
    Option::from(Scalar::from_canonical_bytes(bytes))
        .ok_or(Error::Malformed("non-canonical scalar"))
}

pub(crate) fn put_point(out: &mut Vec<u8>, p: &RistrettoPoint) {
    out.extend_from_slice(p.compress().as_bytes());
}

pub(crate) fn take_point(reader: &mut ByteReader) -> Result<RistrettoPoint, Error> {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(reader.take(32)?);
    CompressedRistretto(bytes)
        .decompress()
        .ok_or(Error::Malformed("invalid group element"))
}

impl Marshal for SessionPublicKey {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(32 + 4 + 32);
        put_point(&mut out, &self.point);
        out.extend_from_slice(&(self.options as u32).to_be_bytes());
        out.extend_from_slice(&self.crs_digest);
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let point = take_point(&mut reader)?;
        let options = reader.u32_be()? as usize;
        let mut crs_digest = [0u8; 32];
        crs_digest.copy_from_slice(reader.take(32)?);
        reader.finish()?;
        Ok(SessionPublicKey {
            point,
            options,
            crs_digest,
        })
    }
}

impl Marshal for SessionVerificationKey {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(32 + 4 + 32);
        put_point(&mut out, &self.point);
        out.extend_from_slice(&(self.options as u32).to_be_bytes());
        out.extend_from_slice(&self.crs_digest);
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let key = SessionPublicKey::from_bytes(bytes)?;
        Ok(SessionVerificationKey {
            point: key.point,
            options: key.options,
            crs_digest: key.crs_digest,
        })
    }
}

impl Marshal for SessionSecretKey {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(32 + 32);
        put_scalar(&mut out, &self.scalar);
        out.extend_from_slice(&self.crs_digest);
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let scalar = take_scalar(&mut reader)?;
        let mut crs_digest = [0u8; 32];
        crs_digest.copy_from_slice(reader.take(32)?);
        reader.finish()?;
        Ok(SessionSecretKey { scalar, crs_digest })
    }
}

impl Marshal for Ciphertext {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(4 + 64 * self.0.len());
        out.extend_from_slice(&(self.0.len() as u32).to_be_bytes());
        for (blinding, payload) in &self.0 {
            put_point(&mut out, blinding);
            put_point(&mut out, payload);
        }
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.counted(64)?;
        let mut pairs = Vec::with_capacity(count);
        for _ in 0..count {
            let blinding = take_point(&mut reader)?;
            let payload = take_point(&mut reader)?;
            pairs.push((blinding, payload));
        }
        reader.finish()?;
        Ok(Ciphertext(pairs))
    }
}

impl Marshal for BallotProof {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let n = self.partials.len();
        let mut out = Vec::with_capacity(4 + 32 * (3 * n + 3));
        out.extend_from_slice(&(n as u32).to_be_bytes());
        put_scalar(&mut out, &self.challenge);
        for s in self.partials.iter().chain(&self.zero_responses).chain(&self.one_responses) {
            put_scalar(&mut out, s);
        }
        put_scalar(&mut out, &self.sum_challenge);
        put_scalar(&mut out, &self.sum_response);
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let n = reader.u32_be()? as usize;
        if bytes.len() != 4 + 32 * (3 * n + 3) {
            return Err(Error::SizeMismatch {
                expected: 4 + 32 * (3 * n + 3),
                actual: bytes.len(),
            });
        }
        let challenge = take_scalar(&mut reader)?;
        let take_block = |reader: &mut ByteReader| -> Result<Vec<Scalar>, Error> {
            let mut block = Vec::with_capacity(n);
            for _ in 0..n {
                block.push(take_scalar(reader)?);
            }
            Ok(block)
        };
        let partials = take_block(&mut reader)?;
        let zero_responses = take_block(&mut reader)?;
        let one_responses = take_block(&mut reader)?;
        let sum_challenge = take_scalar(&mut reader)?;
        let sum_response = take_scalar(&mut reader)?;
        reader.finish()?;
        Ok(BallotProof {
            challenge,
            partials,
            zero_responses,
            one_responses,
            sum_challenge,
            sum_response,
        })
    }
}

impl Marshal for DecryptionProof {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(64);
        put_scalar(&mut out, &self.challenge);
        put_scalar(&mut out, &self.response);
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let challenge = take_scalar(&mut reader)?;
        let response = take_scalar(&mut reader)?;
        reader.finish()?;
        Ok(DecryptionProof { challenge, response })
    }
}

// ---------------------------------------------------------------------------
// Proof-engine artifacts

fn ark_to_bytes<T: CanonicalSerialize>(value: &T) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    value.serialize(&mut out)?;
    Ok(out)
}

fn ark_from_bytes<T: CanonicalSerialize + CanonicalDeserialize>(bytes: &[u8]) -> Result<T, Error> {
    let value = T::deserialize(bytes)?;
    let expected = value.serialized_size();
    if expected != bytes.len() {
        return Err(Error::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(value)
}

impl Marshal for ProvingKey<Bls12_381> {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        ark_to_bytes(self)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        ark_from_bytes(bytes)
    }
}

impl Marshal for VerifyingKey<Bls12_381> {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        ark_to_bytes(self)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        ark_from_bytes(bytes)
    }
}

impl Marshal for Proof<Bls12_381> {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        ark_to_bytes(self)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        ark_from_bytes(bytes)
    }
}

impl Marshal for VoteProof {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let membership = self.membership.to_bytes()?;
        let ballot = self.ballot.to_bytes()?;
        let mut out = Vec::with_capacity(4 + membership.len() + ballot.len());
        out.extend_from_slice(&(membership.len() as u32).to_be_bytes());
        out.extend_from_slice(&membership);
        out.extend_from_slice(&ballot);
        Ok(out)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let membership_len = reader.u32_be()? as usize;
        let membership = Marshal::from_bytes(reader.take(membership_len)?)?;
        let ballot_len = bytes.len() - 4 - membership_len;
        let ballot = BallotProof::from_bytes(reader.take(ballot_len)?)?;
        reader.finish()?;
        Ok(VoteProof { membership, ballot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn bit_packing_is_big_endian_within_octets() {
        let mut bits = vec![false; 8];
        bits[0] = true;
        assert_eq!(pack_bits(&bits), vec![0x80]);
        assert_eq!(unpack_bits(&[0x80], 8).unwrap(), bits);
    }

    #[test]
    fn digest_bits_round_trip_through_32_octets() {
        let parameters = CensusParameters::deterministic();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let (_, pk) = generate_voter_keypair(&parameters, &mut rng).unwrap();

        let packed = pk.to_bytes().unwrap();
        assert_eq!(packed.len(), PACKED_KEY_BYTES);
        assert_eq!(VoterPublicKey::from_bytes(&packed).unwrap(), pk);
    }

    #[test]
    fn secret_key_round_trip_rejects_bad_padding() {
        let parameters = CensusParameters::deterministic();
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let (sk, _) = generate_voter_keypair(&parameters, &mut rng).unwrap();

        let bytes = sk.to_bytes().unwrap();
        assert_eq!(VoterSecretKey::from_bytes(&bytes).unwrap(), sk);

        let mut tampered = bytes;
        tampered[PACKED_KEY_BYTES - 1] |= 1;
        assert!(VoterSecretKey::from_bytes(&tampered).is_err());
    }

    #[test]
    fn scalar_vector_round_trip() {
        let bits: Vec<bool> = (0..64).map(|i| i % 7 == 0).collect();
        let vector = ScalarVector::from_bits(&bits);
        let bytes = vector.to_bytes().unwrap();
        let back = ScalarVector::from_bytes(&bytes).unwrap();
        assert_eq!(back, vector);
        assert_eq!(back.to_bits().unwrap(), bits);
    }

    #[test]
    fn scalar_vector_counts_round_trip() {
        let counts = [0u64, 1, 3, 4];
        let vector = ScalarVector::from_counts(&counts);
        assert_eq!(vector.to_counts().unwrap(), counts.to_vec());
        assert!(vector.to_bits().is_err());
    }

    #[test]
    fn truncated_scalar_vector_is_a_size_mismatch() {
        let vector = ScalarVector::from_counts(&[1, 2]);
        let bytes = vector.to_bytes().unwrap();
        match ScalarVector::from_bytes(&bytes[..bytes.len() - 1]) {
            Err(Error::SizeMismatch { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        let mut padded = bytes;
        padded.push(0);
        assert!(ScalarVector::from_bytes(&padded).is_err());
    }
}
