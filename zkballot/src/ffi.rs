//! Cross-boundary byte-buffer interface for mobile and embedded callers.
//!
//! Ownership contract: input buffers are borrowed from the caller for the
//! duration of the call; output buffers are allocated by the callee and
//! ownership transfers to the caller at the moment the call returns, who
//! must release each one through [`zkballot_buffer_free`]. No buffer is
//! ever owned by both sides.

use crate::*;

use rand::rngs::OsRng;
use rand_core::RngCore;
use std::slice;

pub const ZKBALLOT_OK: i32 = 0;
pub const ZKBALLOT_ERR_ARGUMENT: i32 = -1;
pub const ZKBALLOT_ERR_PROTOCOL: i32 = -2;

/// An owned, length-checked byte sequence crossing the boundary.
#[repr(C)]
pub struct ByteBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl ByteBuffer {
    fn from_vec(bytes: Vec<u8>) -> ByteBuffer {
        let mut boxed = bytes.into_boxed_slice();
        let data = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        ByteBuffer { data, len }
    }
}

unsafe fn view<'a>(buffer: *const ByteBuffer) -> Option<&'a [u8]> {
    if buffer.is_null() {
        return None;
    }
    let buffer = &*buffer;
    if buffer.data.is_null() {
        return None;
    }
    Some(slice::from_raw_parts(buffer.data, buffer.len))
}

unsafe fn emit(out: *mut ByteBuffer, bytes: Vec<u8>) -> bool {
    if out.is_null() {
        return false;
    }
    *out = ByteBuffer::from_vec(bytes);
    true
}

unsafe fn view_many<'a>(
    buffers: *const ByteBuffer,
    count: usize,
) -> Option<Vec<&'a [u8]>> {
    if buffers.is_null() {
        return None;
    }
    let buffers = slice::from_raw_parts(buffers, count);
    let mut views = Vec::with_capacity(count);
    for buffer in buffers {
        if buffer.data.is_null() {
            return None;
        }
        views.push(slice::from_raw_parts(buffer.data, buffer.len));
    }
    Some(views)
}

/// Release a buffer previously returned by this interface.
#[no_mangle]
pub unsafe extern "C" fn zkballot_buffer_free(buffer: ByteBuffer) {
    if !buffer.data.is_null() {
        drop(Box::from_raw(slice::from_raw_parts_mut(
            buffer.data,
            buffer.len,
        )));
    }
}

/// Generate a voter keypair. Outputs: packed public key and secret key.
#[no_mangle]
pub unsafe extern "C" fn zkballot_generate_voter_keypair(
    public_key_out: *mut ByteBuffer,
    secret_key_out: *mut ByteBuffer,
) -> i32 {
    if public_key_out.is_null() || secret_key_out.is_null() {
        return ZKBALLOT_ERR_ARGUMENT;
    }
    let parameters = CensusParameters::deterministic();
    let result = generate_voter_keypair(&parameters, &mut OsRng)
        .and_then(|(secret, public)| Ok((public.to_bytes()?, secret.to_bytes()?)));
    match result {
        Ok((public, secret)) => {
            emit(public_key_out, public);
            emit(secret_key_out, secret);
            ZKBALLOT_OK
        }
        Err(_) => ZKBALLOT_ERR_PROTOCOL,
    }
}

/// Initialize an election over the full packed public-key list. Outputs:
/// circuit proving and verification keys, the three session keys, the
/// session id and the census root, in their marshalled forms.
#[no_mangle]
pub unsafe extern "C" fn zkballot_init_election(
    tree_depth: usize,
    eid_bits: usize,
    public_keys: *const ByteBuffer,
    public_key_count: usize,
    proving_key_out: *mut ByteBuffer,
    verification_key_out: *mut ByteBuffer,
    session_public_key_out: *mut ByteBuffer,
    session_secret_key_out: *mut ByteBuffer,
    session_verification_key_out: *mut ByteBuffer,
    eid_out: *mut ByteBuffer,
    rt_out: *mut ByteBuffer,
) -> i32 {
    let outs = [
        proving_key_out,
        verification_key_out,
        session_public_key_out,
        session_secret_key_out,
        session_verification_key_out,
        eid_out,
        rt_out,
    ];
    if outs.iter().any(|out| out.is_null()) {
        return ZKBALLOT_ERR_ARGUMENT;
    }
    let key_blobs = match view_many(public_keys, public_key_count) {
        Some(blobs) => blobs,
        None => return ZKBALLOT_ERR_ARGUMENT,
    };

    let result = (|| -> Result<[Vec<u8>; 7], Error> {
        let config = ElectionConfig::new(tree_depth, eid_bits, DEFAULT_OPTIONS)?;
        let mut keys = Vec::with_capacity(key_blobs.len());
        for blob in &key_blobs {
            keys.push(VoterPublicKey::from_bytes(blob)?);
        }
        let parameters = CensusParameters::deterministic();
        let artifacts = initialize_election(&config, &parameters, &keys, &mut OsRng)?;
        Ok([
            artifacts.circuit.proving.to_bytes()?,
            artifacts.circuit.verifying.to_bytes()?,
            artifacts.session_public.to_bytes()?,
            artifacts.session_secret.to_bytes()?,
            artifacts.session_verification.to_bytes()?,
            ScalarVector::from_bits(&artifacts.eid).to_bytes()?,
            ScalarVector::single(artifacts.root).to_bytes()?,
        ])
    })();

    match result {
        Ok(blobs) => {
            for (out, blob) in outs.iter().zip(blobs.iter()) {
                emit(*out, blob.clone());
            }
            ZKBALLOT_OK
        }
        Err(_) => ZKBALLOT_ERR_PROTOCOL,
    }
}

/// Cast a ballot for a random option, exactly as the reference deployment
/// does. Outputs: the vote proof, the exported primary input, the
/// ciphertext and the serial number.
#[no_mangle]
pub unsafe extern "C" fn zkballot_cast_vote(
    tree_depth: usize,
    voter_index: usize,
    public_keys: *const ByteBuffer,
    public_key_count: usize,
    rt: *const ByteBuffer,
    eid: *const ByteBuffer,
    secret_key: *const ByteBuffer,
    session_public_key: *const ByteBuffer,
    proving_key: *const ByteBuffer,
    verification_key: *const ByteBuffer,
    proof_out: *mut ByteBuffer,
    primary_input_out: *mut ByteBuffer,
    ciphertext_out: *mut ByteBuffer,
    serial_number_out: *mut ByteBuffer,
) -> i32 {
    let outs = [proof_out, primary_input_out, ciphertext_out, serial_number_out];
    if outs.iter().any(|out| out.is_null()) {
        return ZKBALLOT_ERR_ARGUMENT;
    }
    let key_blobs = match view_many(public_keys, public_key_count) {
        Some(blobs) => blobs,
        None => return ZKBALLOT_ERR_ARGUMENT,
    };
    let inputs = match (
        view(rt),
        view(eid),
        view(secret_key),
        view(session_public_key),
        view(proving_key),
        view(verification_key),
    ) {
        (Some(rt), Some(eid), Some(sk), Some(pk_eid), Some(pk_crs), Some(vk_crs)) => {
            (rt, eid, sk, pk_eid, pk_crs, vk_crs)
        }
        _ => return ZKBALLOT_ERR_ARGUMENT,
    };
    let (rt_blob, eid_blob, sk_blob, pk_eid_blob, pk_crs_blob, vk_crs_blob) = inputs;

    let result = (|| -> Result<[Vec<u8>; 4], Error> {
        let root_vector = ScalarVector::from_bytes(rt_blob)?;
        if root_vector.len() != 1 {
            return Err(Error::SizeMismatch {
                expected: 1,
                actual: root_vector.len(),
            });
        }
        let eid = ScalarVector::from_bytes(eid_blob)?.to_bits()?;
        let session_public = SessionPublicKey::from_bytes(pk_eid_blob)?;
        let config = ElectionConfig::new(tree_depth, eid.len(), session_public.options)?;

        let mut keys = Vec::with_capacity(key_blobs.len());
        for blob in &key_blobs {
            keys.push(VoterPublicKey::from_bytes(blob)?);
        }
        let secret = VoterSecretKey::from_bytes(sk_blob)?;
        let election = ElectionPublic {
            eid,
            root: root_vector.0[0],
            session_public,
            proving: Marshal::from_bytes(pk_crs_blob)?,
            verifying: Marshal::from_bytes(vk_crs_blob)?,
        };

        let parameters = CensusParameters::deterministic();
        let mut rng = OsRng;
        let choice = rng.next_u32() as usize % config.options;
        let vote = cast_vote(
            &config,
            &parameters,
            voter_index,
            &secret,
            &keys,
            &election,
            choice,
            &mut rng,
        )?;
        Ok([
            vote.proof.to_bytes()?,
            vote.primary_input.to_bytes()?,
            vote.ciphertext.to_bytes()?,
            ScalarVector::single(vote.serial_number).to_bytes()?,
        ])
    })();

    match result {
        Ok(blobs) => {
            for (out, blob) in outs.iter().zip(blobs.iter()) {
                emit(*out, blob.clone());
            }
            ZKBALLOT_OK
        }
        Err(_) => ZKBALLOT_ERR_PROTOCOL,
    }
}
