use std::path::PathBuf;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("zkballot: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zkballot: required artifact {0} does not exist, make sure you created it")]
    FileMissing(PathBuf),

    #[error("zkballot: size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("zkballot: malformed artifact: {0}")]
    Malformed(&'static str),

    #[error("zkballot: {expected} participants expected for the configured tree depth, got {actual}")]
    ParticipantCountMismatch { expected: usize, actual: usize },

    #[error("zkballot: recomputed census root does not match the published root")]
    RootMismatch,

    #[error("zkballot: voter index {index} out of range for {capacity} participants")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("zkballot: decrypted tally has {actual} entries, expected {expected}")]
    TallyLengthMismatch { expected: usize, actual: usize },

    #[error("zkballot: encryption keys are bound to a different circuit key pair")]
    KeyBindingMismatch,

    #[error("zkballot: invalid configuration: {0}")]
    Config(&'static str),

    #[error("zkballot: the voting relation is unsatisfied for the assembled witness")]
    UnsatisfiedRelation,

    #[error("zkballot: aggregate count for option {0} exceeds the number of participants")]
    TallyOverflow(usize),

    #[error("zkballot: constraint synthesis failed: {0}")]
    Synthesis(#[from] ark_relations::r1cs::SynthesisError),

    #[error("zkballot: serialization error: {0}")]
    Serialization(#[from] ark_serialize::SerializationError),

    #[error("zkballot: hash evaluation failed: {0}")]
    Hash(String),

    #[error("zkballot: verification failed: {0}")]
    Verification(#[from] VerificationError),
}

/// Proof verification errors
///
/// Reported by the consuming party instead of aborting the process; the
/// producing party treats any of these in a self-check as fatal.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("zkballot verification: membership proof does not verify")]
    MembershipProofFailed,

    #[error("zkballot verification: ballot validity proof does not verify")]
    BallotProofFailed,

    #[error("zkballot verification: decryption proof does not verify")]
    DecryptionProofFailed,

    #[error("zkballot verification: published session id differs between artifacts")]
    SessionMismatch,

    #[error("zkballot verification: published census root differs between artifacts")]
    RootMismatch,

    #[error("zkballot verification: duplicate serial number for voters {0} and {1}")]
    DuplicateSerialNumber(usize, usize),

    #[error("zkballot verification: primary input has the wrong shape")]
    PrimaryInputShape,
}
