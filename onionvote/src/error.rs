use std::time::Duration;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("onionvote: own public key is not a participant in this voting")]
    NotAParticipant,

    #[error("onionvote: voting configuration has no voters")]
    EmptyRoster,

    #[error("onionvote: voter {0} appears more than once in the voting configuration")]
    DuplicateParticipant(usize),

    #[error("onionvote: bad ballot count in round {round}: expected {expected}, found {found}")]
    BadBatchCount {
        round: u8,
        expected: usize,
        found: usize,
    },

    #[error("onionvote: own ballot is missing from the batch after the first decryption round")]
    BallotMissing,

    #[error("onionvote: signature of voter {signer} failed to verify on ballot {entry}")]
    SignatureVerificationFailed { signer: usize, entry: usize },

    #[error("onionvote: malformed ciphertext: {0}")]
    MalformedCiphertext(&'static str),

    #[error("onionvote: ballot {entry} does not open in round {round}: {reason}")]
    MalformedBallot {
        round: u8,
        entry: usize,
        reason: &'static str,
    },

    #[error("onionvote: failed to initialise stream cipher")]
    CipherInit,

    #[error("onionvote: randomness source failure: {0}")]
    Randomness(#[from] rand::Error),

    #[error("onionvote: RSA error: {0}")]
    RSAError(#[from] rsa::errors::Error),

    #[error("onionvote: RSA key of {0} bits is too small for PSS over SHA-512")]
    KeyTooSmall(usize),

    #[error("onionvote: invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("onionvote: invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("onionvote: transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("onionvote: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("onionvote: JSON error: {0}")]
    JSON(#[from] serde_json::Error),

    #[error("onionvote: CBOR error: {0}")]
    CBOR(#[from] serde_cbor::Error),
}

/// Errors raised by the chain transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel disconnected")]
    Disconnected,

    #[error("no batch received within {0:?}")]
    Timeout(Duration),

    #[error("participant {0} is not part of this chain")]
    UnknownParticipant(usize),

    #[error("loopback mailbox already holds an undelivered batch")]
    LoopbackOccupied,
}
