//! Error types for the tally pipeline and the cryptographic backend

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TallyError>;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Failures raised by a cryptographic provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid modulus size: {0} bits (must be at least 512)")]
    InvalidKeySize(u64),

    #[error("Unsupported security level: {0} bits")]
    UnsupportedSecurityLevel(u32),

    #[error("{security_bits}-bit security needs a modulus of at least {required} bits, got {modulus_bits}")]
    InsufficientModulus {
        security_bits: u32,
        modulus_bits: u64,
        required: u64,
    },

    #[error("Plaintext {value} out of range: max is {max}")]
    PlaintextOutOfRange { value: u64, max: u64 },

    #[error("Failed to compute modular inverse")]
    ModularInverseError,

    #[error("Failed to solve discrete log: {0}")]
    DiscreteLog(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

/// Pipeline stage, carried by errors for diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Setup,
    KeyPersistence,
    BallotEncryption,
    Tally,
    Verification,
    Assembly,
    Audit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Setup => "context setup",
            Stage::KeyPersistence => "key persistence",
            Stage::BallotEncryption => "ballot encryption",
            Stage::Tally => "homomorphic tally",
            Stage::Verification => "verification",
            Stage::Assembly => "artifact assembly",
            Stage::Audit => "audit",
        };
        f.write_str(name)
    }
}

/// Errors that abort a tally run
#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error during {stage}{}: {source}", ballot_suffix(.index))]
    Provider {
        stage: Stage,
        index: Option<u64>,
        #[source]
        source: ProviderError,
    },

    #[error("IO error during {stage} at {}: {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error during {stage}: {source}")]
    Serialization {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },

    #[error("Tally mismatch: expected {expected_yes} YES / {expected_no} NO, decrypted {}", decrypted_summary(.decrypted_yes, .decrypted_no))]
    TallyMismatch {
        expected_yes: u64,
        expected_no: u64,
        decrypted_yes: Option<u64>,
        decrypted_no: Option<u64>,
    },
}

impl TallyError {
    pub(crate) fn provider(stage: Stage, source: ProviderError) -> Self {
        TallyError::Provider {
            stage,
            index: None,
            source,
        }
    }

    pub(crate) fn ballot(index: u64, source: ProviderError) -> Self {
        TallyError::Provider {
            stage: Stage::BallotEncryption,
            index: Some(index),
            source,
        }
    }

    pub(crate) fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TallyError::Io {
            stage,
            path: path.into(),
            source,
        }
    }
}

fn ballot_suffix(index: &Option<u64>) -> String {
    match index {
        Some(i) => format!(" (ballot {})", i),
        None => String::new(),
    }
}

fn decrypted_summary(yes: &Option<u64>, no: &Option<u64>) -> String {
    match (yes, no) {
        (Some(y), Some(n)) => format!("{} YES / {} NO", y, n),
        (Some(y), None) => format!("{} YES (exceeds voter count)", y),
        _ => "a value outside the plaintext range".to_string(),
    }
}
