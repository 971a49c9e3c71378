//! Core types and data structures

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_256};

/// A voter's choice on a yes/no question
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteChoice {
    Yes,
    No,
}

impl VoteChoice {
    /// Integer the choice contributes to the tally
    pub fn value(&self) -> u64 {
        match self {
            VoteChoice::Yes => 1,
            VoteChoice::No => 0,
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteChoice::Yes => write!(f, "YES"),
            VoteChoice::No => write!(f, "NO"),
        }
    }
}

/// One entry of the vote plan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedVote {
    pub index: u64,
    pub choice: VoteChoice,
}

impl PlannedVote {
    /// Artifact filename for this vote, e.g. `vote_007_YES.bin`
    pub fn filename(&self) -> String {
        ballot_filename(self.index, self.choice)
    }
}

/// Deterministic ballot filename: zero-padded index and uppercase choice
pub fn ballot_filename(index: u64, choice: VoteChoice) -> String {
    format!("vote_{:03}_{}.bin", index, choice)
}

/// SHA3-256 digest of a serialized artifact, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash the given bytes
    pub fn of(bytes: &[u8]) -> Self {
        ContentHash(Sha3_256::digest(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut out)?;
        Ok(ContentHash(out))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An encrypted ballot as persisted to disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ballot {
    pub index: u64,
    pub choice: VoteChoice,
    pub serialized_ciphertext: Vec<u8>,
    pub content_hash: ContentHash,
    pub filename: String,
    pub size_bytes: u64,
}

impl Ballot {
    /// Build a ballot from a planned vote and its serialized ciphertext
    pub fn new(vote: &PlannedVote, serialized_ciphertext: Vec<u8>) -> Self {
        Ballot {
            index: vote.index,
            choice: vote.choice,
            content_hash: ContentHash::of(&serialized_ciphertext),
            filename: vote.filename(),
            size_bytes: serialized_ciphertext.len() as u64,
            serialized_ciphertext,
        }
    }

    /// Metadata record for this ballot
    pub fn record(&self) -> BallotRecord {
        BallotRecord {
            index: self.index,
            vote: self.choice,
            filename: self.filename.clone(),
            hash: self.content_hash,
            size_bytes: self.size_bytes,
        }
    }
}

/// Per-ballot entry of `metadata.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRecord {
    pub index: u64,
    pub vote: VoteChoice,
    pub filename: String,
    pub hash: ContentHash,
    pub size_bytes: u64,
}

/// The single encrypted tally of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TallyArtifact {
    pub serialized_ciphertext: Vec<u8>,
    pub content_hash: ContentHash,
    pub size_bytes: u64,
}

impl TallyArtifact {
    pub fn new(serialized_ciphertext: Vec<u8>) -> Self {
        TallyArtifact {
            content_hash: ContentHash::of(&serialized_ciphertext),
            size_bytes: serialized_ciphertext.len() as u64,
            serialized_ciphertext,
        }
    }
}

/// Homomorphic encryption scheme backing a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    /// Exponential ElGamal: additively homomorphic over a small message space
    #[serde(rename = "ElGamal-Exp", alias = "elgamal")]
    ExponentialElGamal,
}

impl Scheme {
    /// Ring dimension for lattice schemes; group-based schemes have none
    pub fn polynomial_degree(&self) -> Option<u32> {
        match self {
            Scheme::ExponentialElGamal => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::ExponentialElGamal => write!(f, "ElGamal-Exp"),
        }
    }
}

/// Parameters handed to the provider's context setup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeParameters {
    pub scheme: Scheme,
    pub security_bits: u32,
    pub modulus_bits: u64,
    pub plaintext_modulus_bits: u32,
    /// Use a safe prime p = 2q + 1 (slow to generate, required outside tests)
    pub safe_prime: bool,
}

impl SchemeParameters {
    /// Fast 512-bit parameters without safe primes, for tests and benchmarks
    pub fn for_testing() -> Self {
        SchemeParameters {
            scheme: Scheme::ExponentialElGamal,
            security_bits: 56,
            modulus_bits: 512,
            plaintext_modulus_bits: 20,
            safe_prime: false,
        }
    }

    /// Largest integer a decrypted plaintext may hold
    pub fn max_plaintext(&self) -> u64 {
        if self.plaintext_modulus_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.plaintext_modulus_bits) - 1
        }
    }
}

impl Default for SchemeParameters {
    fn default() -> Self {
        SchemeParameters {
            scheme: Scheme::ExponentialElGamal,
            security_bits: 80,
            modulus_bits: 1024,
            plaintext_modulus_bits: 20,
            safe_prime: true,
        }
    }
}

/// Cryptographic parameters as recorded in `metadata.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoParameters {
    pub scheme: String,
    pub security_bits: u32,
    pub polynomial_degree: Option<u32>,
    pub plaintext_modulus_bits: u32,
    pub modulus_bits: u64,
}

impl From<&SchemeParameters> for CryptoParameters {
    fn from(params: &SchemeParameters) -> Self {
        CryptoParameters {
            scheme: params.scheme.to_string(),
            security_bits: params.security_bits,
            polynomial_degree: params.scheme.polynomial_degree(),
            plaintext_modulus_bits: params.plaintext_modulus_bits,
            modulus_bits: params.modulus_bits,
        }
    }
}
