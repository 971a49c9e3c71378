//! # Homomorphic Vote Tally
//!
//! Simulates an off-chain, privacy-preserving yes/no vote:
//! - Encrypts one ballot per voter under an additively homomorphic scheme
//! - Sums the ballots into a single encrypted tally without decrypting them
//! - Checks the decrypted tally against the planned votes
//! - Emits an auditable bundle: ciphertext files, SHA3-256 hashes and `metadata.json`
//!
//! The cryptography sits behind the [`CryptoProvider`] trait. The bundled
//! [`ElGamalProvider`] implements exponential ElGamal.
//!
//! ## Example
//!
//! ```rust
//! use vhe_tally::{audit, pipeline, ArtifactStore, ElGamalProvider, RunOptions, SchemeParameters, VoteConfiguration};
//!
//! let output_dir = std::env::temp_dir().join("vhe-tally-doc-example");
//! let options = RunOptions {
//!     output_dir: output_dir.clone(),
//!     params: SchemeParameters::for_testing(),
//!     reduction: Default::default(),
//!     workers: None,
//! };
//!
//! let config = VoteConfiguration::new(10, 6, 4, "Approve the proposal?");
//! let metadata = pipeline::run(&ElGamalProvider::new(), &config, &options).unwrap();
//! assert_eq!(metadata.results.yes_votes, 6);
//!
//! // Anyone can re-check the hashes without the secret key
//! let report = audit::audit(&ArtifactStore::open(&output_dir)).unwrap();
//! assert!(report.is_clean());
//! # std::fs::remove_dir_all(&output_dir).unwrap();
//! ```

pub mod artifacts;
pub mod audit;
pub mod ballot;
pub mod config;
pub mod context;
pub mod encryption;
pub mod error;
pub mod homomorphic;
pub mod keys;
pub mod metadata;
pub mod pipeline;
pub mod plan;
pub mod provider;
pub mod types;
pub mod utils;
pub mod verify;

// Re-export main types for convenience
pub use artifacts::ArtifactStore;
pub use audit::{AuditReport, Finding};
pub use config::SimulationConfig;
pub use context::PipelineContext;
pub use encryption::{Ciphertext, ElGamalContext, ElGamalProvider, Plaintext};
pub use error::{ProviderError, Result, Stage, TallyError};
pub use homomorphic::{EncryptedTally, Reduction};
pub use keys::{Group, KeyPair, PublicKey, SecretKey};
pub use metadata::RunMetadata;
pub use pipeline::RunOptions;
pub use plan::{VoteConfiguration, VotePlan};
pub use provider::CryptoProvider;
pub use types::{
    Ballot, BallotRecord, ContentHash, CryptoParameters, PlannedVote, Scheme, SchemeParameters,
    TallyArtifact, VoteChoice,
};
pub use verify::TallyResults;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
