//! Artifact and metadata assembly

use log::info;
use serde::{Deserialize, Serialize};

use crate::artifacts::{ArtifactStore, FINAL_TALLY_FILE, METADATA_FILE};
use crate::error::{Result, Stage, TallyError};
use crate::plan::VoteConfiguration;
use crate::types::{Ballot, BallotRecord, ContentHash, CryptoParameters, TallyArtifact};
use crate::verify::TallyResults;

/// Voter counts the run was executed with
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub total_voters: u64,
    pub yes_votes: u64,
    pub no_votes: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub tally_time_ms: f64,
    pub avg_time_per_vote_ms: f64,
}

/// Reference to the persisted tally ciphertext
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyReference {
    pub filename: String,
    pub hash: ContentHash,
    pub size_bytes: u64,
}

/// Contents of `metadata.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub question: String,
    pub configuration: ConfigurationSummary,
    pub results: TallyResults,
    pub performance: Performance,
    pub cryptography: CryptoParameters,
    pub final_tally: TallyReference,
    pub votes: Vec<BallotRecord>,
}

impl RunMetadata {
    pub fn new(
        configuration: &VoteConfiguration,
        results: TallyResults,
        tally_time_ms: f64,
        cryptography: CryptoParameters,
        tally: &TallyArtifact,
        ballots: &[Ballot],
    ) -> Self {
        RunMetadata {
            question: configuration.question.clone(),
            configuration: ConfigurationSummary {
                total_voters: configuration.total_voters,
                yes_votes: configuration.yes_votes,
                no_votes: configuration.no_votes,
            },
            results,
            performance: Performance {
                tally_time_ms,
                avg_time_per_vote_ms: tally_time_ms / configuration.total_voters.max(1) as f64,
            },
            cryptography,
            final_tally: TallyReference {
                filename: FINAL_TALLY_FILE.to_string(),
                hash: tally.content_hash,
                size_bytes: tally.size_bytes,
            },
            votes: ballots.iter().map(Ballot::record).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| TallyError::Serialization {
            stage: Stage::Assembly,
            source,
        })
    }

    /// Read `metadata.json` from an artifact directory
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        let bytes = store.read(Stage::Audit, METADATA_FILE)?;
        serde_json::from_slice(&bytes).map_err(|source| TallyError::Serialization {
            stage: Stage::Audit,
            source,
        })
    }
}

/// Persist the tally, then write `metadata.json` as the run's last side effect.
///
/// Callers must only invoke this after verification succeeded.
pub fn assemble(
    store: &ArtifactStore,
    configuration: &VoteConfiguration,
    results: TallyResults,
    tally_time_ms: f64,
    cryptography: CryptoParameters,
    tally: &TallyArtifact,
    ballots: &[Ballot],
) -> Result<RunMetadata> {
    store.write(Stage::Assembly, FINAL_TALLY_FILE, &tally.serialized_ciphertext)?;

    let metadata = RunMetadata::new(
        configuration,
        results,
        tally_time_ms,
        cryptography,
        tally,
        ballots,
    );
    store.write_atomic(Stage::Assembly, METADATA_FILE, metadata.to_json()?.as_bytes())?;
    info!(
        "Metadata saved in {}",
        store.path(METADATA_FILE).display()
    );

    Ok(metadata)
}
