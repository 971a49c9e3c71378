//! Offline audit of an artifact directory.
//!
//! Recomputes content hashes of every persisted ciphertext and checks them,
//! together with the layout and counts, against `metadata.json`. No key
//! material is needed, so any third party can run it.

use std::collections::HashSet;
use std::fmt;

use log::{info, warn};

use crate::artifacts::{ArtifactStore, FINAL_TALLY_FILE};
use crate::error::{Result, Stage};
use crate::metadata::RunMetadata;
use crate::types::{ballot_filename, ContentHash};

/// A single discrepancy found by the audit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Finding {
    Missing {
        filename: String,
    },
    HashMismatch {
        filename: String,
        recorded: ContentHash,
        actual: ContentHash,
    },
    SizeMismatch {
        filename: String,
        recorded: u64,
        actual: u64,
    },
    UnexpectedFilename {
        index: u64,
        recorded: String,
        expected: String,
    },
    UnexpectedTallyFilename {
        recorded: String,
    },
    IndexGap {
        position: usize,
        index: u64,
    },
    /// Ballot file on disk that `metadata.json` does not list
    Unlisted {
        filename: String,
    },
    CountMismatch(String),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Missing { filename } => write!(f, "{}: missing", filename),
            Finding::HashMismatch {
                filename,
                recorded,
                actual,
            } => write!(f, "{}: hash {} recorded, {} on disk", filename, recorded, actual),
            Finding::SizeMismatch {
                filename,
                recorded,
                actual,
            } => write!(f, "{}: {} bytes recorded, {} on disk", filename, recorded, actual),
            Finding::UnexpectedFilename {
                index,
                recorded,
                expected,
            } => write!(f, "ballot {}: filename {} should be {}", index, recorded, expected),
            Finding::UnexpectedTallyFilename { recorded } => {
                write!(f, "final tally: filename {} should be {}", recorded, FINAL_TALLY_FILE)
            }
            Finding::IndexGap { position, index } => {
                write!(f, "ballot at position {} has index {}", position, index)
            }
            Finding::Unlisted { filename } => write!(f, "{}: not listed in metadata", filename),
            Finding::CountMismatch(msg) => write!(f, "counts: {}", msg),
        }
    }
}

/// Outcome of an audit
#[derive(Clone, Debug)]
pub struct AuditReport {
    pub metadata: RunMetadata,
    pub artifacts_checked: usize,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Ballot hashes in index order, `0x`-prefixed
    pub fn ballot_hashes(&self) -> Vec<String> {
        self.metadata
            .votes
            .iter()
            .map(|v| format!("0x{}", v.hash))
            .collect()
    }
}

/// Audit the artifact directory behind `store`.
///
/// Only files named after their derived layout name are read, so a crafted
/// `metadata.json` cannot point the audit outside the directory.
pub fn audit(store: &ArtifactStore) -> Result<AuditReport> {
    let metadata = RunMetadata::load(store)?;
    let mut findings = Vec::new();
    let mut checked = 0;

    check_counts(&metadata, &mut findings);

    let mut listed = HashSet::new();
    for (position, vote) in metadata.votes.iter().enumerate() {
        if vote.index != position as u64 {
            findings.push(Finding::IndexGap {
                position,
                index: vote.index,
            });
        }

        let expected = ballot_filename(vote.index, vote.vote);
        if vote.filename != expected {
            findings.push(Finding::UnexpectedFilename {
                index: vote.index,
                recorded: vote.filename.clone(),
                expected,
            });
            continue;
        }

        check_file(store, &vote.filename, &vote.hash, vote.size_bytes, &mut findings)?;
        listed.insert(vote.filename.as_str());
        checked += 1;
    }

    let tally = &metadata.final_tally;
    if tally.filename == FINAL_TALLY_FILE {
        check_file(store, &tally.filename, &tally.hash, tally.size_bytes, &mut findings)?;
        checked += 1;
    } else {
        findings.push(Finding::UnexpectedTallyFilename {
            recorded: tally.filename.clone(),
        });
    }

    for filename in store.ballot_files(Stage::Audit)? {
        if !listed.contains(filename.as_str()) {
            findings.push(Finding::Unlisted { filename });
        }
    }

    if findings.is_empty() {
        info!("Audit clean: {} artifacts verified", checked);
    } else {
        for finding in &findings {
            warn!("{}", finding);
        }
    }

    Ok(AuditReport {
        metadata,
        artifacts_checked: checked,
        findings,
    })
}

fn check_counts(metadata: &RunMetadata, findings: &mut Vec<Finding>) {
    let results = &metadata.results;
    let config = &metadata.configuration;

    if results.yes_votes.checked_add(results.no_votes) != Some(results.total_votes) {
        findings.push(Finding::CountMismatch(format!(
            "results {} + {} != {}",
            results.yes_votes, results.no_votes, results.total_votes
        )));
    }
    if results.total_votes != config.total_voters {
        findings.push(Finding::CountMismatch(format!(
            "{} votes tallied for {} voters",
            results.total_votes, config.total_voters
        )));
    }
    if u64::try_from(metadata.votes.len()).ok() != Some(config.total_voters) {
        findings.push(Finding::CountMismatch(format!(
            "{} ballots recorded for {} voters",
            metadata.votes.len(),
            config.total_voters
        )));
    }
}

fn check_file(
    store: &ArtifactStore,
    filename: &str,
    recorded: &ContentHash,
    recorded_size: u64,
    findings: &mut Vec<Finding>,
) -> Result<()> {
    if !store.exists(filename) {
        findings.push(Finding::Missing {
            filename: filename.to_string(),
        });
        return Ok(());
    }

    let bytes = store.read(Stage::Audit, filename)?;
    let actual = ContentHash::of(&bytes);
    if actual != *recorded {
        findings.push(Finding::HashMismatch {
            filename: filename.to_string(),
            recorded: *recorded,
            actual,
        });
    }
    if bytes.len() as u64 != recorded_size {
        findings.push(Finding::SizeMismatch {
            filename: filename.to_string(),
            recorded: recorded_size,
            actual: bytes.len() as u64,
        });
    }
    Ok(())
}
