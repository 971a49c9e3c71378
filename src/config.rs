//! Simulation configuration file

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::homomorphic::Reduction;
use crate::plan::VoteConfiguration;
use crate::types::SchemeParameters;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "VOTE_CONF";

/// Configuration path used when neither flag nor environment names one
pub const DEFAULT_CONFIG_PATH: &str = "config/vote_simulation.json";

/// Default artifact directory
pub const DEFAULT_OUTPUT_DIR: &str = "fhe_artifacts";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCounts {
    pub total: u64,
    pub yes: u64,
    pub no: u64,
}

/// Contents of `vote_simulation.json`; unknown keys are ignored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub voters: VoterCounts,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub crypto: SchemeParameters,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Worker threads for ballot encryption and tally; defaults to available parallelism
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub reduction: Reduction,
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| TallyError::Configuration(format!("invalid configuration: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TallyError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Replace the voter counts with trusted command-line values.
    ///
    /// Only honoured when explicitly allowed; otherwise the override is an error.
    pub fn apply_override(&mut self, counts: Option<VoterCounts>, allowed: bool) -> Result<()> {
        match (counts, allowed) {
            (None, _) => Ok(()),
            (Some(counts), true) => {
                self.voters = counts;
                Ok(())
            }
            (Some(_), false) => Err(TallyError::Configuration(
                "voter counts on the command line require --allow-cli-args".to_string(),
            )),
        }
    }

    pub fn vote_configuration(&self) -> VoteConfiguration {
        VoteConfiguration::new(
            self.voters.total,
            self.voters.yes,
            self.voters.no,
            self.question.clone(),
        )
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }
}
