//! Vote plan: turns voter counts into an ordered list of planned votes

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::types::{PlannedVote, VoteChoice};

/// Voter counts and question for one run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteConfiguration {
    pub total_voters: u64,
    pub yes_votes: u64,
    pub no_votes: u64,
    pub question: String,
}

impl VoteConfiguration {
    pub fn new(total_voters: u64, yes_votes: u64, no_votes: u64, question: impl Into<String>) -> Self {
        VoteConfiguration {
            total_voters,
            yes_votes,
            no_votes,
            question: question.into(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.yes_votes.checked_add(self.no_votes) == Some(self.total_voters)
    }

    /// Rescale yes/no proportionally so that they sum to `total_voters`.
    ///
    /// The YES share is rounded half-to-even and NO takes the remainder.
    pub fn reconciled(&self) -> Self {
        if self.is_consistent() {
            return self.clone();
        }

        let cast = (self.yes_votes as f64 + self.no_votes as f64).max(1.0);
        let share = self.yes_votes as f64 / cast;
        let yes_votes = ((share * self.total_voters as f64).round_ties_even() as u64)
            .min(self.total_voters);

        VoteConfiguration {
            total_voters: self.total_voters,
            yes_votes,
            no_votes: self.total_voters - yes_votes,
            question: self.question.clone(),
        }
    }
}

/// Index-ordered votes: every YES before every NO
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VotePlan {
    configuration: VoteConfiguration,
    votes: Vec<PlannedVote>,
}

impl VotePlan {
    /// Build the plan, reconciling inconsistent counts first
    pub fn build(config: &VoteConfiguration) -> Result<Self> {
        if config.total_voters < 1 {
            return Err(TallyError::Configuration(
                "total voters must be at least 1".to_string(),
            ));
        }

        let configuration = config.reconciled();
        if configuration != *config {
            warn!(
                "YES {} + NO {} != total {}; reconciled to YES {} / NO {}",
                config.yes_votes,
                config.no_votes,
                config.total_voters,
                configuration.yes_votes,
                configuration.no_votes
            );
        }

        let mut votes: Vec<PlannedVote> = Vec::new();
        usize::try_from(configuration.total_voters)
            .ok()
            .and_then(|n| votes.try_reserve_exact(n).ok())
            .ok_or_else(|| {
                TallyError::Configuration(format!(
                    "cannot plan {} voters in memory",
                    configuration.total_voters
                ))
            })?;
        votes.extend((0..configuration.total_voters).map(|index| PlannedVote {
            index,
            choice: if index < configuration.yes_votes {
                VoteChoice::Yes
            } else {
                VoteChoice::No
            },
        }));

        Ok(VotePlan {
            configuration,
            votes,
        })
    }

    /// The reconciled configuration the plan was built from
    pub fn configuration(&self) -> &VoteConfiguration {
        &self.configuration
    }

    pub fn votes(&self) -> &[PlannedVote] {
        &self.votes
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn yes_votes(&self) -> u64 {
        self.configuration.yes_votes
    }

    pub fn no_votes(&self) -> u64 {
        self.configuration.no_votes
    }
}
