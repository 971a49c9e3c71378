//! Ballot encryption stage

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use rayon::prelude::*;

use crate::artifacts::ArtifactStore;
use crate::context::PipelineContext;
use crate::error::{Result, Stage, TallyError};
use crate::plan::VotePlan;
use crate::provider::CryptoProvider;
use crate::types::{Ballot, PlannedVote, VoteChoice};

/// Ballots between progress messages
pub const PROGRESS_INTERVAL: usize = 20;

/// Encrypt, hash and persist one ballot per planned vote.
///
/// Ballots are produced in parallel on the current rayon pool and returned in
/// index order. The first failure aborts the stage; files already written for
/// other ballots stay on disk.
pub fn encrypt_ballots<P: CryptoProvider>(
    ctx: &PipelineContext<'_, P>,
    plan: &VotePlan,
    store: &ArtifactStore,
) -> Result<Vec<Ballot>> {
    let provider = ctx.provider();
    let encode = |choice: VoteChoice| {
        provider
            .encode(ctx.context(), choice.value())
            .map_err(|e| TallyError::provider(Stage::BallotEncryption, e))
    };
    let yes = encode(VoteChoice::Yes)?;
    let no = encode(VoteChoice::No)?;

    let total = plan.len();
    let done = AtomicUsize::new(0);
    info!(
        "Encrypting {} ballots ({} YES, {} NO)",
        total,
        plan.yes_votes(),
        plan.no_votes()
    );

    let ballots = plan
        .votes()
        .par_iter()
        .map(|vote| -> Result<Ballot> {
            let plaintext = match vote.choice {
                VoteChoice::Yes => &yes,
                VoteChoice::No => &no,
            };
            let ballot = encrypt_ballot(ctx, vote, plaintext)?;
            store.write(
                Stage::BallotEncryption,
                &ballot.filename,
                &ballot.serialized_ciphertext,
            )?;

            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % PROGRESS_INTERVAL == 0 {
                info!("    Processed {}/{}...", n, total);
            }
            Ok(ballot)
        })
        .collect::<Result<Vec<_>>>()?;

    info!("{} encrypted ballots generated", ballots.len());
    Ok(ballots)
}

/// Encrypt a single planned vote from its pre-encoded plaintext
pub fn encrypt_ballot<P: CryptoProvider>(
    ctx: &PipelineContext<'_, P>,
    vote: &PlannedVote,
    plaintext: &P::Plaintext,
) -> Result<Ballot> {
    let provider = ctx.provider();
    let ciphertext = provider
        .encrypt(ctx.context(), ctx.public_key(), plaintext)
        .map_err(|e| TallyError::ballot(vote.index, e))?;
    let bytes = provider
        .serialize(ctx.context(), &ciphertext)
        .map_err(|e| TallyError::ballot(vote.index, e))?;

    let ballot = Ballot::new(vote, bytes);
    debug!("{} -> {}", ballot.filename, ballot.content_hash);
    Ok(ballot)
}
