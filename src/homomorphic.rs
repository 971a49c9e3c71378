//! Homomorphic tally stage

use std::time::Instant;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::context::PipelineContext;
use crate::error::{ProviderError, ProviderResult, Result, Stage, TallyError};
use crate::provider::CryptoProvider;
use crate::types::{Ballot, TallyArtifact};

/// How the ballot ciphertexts are summed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Left fold in index order
    Sequential,
    /// Tree reduction on the rayon pool
    #[default]
    Parallel,
}

/// Output of the tally stage
#[derive(Clone, Debug)]
pub struct EncryptedTally<C> {
    pub ciphertext: C,
    pub artifact: TallyArtifact,
    pub tally_time_ms: f64,
}

/// Left fold of `ciphertexts` starting from `zero`
pub fn fold_ciphertexts<P: CryptoProvider>(
    provider: &P,
    ctx: &P::Context,
    zero: P::Ciphertext,
    ciphertexts: &[P::Ciphertext],
) -> ProviderResult<P::Ciphertext> {
    ciphertexts
        .iter()
        .try_fold(zero, |acc, ct| provider.homomorphic_add(ctx, &acc, ct))
}

/// Parallel tree reduction of `ciphertexts`, added onto `zero`.
///
/// Homomorphic addition is associative and commutative under decryption, so
/// the result decrypts to the same value as [`fold_ciphertexts`].
pub fn tree_reduce<P: CryptoProvider>(
    provider: &P,
    ctx: &P::Context,
    zero: P::Ciphertext,
    ciphertexts: &[P::Ciphertext],
) -> ProviderResult<P::Ciphertext> {
    let sum = ciphertexts
        .par_iter()
        .cloned()
        .map(Ok::<_, ProviderError>)
        .try_reduce_with(|a, b| provider.homomorphic_add(ctx, &a, &b));

    match sum {
        Some(sum) => provider.homomorphic_add(ctx, &zero, &sum?),
        None => Ok(zero),
    }
}

/// Sum all ballots into one encrypted tally.
///
/// Each ballot is parsed back from its serialized bytes, so the tally covers
/// exactly what was hashed and written to disk.
pub fn tally_ballots<P: CryptoProvider>(
    ctx: &PipelineContext<'_, P>,
    ballots: &[Ballot],
    reduction: Reduction,
) -> Result<EncryptedTally<P::Ciphertext>> {
    let provider = ctx.provider();
    info!(
        "Computing homomorphic tally over {} ballots ({:?})",
        ballots.len(),
        reduction
    );

    let ciphertexts = ballots
        .par_iter()
        .map(|ballot| {
            ctx.deserialize(&ballot.serialized_ciphertext)
                .map_err(|e| TallyError::Provider {
                    stage: Stage::Tally,
                    index: Some(ballot.index),
                    source: e,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let started = Instant::now();
    let zero = provider
        .encrypt_value(ctx.context(), ctx.public_key(), 0)
        .map_err(|e| TallyError::provider(Stage::Tally, e))?;
    let sum = match reduction {
        Reduction::Sequential => fold_ciphertexts(provider, ctx.context(), zero, &ciphertexts),
        Reduction::Parallel => tree_reduce(provider, ctx.context(), zero, &ciphertexts),
    }
    .map_err(|e| TallyError::provider(Stage::Tally, e))?;
    let tally_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!("Tally completed in {:.2} ms", tally_time_ms);

    let bytes = provider
        .serialize(ctx.context(), &sum)
        .map_err(|e| TallyError::provider(Stage::Tally, e))?;

    Ok(EncryptedTally {
        ciphertext: sum,
        artifact: TallyArtifact::new(bytes),
        tally_time_ms,
    })
}
