//! Verification stage: decrypt the tally and check it against the plan

use log::info;
use serde::{Deserialize, Serialize};

use crate::context::PipelineContext;
use crate::error::{ProviderError, Result, Stage, TallyError};
use crate::plan::VotePlan;
use crate::provider::CryptoProvider;

/// Decrypted outcome of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResults {
    pub yes_votes: u64,
    pub no_votes: u64,
    pub total_votes: u64,
}

/// Decrypt the tally and require it to match the planned YES/NO split
pub fn verify_tally<P: CryptoProvider>(
    ctx: &PipelineContext<'_, P>,
    tally: &P::Ciphertext,
    plan: &VotePlan,
) -> Result<TallyResults> {
    let provider = ctx.provider();
    let expected_yes = plan.yes_votes();
    let expected_no = plan.no_votes();
    let total = plan.configuration().total_voters;

    info!("Decrypting tally for verification");
    let plaintext = provider
        .decrypt(ctx.context(), ctx.secret_key(), tally)
        .map_err(|e| TallyError::provider(Stage::Verification, e))?;

    let result_yes = match provider.decode(ctx.context(), &plaintext) {
        Ok(value) => value,
        // Nothing in the plaintext range decrypts here: the tally is corrupt
        Err(ProviderError::DiscreteLog(_)) => {
            return Err(TallyError::TallyMismatch {
                expected_yes,
                expected_no,
                decrypted_yes: None,
                decrypted_no: None,
            })
        }
        Err(e) => return Err(TallyError::provider(Stage::Verification, e)),
    };

    let result_no = match total.checked_sub(result_yes) {
        Some(no) => no,
        None => {
            return Err(TallyError::TallyMismatch {
                expected_yes,
                expected_no,
                decrypted_yes: Some(result_yes),
                decrypted_no: None,
            })
        }
    };

    if result_yes != expected_yes || result_no != expected_no {
        return Err(TallyError::TallyMismatch {
            expected_yes,
            expected_no,
            decrypted_yes: Some(result_yes),
            decrypted_no: Some(result_no),
        });
    }

    info!("Verification passed: homomorphic tally is correct");
    Ok(TallyResults {
        yes_votes: result_yes,
        no_votes: result_no,
        total_votes: total,
    })
}
