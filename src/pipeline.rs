//! End-to-end tally run: plan, encrypt, tally, verify, assemble

use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, info};

use crate::artifacts::{ArtifactStore, FINAL_TALLY_FILE, METADATA_FILE, METADATA_TMP_FILE};
use crate::ballot::encrypt_ballots;
use crate::config::SimulationConfig;
use crate::context::PipelineContext;
use crate::error::{Result, Stage, TallyError};
use crate::homomorphic::{tally_ballots, Reduction};
use crate::metadata::{assemble, RunMetadata};
use crate::plan::{VoteConfiguration, VotePlan};
use crate::provider::CryptoProvider;
use crate::types::SchemeParameters;
use crate::verify::verify_tally;

/// Knobs for a run that are not part of the vote itself
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub params: SchemeParameters,
    pub reduction: Reduction,
    /// Worker threads; `None` uses available parallelism
    pub workers: Option<usize>,
}

impl From<&SimulationConfig> for RunOptions {
    fn from(config: &SimulationConfig) -> Self {
        RunOptions {
            output_dir: config.output_dir(),
            params: config.crypto.clone(),
            reduction: config.reduction,
            workers: config.workers,
        }
    }
}

/// Execute one complete run against `provider`.
///
/// The output directory is locked for the duration of the run. On success the
/// written metadata is returned; on any failure no `metadata.json` exists
/// afterwards, although ballot files may.
pub fn run<P: CryptoProvider>(
    provider: &P,
    config: &VoteConfiguration,
    options: &RunOptions,
) -> Result<RunMetadata> {
    // Reconciliation keeps the total, so the raw count bounds the plan size
    let max = options.params.max_plaintext();
    if config.total_voters > max {
        return Err(TallyError::Configuration(format!(
            "{} voters exceed the {}-bit plaintext space (max {})",
            config.total_voters, options.params.plaintext_modulus_bits, max
        )));
    }
    let plan = VotePlan::build(config)?;

    let store = ArtifactStore::create(&options.output_dir)?;
    let _lock = store.lock()?;
    clear_previous_outputs(&store)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.unwrap_or(0))
        .build()
        .map_err(|e| TallyError::Configuration(format!("cannot start worker pool: {}", e)))?;

    pool.install(|| execute(provider, &plan, options, &store))
}

fn execute<P: CryptoProvider>(
    provider: &P,
    plan: &VotePlan,
    options: &RunOptions,
    store: &ArtifactStore,
) -> Result<RunMetadata> {
    log_banner(plan.configuration());

    let ctx = PipelineContext::setup(provider, &options.params)?;
    ctx.persist_keys(store)?;

    let ballots = encrypt_ballots(&ctx, plan, store)?;
    let tally = tally_ballots(&ctx, &ballots, options.reduction)?;
    let results = verify_tally(&ctx, &tally.ciphertext, plan)?;

    let metadata = assemble(
        store,
        plan.configuration(),
        results,
        tally.tally_time_ms,
        ctx.parameters(),
        &tally.artifact,
        &ballots,
    )?;

    log_results(&metadata);
    info!("All artifacts generated in {}", store.dir().display());
    Ok(metadata)
}

/// Remove ballots, tally and metadata left by a previous run, so the
/// directory only ever holds artifacts of the current one
fn clear_previous_outputs(store: &ArtifactStore) -> Result<()> {
    let mut stale = store.ballot_files(Stage::Setup)?;
    stale.extend([METADATA_FILE, METADATA_TMP_FILE, FINAL_TALLY_FILE].map(String::from));

    let mut removed = 0;
    for name in &stale {
        let path = store.path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed previous {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TallyError::io(Stage::Setup, path, e)),
        }
    }
    if removed > 0 {
        info!("Cleared {} artifacts of a previous run", removed);
    }
    Ok(())
}

fn percent(part: u64, total: u64) -> f64 {
    part as f64 / total.max(1) as f64 * 100.0
}

fn log_banner(config: &VoteConfiguration) {
    info!("{}", "=".repeat(60));
    info!("ENCRYPTED VOTE GENERATOR");
    info!("{}", "=".repeat(60));
    if !config.question.is_empty() {
        info!("Question:     {}", config.question);
    }
    info!("Total voters: {}", config.total_voters);
    info!(
        "YES votes:    {} ({:.1}%)",
        config.yes_votes,
        percent(config.yes_votes, config.total_voters)
    );
    info!(
        "NO votes:     {} ({:.1}%)",
        config.no_votes,
        percent(config.no_votes, config.total_voters)
    );
}

fn log_results(metadata: &RunMetadata) {
    let results = &metadata.results;
    info!("{}", "=".repeat(60));
    info!("VOTE RESULTS (OFF-CHAIN VERIFICATION)");
    info!("{}", "=".repeat(60));
    info!("Total voters: {}", results.total_votes);
    info!(
        "YES votes:    {} ({:.1}%)",
        results.yes_votes,
        percent(results.yes_votes, results.total_votes)
    );
    info!(
        "NO votes:     {} ({:.1}%)",
        results.no_votes,
        percent(results.no_votes, results.total_votes)
    );
    info!("Tally time:   {:.2} ms", metadata.performance.tally_time_ms);
    info!("Tally hash:   {}", metadata.final_tally.hash);
}
