//! Command-line entry point: run the tally pipeline or audit an artifact directory

use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use vhe_tally::audit::audit;
use vhe_tally::config::{VoterCounts, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use vhe_tally::pipeline::{self, RunOptions};
use vhe_tally::{ArtifactStore, ElGamalProvider, SimulationConfig, TallyError};

#[derive(Parser)]
#[command(name = "vhe-tally", version, about = "Encrypted vote tally with auditable artifacts")]
struct Cli {
    /// Prints debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encrypt ballots, tally them homomorphically and write the artifact bundle
    Run(RunArgs),
    /// Check artifact hashes against metadata.json (no keys needed)
    Audit(AuditArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Simulation configuration (JSON)
    #[arg(long, env = CONFIG_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Artifact directory, overrides the configuration
    #[arg(long)]
    output: Option<PathBuf>,

    /// Accept voter counts from the command line
    #[arg(long, env = "ALLOW_CLI_ARGS", value_parser = FalseyValueParser::new())]
    allow_cli_args: bool,

    /// Voter counts overriding the configuration
    #[arg(num_args = 3, value_names = ["TOTAL", "YES", "NO"])]
    counts: Vec<u64>,
}

#[derive(Args)]
struct AuditArgs {
    /// Artifact directory to audit
    #[arg(long, default_value = vhe_tally::config::DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Print the ballot hashes in index order
    #[arg(long)]
    hashes: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let outcome = match cli.command {
        Command::Run(args) => run(args),
        Command::Audit(args) => run_audit(args),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> Result<bool, TallyError> {
    let mut config = SimulationConfig::load(&args.config)?;

    let counts = match args.counts.as_slice() {
        [total, yes, no] => Some(VoterCounts {
            total: *total,
            yes: *yes,
            no: *no,
        }),
        _ => None,
    };
    config.apply_override(counts, args.allow_cli_args)?;

    let mut options = RunOptions::from(&config);
    if let Some(output) = args.output {
        options.output_dir = output;
    }

    pipeline::run(&ElGamalProvider::new(), &config.vote_configuration(), &options)?;
    info!("Process completed successfully");
    Ok(true)
}

fn run_audit(args: AuditArgs) -> Result<bool, TallyError> {
    let report = audit(&ArtifactStore::open(&args.output))?;

    if args.hashes {
        for hash in report.ballot_hashes() {
            println!("{}", hash);
        }
    }

    if report.is_clean() {
        info!(
            "{} artifacts match metadata.json",
            report.artifacts_checked
        );
        Ok(true)
    } else {
        error!("Audit found {} discrepancies", report.findings.len());
        Ok(false)
    }
}
