use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use endgame_db::{
    GenerateError, GenerateSummary, Pipeline, PipelineConfig, Signature, Store,
    TablebaseProberFactory,
};

/// Generate an endgame position database for one material signature.
///
/// Runs are resumable: restarting with identical arguments picks up from the
/// last checkpointed batch without re-probing completed work.
#[derive(Debug, Parser)]
#[command(name = "endgame-db", version, about)]
struct Args {
    /// Material signature, e.g. KRvK or KBNvK.
    signature: String,

    /// Arrangements per checkpointed batch.
    #[arg(long, default_value_t = 4096)]
    batch_size: usize,

    /// Number of parallel probe workers.
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Directory containing syzygy tables.
    #[arg(long, default_value = "tablebase/syzygy")]
    tablebase: PathBuf,

    /// SQLite database path.
    #[arg(long, default_value = "endgames.sqlite")]
    database: PathBuf,

    /// Cache directory for the universe and batch checkpoints.
    #[arg(long, default_value = "tmp")]
    cache: PathBuf,
}

fn run(args: &Args, signature: &Signature) -> Result<GenerateSummary, GenerateError> {
    let mut store = Store::open(&args.database)?;
    let factory = TablebaseProberFactory::new(args.tablebase.clone());
    let pipeline = Pipeline::new(
        factory,
        PipelineConfig {
            batch_size: args.batch_size,
            workers: args.workers,
            cache_dir: args.cache.clone(),
        },
    );
    pipeline.generate(signature, &mut store)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let signature: Signature = match args.signature.parse() {
        Ok(signature) => signature,
        Err(err) => {
            error!(signature = %args.signature, %err, "unsupported material signature");
            return ExitCode::FAILURE;
        }
    };

    match run(&args, &signature) {
        Ok(summary) => {
            info!(
                signature = %signature,
                canonical = summary.canonical,
                batches = summary.batches,
                rows = summary.rows,
                "generation complete"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(signature = %signature, %err, "generation failed");
            ExitCode::FAILURE
        }
    }
}
