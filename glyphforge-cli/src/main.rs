use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glyphforge::config::ResourceRoots;
use glyphforge::schedule::GenerationOptions;
use glyphforge::{DiskFontSource, ForgeError, RunError};

// Exit codes: 0 all targets met, 2 validation failure, 3 partial generation,
// 4 cancelled, 1 unexpected error.
const EXIT_OK: i32 = 0;
const EXIT_UNEXPECTED: i32 = 1;
const EXIT_VALIDATION: i32 = 2;
const EXIT_PARTIAL: i32 = 3;
const EXIT_CANCELLED: i32 = 4;

#[derive(Parser, Debug)]
#[command(name = "glyphforge", version)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a batch of labeled images.
    Generate(GenerateArgs),
    /// Validate a configuration without generating anything.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Batch configuration YAML.
    #[arg(long)]
    config: PathBuf,

    /// Output directory for images, labels and the checkpoint.
    #[arg(long)]
    output_dir: PathBuf,

    /// Base directory for relative font selector patterns.
    #[arg(long)]
    font_dir: Option<PathBuf>,

    /// Base directory for relative background selector patterns.
    #[arg(long)]
    background_dir: Option<PathBuf>,

    /// Base directory for relative corpus selector patterns.
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Parallel generation workers.
    #[arg(long, default_value_t = 4)]
    generation_workers: usize,

    /// Parallel output writers.
    #[arg(long, default_value_t = 2)]
    io_workers: usize,

    /// Tasks per streaming chunk.
    #[arg(long, default_value_t = 100)]
    chunk_size: usize,

    /// Outputs per write batch.
    #[arg(long, default_value_t = 16)]
    io_batch_size: usize,

    /// Retries per task before skipping it.
    #[arg(long, default_value_t = 3)]
    retry_budget: u32,

    /// Skip indices already present in the checkpoint.
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Persist font/background health snapshots in the output directory.
    #[arg(long, default_value_t = false)]
    persist_health: bool,

    /// Stop submitting new work after this many seconds.
    #[arg(long)]
    time_budget_secs: Option<u64>,

    /// Override the configuration's master seed.
    #[arg(long)]
    seed_override: Option<u64>,

    /// Reject unknown configuration keys.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Batch configuration YAML.
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    font_dir: Option<PathBuf>,

    #[arg(long)]
    background_dir: Option<PathBuf>,

    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Reject unknown configuration keys.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match cli.cmd {
        Command::Generate(args) => cmd_generate(args),
        Command::Validate(args) => cmd_validate(args),
    };
    std::process::exit(code);
}

fn cmd_generate(args: GenerateArgs) -> i32 {
    let config = match glyphforge::load_config(&args.config, args.strict) {
        Ok(cfg) => cfg,
        Err(e) => return report_load_error(&e),
    };

    let roots = ResourceRoots {
        font_dir: args.font_dir.as_deref(),
        corpus_dir: args.corpus_dir.as_deref(),
        background_dir: args.background_dir.as_deref(),
    };
    let options = GenerationOptions {
        generation_workers: args.generation_workers,
        io_workers: args.io_workers,
        chunk_size: args.chunk_size,
        io_batch_size: args.io_batch_size,
        retry_budget: args.retry_budget,
        resume: args.resume,
        persist_health: args.persist_health,
        time_budget: args.time_budget_secs.map(Duration::from_secs),
        seed_override: args.seed_override,
    };

    let cancel = AtomicBool::new(false);
    let fonts = Arc::new(DiskFontSource::new());

    match glyphforge::run_generation(&config, roots, &args.output_dir, fonts, &options, &cancel)
    {
        Ok(summary) => {
            eprintln!(
                "generated {}/{} images ({} skipped)",
                summary.generated,
                summary.total_target,
                summary.skipped.len()
            );
            if summary.cancelled {
                EXIT_CANCELLED
            } else if summary.generated + summary.already_completed < summary.total_target {
                EXIT_PARTIAL
            } else {
                EXIT_OK
            }
        }
        Err(RunError::Config(report)) => {
            eprintln!("configuration invalid:\n{report}");
            EXIT_VALIDATION
        }
        Err(RunError::Fatal(e)) => {
            eprintln!("error: {e}");
            match e {
                ForgeError::Config(_) | ForgeError::ResourceMissing(_) => EXIT_VALIDATION,
                _ => EXIT_UNEXPECTED,
            }
        }
    }
}

fn cmd_validate(args: ValidateArgs) -> i32 {
    let config = match glyphforge::load_config(&args.config, args.strict) {
        Ok(cfg) => cfg,
        Err(e) => return report_load_error(&e),
    };
    let roots = ResourceRoots {
        font_dir: args.font_dir.as_deref(),
        corpus_dir: args.corpus_dir.as_deref(),
        background_dir: args.background_dir.as_deref(),
    };
    match glyphforge::validate_config(&config, roots) {
        Ok(()) => {
            eprintln!("configuration ok");
            EXIT_OK
        }
        Err(report) => {
            eprintln!("configuration invalid:\n{report}");
            EXIT_VALIDATION
        }
    }
}

fn report_load_error(e: &ForgeError) -> i32 {
    eprintln!("error: {e}");
    match e {
        ForgeError::Config(_) | ForgeError::ResourceMissing(_) => EXIT_VALIDATION,
        _ => EXIT_UNEXPECTED,
    }
}
