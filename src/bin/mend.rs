//! Binary entry point for the mend CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Mine before/after pairs into a change pool
//! mend mine --input corpus/ --pool pools/default
//!
//! # Search for a patch using ranked fault localization
//! mend repair --pool pools/default --fault-file faults.txt
//!
//! # Inspect a pool
//! mend pool stats --pool pools/default
//! ```
//!
//! All results are written to stdout as JSON; logs go to stderr.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use mendtool::concretize::ConcretizationStrategy;
use mendtool::config::{ConfigOverrides, LocationMode, ResolvedConfig, CONFIG_FILE};
use mendtool::error::{MendError, OutputErrorCode};
use mendtool::extract::ChangeExtractor;
use mendtool::fault::load_fault_file;
use mendtool::frontend::FrontEnd;
use mendtool::java::JavaFrontEnd;
use mendtool::mine::{discover_pairs, mine_pairs};
use mendtool::orchestrator::{self, RepairContext};
use mendtool::output::{emit_response, ErrorResponse, MineResponse, PoolStatsResponse, RepairResponse};
use mendtool::pool::ChangePool;
use mendtool::runner::{ensure_runnable, CommandCompiler, CommandTestRunner};
use mendtool::treediff::ShapeDiff;
use serde::Serialize;

/// Compile time limit per candidate.
const COMPILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Pool window used when only reading pool metadata.
const STATS_POOL_LOAD: usize = 1;

// ============================================================================
// CLI Structure
// ============================================================================

/// Template-based automated program repair.
///
/// Mines edit templates into a change pool and searches fault-localized
/// lines for a candidate patch that passes the test suite.
#[derive(Parser, Debug)]
#[command(name = "mend", version, about = "Template-based automated program repair")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Config file (default: mend.toml in the current directory, if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for a patch.
    Repair(RepairArgs),

    /// Mine before/after file pairs into a change pool.
    Mine {
        /// Directory holding `before`/`after` trees.
        #[arg(long)]
        input: PathBuf,

        /// Pool directory (created if missing).
        #[arg(long)]
        pool: PathBuf,

        /// Skip operator-family variants of mined changes.
        #[arg(long)]
        no_synthesis: bool,

        #[arg(long, default_value_t = 1000)]
        max_pool_load: usize,
    },

    /// Change pool operations.
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },
}

#[derive(Subcommand, Debug)]
enum PoolAction {
    /// Show pool size, contexts, and observations by change kind.
    Stats {
        #[arg(long)]
        pool: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct RepairArgs {
    /// Change pool directory; repeat to search several pools in order.
    #[arg(long = "pool")]
    pools: Vec<PathBuf>,

    /// Root of the program's source tree.
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Ranked covered lines (`Class#line,score`).
    #[arg(long)]
    fault_file: Option<PathBuf>,

    /// Maximum number of candidates to verify.
    #[arg(long)]
    patch_count: Option<usize>,

    /// Apply attempts per location and change.
    #[arg(long)]
    max_trials: Option<usize>,

    /// Changes tried per location.
    #[arg(long)]
    max_change_count: Option<usize>,

    /// Change payloads kept in memory.
    #[arg(long)]
    max_pool_load: Option<usize>,

    /// Test timeout in seconds.
    #[arg(long)]
    test_timeout: Option<u64>,

    /// Wall-clock budget in hours.
    #[arg(long)]
    time_budget: Option<f64>,

    /// How fix locations are chosen: `ranked` or `perfect`.
    #[arg(long, value_parser = parse_location_mode)]
    location_strategy: Option<LocationMode>,

    /// Concretization strategy: `tc` (type-compatible) or `exact`.
    #[arg(long, value_parser = parse_concretization)]
    concretization: Option<ConcretizationStrategy>,

    /// Known faulty line for the perfect strategy, as `Class#line`.
    #[arg(long)]
    perfect: Option<String>,
}

fn parse_location_mode(s: &str) -> Result<LocationMode, String> {
    s.parse()
        .map_err(|_| format!("unknown location strategy '{}', expected 'ranked' or 'perfect'", s))
}

fn parse_concretization(s: &str) -> Result<ConcretizationStrategy, String> {
    ConcretizationStrategy::from_name(s)
        .ok_or_else(|| format!("unknown concretization '{}', expected 'tc' or 'exact'", s))
}

impl RepairArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            pools: self.pools.clone(),
            source_dir: self.source_dir.clone(),
            fault_file: self.fault_file.clone(),
            patch_count: self.patch_count,
            max_trials: self.max_trials,
            max_change_count: self.max_change_count,
            max_pool_load: self.max_pool_load,
            test_timeout_secs: self.test_timeout,
            time_budget_hours: self.time_budget,
            location_strategy: self.location_strategy,
            concretization: self.concretization,
            perfect_location: self.perfect.clone(),
        }
    }
}

// ============================================================================
// Entry
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_json);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON, like every other response
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn execute(cli: Cli) -> Result<(), MendError> {
    match cli.command {
        Command::Repair(args) => execute_repair(&cli.global, &args),
        Command::Mine {
            input,
            pool,
            no_synthesis,
            max_pool_load,
        } => execute_mine(&input, &pool, no_synthesis, max_pool_load),
        Command::Pool {
            action: PoolAction::Stats { pool },
        } => execute_pool_stats(&pool),
    }
}

fn emit<T: Serialize>(response: &T) -> Result<(), MendError> {
    emit_response(response, &mut io::stdout())
        .map_err(|e| MendError::internal(format!("failed to write response: {}", e)))
}

// ============================================================================
// Commands
// ============================================================================

fn execute_repair(global: &GlobalArgs, args: &RepairArgs) -> Result<(), MendError> {
    let config_file = match &global.config {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.is_file()),
    };
    let resolved = ResolvedConfig::resolve(config_file.as_deref(), &args.overrides())?;
    let config = resolved.config;
    orchestrator::ensure_pools(&config)?;

    let lines = match config.location_strategy {
        LocationMode::Ranked => load_fault_file(&config.fault_file)?,
        LocationMode::Perfect => Vec::new(),
    };
    ensure_runnable("compile", &config.compile_command)?;
    ensure_runnable("test", &config.test_command)?;

    let compiler = CommandCompiler::new(config.compile_command.clone(), COMPILE_TIMEOUT);
    let tester = CommandTestRunner::new(config.test_command.clone());
    let ctx = RepairContext::new(config, Rc::new(JavaFrontEnd::new()), Box::new(compiler), Box::new(tester));
    let summary = orchestrator::run(&ctx, lines)?;
    emit(&RepairResponse::new(summary))
}

fn execute_mine(input: &Path, pool_dir: &Path, no_synthesis: bool, max_pool_load: usize) -> Result<(), MendError> {
    if !input.is_dir() {
        return Err(MendError::file_not_found(input.display().to_string()));
    }
    let front_end = JavaFrontEnd::new();
    let pairs = discover_pairs(input, front_end.file_extension());
    if pairs.is_empty() {
        return Err(MendError::invalid_args(format!(
            "no before/after pairs found under {}",
            input.display()
        )));
    }
    let mut pool = ChangePool::open(pool_dir, max_pool_load)?;
    let extractor = ChangeExtractor::new().with_synthesis(!no_synthesis);
    let summary = mine_pairs(&mut pool, &pairs, &front_end, &ShapeDiff, &extractor)?;
    emit(&MineResponse::new(pool_dir.to_path_buf(), summary))
}

fn execute_pool_stats(pool_dir: &Path) -> Result<(), MendError> {
    if !pool_dir.is_dir() {
        return Err(MendError::file_not_found(pool_dir.display().to_string()));
    }
    let pool = ChangePool::open(pool_dir, STATS_POOL_LOAD)?;
    emit(&PoolStatsResponse::new(pool_dir.to_path_buf(), pool.stats()))
}
