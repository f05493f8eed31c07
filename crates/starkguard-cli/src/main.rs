// crates/starkguard-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use starkguard_core::{
    io::{to_pretty_bytes, write_json_pretty},
    Comparator, Config, Digest, Error, FsRecordStore, Pipeline, ProveInput, RecordId,
    RecordStore, RunFailure, RunState, Slot,
};
use starkguard_sim::{SimConfig, SimEngine};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_OK: u8 = 0;
/// Run aborted, or any other error.
const EXIT_ERROR: u8 = 1;
/// A completed verification judged the proof invalid.
const EXIT_INVALID: u8 = 2;
/// `--strict` and the verdict is REGRESSED or HASH_MISMATCH.
const EXIT_VERDICT: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "starkguard",
    about = "Proof regression gate for STARK provers",
    long_about = "Proof regression gate for STARK provers.\n\nCaptures proofs into a durable record store, re-verifies them, and compares candidates against a trusted baseline. Reports are printed to stdout as JSON; logs go to stderr.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    /// Configuration file (default: ./starkguard.toml if present)
    #[arg(long, global = true, env = "STARKGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Record store directory
    #[arg(long, global = true, env = "STARKGUARD_STORE")]
    store: Option<PathBuf>,

    /// Also write the JSON report to this path
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Exit with code 3 on REGRESSED or HASH_MISMATCH verdicts
    #[arg(long, global = true, env = "STARKGUARD_STRICT")]
    strict: bool,

    /// Reference engine salt
    #[arg(long, global = true, env = "STARKGUARD_SALT")]
    salt: Option<String>,

    /// Reference engine grinding rounds per row
    #[arg(long, global = true, env = "STARKGUARD_GRIND_ROUNDS")]
    grind_rounds: Option<u32>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Capture, persist and verify a new trusted baseline.
    CaptureBaseline {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Capture a candidate, verify it and compare it against the baseline.
    /// The input defaults to the baseline's input.
    CaptureCandidate {
        #[command(flatten)]
        run: RunArgs,

        /// Verdict threshold in percent
        #[arg(long, env = "STARKGUARD_THRESHOLD")]
        threshold: Option<f64>,
    },

    /// Re-verify a stored record
    Verify {
        /// Record id
        id: RecordId,
    },

    /// Compare two stored records
    Compare {
        /// Baseline record id
        baseline: RecordId,
        /// Candidate record id
        candidate: RecordId,
        /// Verdict threshold in percent
        #[arg(long, env = "STARKGUARD_THRESHOLD")]
        threshold: Option<f64>,
    },

    /// List record ids in a slot
    List {
        /// Slot to list
        #[arg(value_enum, long, default_value_t = SlotOpt::History)]
        slot: SlotOpt,
    },

    /// Make a stored record the baseline
    Promote {
        /// Record id
        id: RecordId,
    },

    /// Delete history records older than N days (never the baseline)
    Prune {
        /// Age cutoff in days
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        older_than_days: u32,
    },

    /// Re-verify every record in history
    VerifyAll {
        /// Worker threads (default from config)
        #[arg(long, env = "STARKGUARD_JOBS", value_parser = clap::value_parser!(u32).range(1..))]
        jobs: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Block count (default from config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    length: Option<u64>,

    /// Block commitment, five comma-separated u64 words
    #[arg(long, value_delimiter = ',')]
    commitment: Option<Vec<u64>>,

    /// Nonce, five comma-separated u64 words
    #[arg(long, value_delimiter = ',')]
    nonce: Option<Vec<u64>>,

    /// Source label (branch or commit)
    #[arg(long, env = "STARKGUARD_LABEL", default_value = "local")]
    label: String,

    /// Test name stamped on the record
    #[arg(long)]
    test_name: Option<String>,
}

impl RunArgs {
    fn has_input_override(&self) -> bool {
        self.length.is_some() || self.commitment.is_some() || self.nonce.is_some()
    }

    /// Overlay explicit flags on `base`.
    fn input_over(&self, base: ProveInput) -> Result<ProveInput> {
        Ok(ProveInput::new(
            self.length.unwrap_or(base.length),
            words(self.commitment.as_deref(), base.block_commitment, "--commitment")?,
            words(self.nonce.as_deref(), base.nonce, "--nonce")?,
        ))
    }
}

fn words(v: Option<&[u64]>, default: Digest, flag: &str) -> Result<Digest> {
    match v {
        None => Ok(default),
        Some(w) => w
            .try_into()
            .map_err(|_| anyhow!("{flag} takes exactly 5 words, got {}", w.len())),
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum SlotOpt {
    /// Every stored record, insertion order
    History,
    /// The current baseline
    Baseline,
}

impl From<SlotOpt> for Slot {
    fn from(s: SlotOpt) -> Self {
        match s {
            SlotOpt::History => Self::History,
            SlotOpt::Baseline => Self::Baseline,
        }
    }
}

/// Report printed when a run or command ends in `ABORTED`.
#[derive(Serialize)]
struct AbortReport<'a> {
    state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_in: Option<RunState>,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unpersisted_record: Option<&'a starkguard_core::ProofRecord>,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            if let Err(e) = emit(cli.out.as_deref(), &error_report(&e)) {
                tracing::error!("{e:#}");
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Initialize tracing on stderr with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Everything a command needs, resolved from file, env and flags.
struct Session {
    config: Config,
    engine: SimEngine,
    store: FsRecordStore,
    out: Option<PathBuf>,
    strict: bool,
}

fn resolve(cli: &Cli) -> Result<Session> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.store {
        config.store_dir.clone_from(dir);
    }
    if let Some(salt) = &cli.salt {
        config.engine.salt.clone_from(salt);
    }
    if let Some(rounds) = cli.grind_rounds {
        config.engine.grind_rounds = rounds;
    }
    config.validate().context("invalid configuration")?;

    let store = FsRecordStore::open(&config.store_dir)
        .with_context(|| format!("opening record store {}", config.store_dir.display()))?;
    info!(store = %store.root().display(), salt = %config.engine.salt, "session ready");
    let engine = SimEngine::new(SimConfig::from(&config.engine));
    Ok(Session {
        config,
        engine,
        store,
        out: cli.out.clone(),
        strict: cli.strict,
    })
}

fn comparator(config: &Config, threshold: Option<f64>) -> Result<Comparator> {
    Comparator::new(threshold.unwrap_or(config.threshold_percent)).context("invalid --threshold")
}

/// Execute one command and return its exit code.
fn run(cli: &Cli) -> Result<u8> {
    let ctx = resolve(cli)?;
    let pipeline = |cmp: Comparator, test_name: Option<&str>| {
        Pipeline::new(&ctx.engine, &ctx.engine, &ctx.engine, &ctx.store)
            .with_comparator(cmp)
            .with_test_name(test_name.unwrap_or(&ctx.config.test_name))
    };

    match &cli.cmd {
        Cmd::CaptureBaseline { run } => {
            let input = run.input_over(ctx.config.prove_input())?;
            let p = pipeline(comparator(&ctx.config, None)?, run.test_name.as_deref());
            match p.capture_baseline(&input, &run.label) {
                Ok(report) => {
                    ctx.emit(&report)?;
                    Ok(EXIT_OK)
                }
                Err(failure) => aborted(&ctx, &failure),
            }
        }

        Cmd::CaptureCandidate { run, threshold } => {
            let input = if run.has_input_override() {
                let base = match ctx.store.baseline() {
                    Ok(b) => b.input,
                    Err(Error::EmptyStore(_)) => ctx.config.prove_input(),
                    Err(e) => return Err(e).context("reading baseline"),
                };
                Some(run.input_over(base)?)
            } else {
                None
            };
            let p = pipeline(comparator(&ctx.config, *threshold)?, run.test_name.as_deref());
            match p.capture_candidate(input.as_ref(), &run.label) {
                Ok(report) => {
                    ctx.emit(&report)?;
                    let failed = report
                        .comparison
                        .as_ref()
                        .is_some_and(|c| c.verdict.is_failure());
                    Ok(verdict_exit(&ctx, failed))
                }
                Err(failure) => aborted(&ctx, &failure),
            }
        }

        Cmd::Verify { id } => {
            let result = pipeline(comparator(&ctx.config, None)?, None)
                .verify_record(id)
                .with_context(|| format!("verifying {id}"))?;
            ctx.emit(&result)?;
            Ok(if result.is_valid { EXIT_OK } else { EXIT_INVALID })
        }

        Cmd::Compare {
            baseline,
            candidate,
            threshold,
        } => {
            let report = pipeline(comparator(&ctx.config, *threshold)?, None)
                .compare_records(baseline, candidate)
                .with_context(|| format!("comparing {baseline} with {candidate}"))?;
            ctx.emit(&report)?;
            Ok(verdict_exit(&ctx, report.verdict.is_failure()))
        }

        Cmd::List { slot } => {
            let ids = ctx.store.list((*slot).into()).context("listing records")?;
            ctx.emit(&ids)?;
            Ok(EXIT_OK)
        }

        Cmd::Promote { id } => {
            ctx.store
                .promote(id)
                .with_context(|| format!("promoting {id}"))?;
            info!(record_id = %id, "promoted to baseline");
            ctx.emit(&serde_json::json!({ "baseline": id }))?;
            Ok(EXIT_OK)
        }

        Cmd::Prune { older_than_days } => {
            let cutoff = Utc::now() - Duration::days(i64::from(*older_than_days));
            let removed = ctx.store.prune(cutoff).context("pruning history")?;
            ctx.emit(&serde_json::json!({ "cutoff": cutoff, "removed": removed }))?;
            Ok(EXIT_OK)
        }

        Cmd::VerifyAll { jobs } => {
            let jobs = jobs.map_or(ctx.config.jobs, |j| j as usize);
            let summary = pipeline(comparator(&ctx.config, None)?, None)
                .verify_all(jobs)
                .context("batch verification")?;
            ctx.emit(&summary)?;
            if summary.errors > 0 {
                Ok(EXIT_ERROR)
            } else if summary.invalid > 0 {
                Ok(EXIT_INVALID)
            } else {
                Ok(EXIT_OK)
            }
        }
    }
}

fn verdict_exit(ctx: &Session, failed: bool) -> u8 {
    if failed && ctx.strict {
        warn!("strict mode: verdict fails the gate");
        EXIT_VERDICT
    } else {
        EXIT_OK
    }
}

fn aborted(ctx: &Session, failure: &RunFailure) -> Result<u8> {
    let report = AbortReport {
        state: RunState::Aborted,
        failed_in: Some(failure.state),
        error: error_chain(failure),
        unpersisted_record: failure.error.unpersisted_record(),
    };
    ctx.emit(&report)?;
    Ok(match failure.error {
        Error::StructuralMismatch { .. } | Error::ProofRejected(_) => EXIT_INVALID,
        _ => EXIT_ERROR,
    })
}

/// Report for a command that failed before producing its own report.
fn error_report(e: &anyhow::Error) -> AbortReport<'static> {
    AbortReport {
        state: RunState::Aborted,
        failed_in: None,
        error: format!("{e:#}"),
        unpersisted_record: None,
    }
}

/// A failure and its sources as one line.
fn error_chain(failure: &RunFailure) -> String {
    let mut chain = vec![failure.to_string()];
    let mut src: Option<&dyn std::error::Error> = Some(&failure.error);
    while let Some(e) = src {
        chain.push(e.to_string());
        src = e.source();
    }
    chain.join(": ")
}

impl Session {
    fn emit<T: Serialize>(&self, report: &T) -> Result<()> {
        emit(self.out.as_deref(), report)
    }
}

/// Print a report to stdout and, with `--out`, to a file.
fn emit<T: Serialize>(out: Option<&Path>, report: &T) -> Result<()> {
    let bytes = to_pretty_bytes(report).context("serializing report")?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes).context("writing report to stdout")?;
    stdout.flush()?;
    if let Some(path) = out {
        write_json_pretty(path, report)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    Ok(())
}
