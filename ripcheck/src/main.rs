//! ripcheck - CD rip directory auditor
//!
//! Validates each rip directory named on the command line (or found beneath
//! it with `--recursive`), prints an itemized report and a closing sentence
//! per directory, and exits non-zero when any directory failed.

use anyhow::{Context, Result};
use clap::Parser;
use ripcheck::services::{BatchRunner, DeclinePrompter, Prompter, RipValidator, StdinPrompter};
use ripcheck_common::config::{load_config, DigestFormat, NamingStrategy};
use ripcheck_common::events::EventBus;
use ripcheck_common::Severity;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for ripcheck
#[derive(Parser, Debug)]
#[command(name = "ripcheck")]
#[command(about = "Audit CD rip directories against their extraction logs")]
#[command(version)]
struct Args {
    /// Identity that authorizes renames and signs digests; omit to verify only
    #[arg(short, long, env = "RIPCHECK_SIGNER")]
    signer: Option<String>,

    /// Search each path recursively for rip directories
    #[arg(short, long)]
    recursive: bool,

    /// Album naming strategy: artist-title, short-title or manual
    #[arg(long)]
    naming: Option<NamingStrategy>,

    /// Digest flavor for new digests: md5, sha1 or sha256
    #[arg(long)]
    digest: Option<DigestFormat>,

    /// Comment recorded for changes instead of prompting
    #[arg(short, long)]
    comment: Option<String>,

    /// Lowest severity to report (noise, trivia, advisory, warning, error, fatal)
    #[arg(short, long)]
    verbosity: Option<String>,

    /// Do not sniff unrecognized files for misnamed content
    #[arg(long)]
    no_misname: bool,

    /// Configuration file
    #[arg(long, env = "RIPCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Rip directories or roots to search
    #[arg(required = true)]
    dirs: Vec<PathBuf>,
}

fn parse_threshold(text: &str) -> Result<Severity> {
    Severity::ALL
        .iter()
        .copied()
        .find(|s| s.as_str().eq_ignore_ascii_case(text.trim()))
        .with_context(|| format!("Unknown verbosity: {}", text))
}

fn main() -> ExitCode {
    match run() {
        Ok(worst) if worst.is_failure() => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ripcheck: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<Severity> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting ripcheck {}", env!("CARGO_PKG_VERSION"));

    let mut validation = config.validation;
    if let Some(signer) = args.signer.filter(|s| !s.trim().is_empty()) {
        validation.signer = Some(signer.trim().to_string());
    }
    if let Some(naming) = args.naming {
        validation.naming = naming;
    }
    if let Some(digest) = args.digest {
        validation.digest_format = digest;
    }
    if let Some(verbosity) = args.verbosity.as_deref() {
        validation.report_threshold = parse_threshold(verbosity)?;
    }
    if args.no_misname {
        validation.misname_filter = false;
    }

    let prompter: Box<dyn Prompter> = if std::io::stdin().is_terminal() {
        Box::new(StdinPrompter)
    } else {
        Box::new(DeclinePrompter)
    };

    let event_bus = EventBus::new(100);
    let validator = RipValidator::new(validation, event_bus, prompter)
        .context("Failed to initialize validator")?
        .with_comment(args.comment);

    let mut runner = BatchRunner::new(validator, args.recursive);
    let summary = runner.run(&args.dirs).context("Batch validation failed")?;

    for outcome in &summary.outcomes {
        println!("{}", outcome.directory.display());
        if outcome.status >= Severity::Warning {
            for line in &outcome.report {
                println!("  {}", line);
            }
        }
        println!("  {}", outcome.trailer);
    }

    for descriptor in runner.validator().registry().descriptors() {
        let totals = &descriptor.totals;
        if totals.true_total > 0 {
            info!(
                format = descriptor.canonical_extension(),
                files = totals.true_total,
                misnamed = totals.misnamed_total,
                errors = totals.error_total,
                repairable = totals.repairable_total,
                "Format totals"
            );
        }
    }
    info!(directories = summary.len(), failed = summary.failed_count(), "Done");
    Ok(summary.worst())
}
