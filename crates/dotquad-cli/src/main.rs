#![forbid(unsafe_code)]

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dotquad_core::{Direction, ScanConfig, parse_duration, resolve_store_path, scan_store};
use dotquad_error::DotquadError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "dotquad",
    version,
    about = "Inspect etcd db files for IPv4 addresses with leading zeros"
)]
struct Cli {
    /// Time to wait for the db file lock, 0 to wait indefinitely.
    #[arg(long, global = true, default_value = "10s", value_parser = parse_duration)]
    timeout: Duration,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List IPv4 addresses that strict parsers (Go 1.17+) reject.
    FindIps(FindIpsArgs),
}

#[derive(Args)]
struct FindIpsArgs {
    /// etcd data dir or db file path.
    path: PathBuf,

    /// Max number of key-value pairs to visit, 0 to visit all.
    #[arg(long, default_value_t = 0)]
    limit: u64,

    /// Decode values as etcd KeyValue records.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    decode: bool,

    /// Report every IPv4 address found, valid or not.
    #[arg(long)]
    match_all: bool,

    /// Dump every key-value pair visited.
    #[arg(long)]
    debug: bool,

    /// Visit the oldest revisions first.
    #[arg(long)]
    ascending: bool,
}

impl FindIpsArgs {
    fn scan_config(&self, timeout: Duration) -> ScanConfig {
        ScanConfig {
            limit: self.limit,
            decode: self.decode,
            match_all: self.match_all,
            debug: self.debug,
            direction: if self.ascending {
                Direction::Ascending
            } else {
                Direction::Descending
            },
            lock_timeout: timeout,
            ..ScanConfig::default()
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            let known = error.downcast_ref::<DotquadError>();
            if let Some(hint) = known.and_then(DotquadError::suggestion) {
                eprintln!("hint: {hint}");
            }
            let code = known.map_or(1, DotquadError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::FindIps(args) => find_ips(&args, cli.timeout),
    }
}

fn find_ips(args: &FindIpsArgs, timeout: Duration) -> Result<()> {
    let path = resolve_store_path(&args.path)?;
    let config = args.scan_config(timeout);
    debug!(path = %path.display(), ?config, "starting scan");

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match scan_store(&path, &config, &mut out) {
        Ok(_) => Ok(()),
        Err(verdict @ DotquadError::InvalidAddressesFound { .. }) => Err(verdict.into()),
        Err(error) => Err(error).with_context(|| format!("failed to scan '{}'", path.display())),
    }
}
