#![warn(clippy::all)]

// main entry point
use cipherprobe::commands::{self, ReplayOptions};
use cipherprobe::probe::correlation::CorrelationScope;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Capture cipher keys, IVs and payloads from intercepted cipher modules
#[derive(Parser, Debug)]
#[command(name = "cipherprobe", version, about)]
struct Cli {
    /// Log filter, e.g. `debug` or `cipherprobe::probe=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a scenario file against a simulated target
    Replay(ReplayArgs),
    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Scenario file describing modules, buffers and calls
    scenario: PathBuf,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write events to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print each event
    #[arg(long)]
    pretty: bool,

    /// Correlate fragments per target thread instead of session-wide
    #[arg(long)]
    per_thread: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a commented default configuration file
    Init {
        /// Target file (defaults to the user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize the application logger
///
/// Logs go to stderr so that stdout carries only events. The level comes
/// from `--log-level`, then `RUST_LOG`, then `info`.
fn init_logger(filters: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filters) = filters {
        builder.parse_filters(filters);
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn run(command: Command) -> cipherprobe::Result<()> {
    match command {
        Command::Replay(args) => {
            let options = ReplayOptions {
                scenario: args.scenario,
                config: args.config,
                output: args.output,
                pretty: args.pretty,
                scope: args.per_thread.then_some(CorrelationScope::PerThread),
            };
            let summary = commands::replay_scenario(&options)?;
            info!(
                "Replay finished: {} calls, {} events",
                summary.calls, summary.events_written
            );
        }
        Command::Config(ConfigCommand::Show { config }) => {
            print!("{}", commands::show_config(config.as_deref())?);
        }
        Command::Config(ConfigCommand::Init { path, force }) => {
            let path = commands::init_config(path, force)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Main entry point for the cipherprobe CLI
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.log_level.as_deref());

    info!("Cipherprobe starting up");

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
