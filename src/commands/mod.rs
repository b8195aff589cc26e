//! CLI command handlers.
//!
//! Each submodule backs one subcommand of the `cipherprobe` binary. Handlers
//! return plain results; printing and exit codes are left to `main`.

pub mod config;
pub mod replay;

pub use config::{init_config, show_config};
pub use replay::{replay_scenario, run_replay, ReplayOptions, ReplaySummary};
