//! # Cipherprobe - A runtime probe for cipher keys and payloads
//!
//! Cipherprobe attaches to the native cipher modules of a running program,
//! intercepts key setup and per-block encrypt/decrypt calls, and reports the
//! key, IV or nonce that preceded each payload.
//!
//! ## Features
//!
//! * Module discovery - Find cipher backends by substring or regex
//! * Export discovery - Locate mode entry points such as `CBC_encrypt`
//! * Declarative hooks - Describe which argument carries which buffer
//! * Correlation - Pair the latest key material with the next payload
//! * Replay - Drive the probe from scenario files against a simulated target
//!
//! ## Architecture
//!
//! The probe never talks to a process directly. Everything goes through the
//! `HostEngine` trait in [`host`], which enumerates modules and exports,
//! reads memory and attaches entry listeners. `SimulatedProcess` is the
//! in-memory implementation used by the CLI and the tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use cipherprobe::prelude::*;
//! use std::sync::Arc;
//!
//! let settings = SettingsBuilder::new().only_modes(&["cbc"]).build();
//! let sink = Arc::new(CollectingSink::new());
//! let probe = Probe::new(&settings, sink.clone()).unwrap();
//!
//! let process = SimulatedProcess::new();
//! let report = probe.run(&process);
//! assert!(report.primary.is_none());
//! ```

/// CLI command handlers
pub mod commands;
/// Centralized error handling
pub mod error;
/// Host engine boundary and the simulated target
pub mod host;
/// Prelude for convenient imports
pub mod prelude;
/// Discovery, interception and correlation
pub mod probe;
/// Configuration of modules and hooks
pub mod settings;
/// Shared utility functions
pub mod utils;

// Re-export commonly used types
pub use error::{ProbeError, Result};
