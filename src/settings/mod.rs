//! Probe configuration.
//!
//! The lookup of modules and symbols is driven by an explicit table: the
//! primary module, the key sources, the mode modules and the hooks installed
//! in each of them. Defaults target the pycryptodome `_raw_*` backends.
//!
//! # Example
//!
//! ```rust
//! use cipherprobe::settings::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new()
//!     .only_modes(&["cbc"])
//!     .max_capture_len(256)
//!     .build();
//! ```

pub mod builder;
pub mod hooks;
pub mod probe;

// Re-export commonly used types
pub use builder::SettingsBuilder;
pub use hooks::{HookSpec, KeySource, ModeEntry};
pub use probe::ProbeSettings;
