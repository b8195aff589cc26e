//! Prelude module for convenient imports.
//!
//! ```rust
//! use cipherprobe::prelude::*;
//! ```

// Error handling
pub use crate::error::{ProbeError, Result};

// Host boundary
pub use crate::host::{
    HostEngine, Invocation, MemoryReader, Module, NativePointer, Scenario, SimulatedProcess,
};

// Probe core
pub use crate::probe::{
    BufferFormatter, CollectingSink, CorrelationContext, CorrelationScope, CryptoEvent,
    DiscoveryReport, EventSink, FragmentKind, HookDescriptor, LogSink, NamePattern, Probe,
};

// Statistics
pub use crate::probe::{SessionStatistics, StatisticsSnapshot};

// Settings
pub use crate::settings::{HookSpec, KeySource, ModeEntry, ProbeSettings, SettingsBuilder};
