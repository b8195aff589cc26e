//! Probe core: discovery, interception and correlation.
//!
//! Components are layered bottom-up: `format` renders buffers, `resolver`
//! and `exports` locate targets, `engine` turns calls into fragments,
//! `correlation` pairs fragments with payloads, and `orchestrator` drives a
//! whole session against a host engine.

pub mod correlation;
pub mod descriptor;
pub mod engine;
pub mod event;
pub mod exports;
pub mod format;
pub mod orchestrator;
pub mod pattern;
pub mod resolver;
pub mod sink;
pub mod stats;
pub mod tags;

// Re-export commonly used types
pub use correlation::{CorrelationContext, CorrelationScope};
pub use descriptor::{FragmentKind, HookDescriptor};
pub use engine::{InterceptionEngine, InterceptionTarget};
pub use event::CryptoEvent;
pub use format::BufferFormatter;
pub use orchestrator::{DiscoveryReport, Probe};
pub use pattern::{NamePattern, PatternSet};
pub use sink::{ChannelSink, CollectingSink, EventSink, LogSink};
pub use stats::{SessionStatistics, StatisticsSnapshot};
