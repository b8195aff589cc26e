use crate::host::NativePointer;
use std::fmt;
use thiserror::Error;

/// What a discovery lookup was searching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    Module,
    Export,
}

impl fmt::Display for DiscoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryKind::Module => write!(f, "module"),
            DiscoveryKind::Export => write!(f, "export"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// A module or exported symbol could not be located in the target
    #[error("No {kind} matching {patterns} was found")]
    DiscoveryFailure {
        kind: DiscoveryKind,
        patterns: String,
    },

    /// The host engine refused to read an argument buffer
    #[error("Failed to read {length} bytes at {address}: {reason}")]
    MemoryRead {
        address: NativePointer,
        length: usize,
        reason: String,
    },

    /// A length argument decoded to a negative value
    #[error("Invalid buffer length {0}")]
    InvalidLength(i32),

    /// The invocation did not carry the declared argument
    #[error("Argument {0} is not available for this invocation")]
    MissingArgument(usize),

    /// A mode symbol name does not split into `{algorithm}_{action}`
    #[error("Symbol name '{0}' does not split into algorithm and action")]
    MalformedSymbolName(String),

    /// A hook descriptor does not fit the calling convention
    #[error("Invalid hook descriptor for '{hook}': {reason}")]
    InvalidDescriptor { hook: String, reason: String },

    /// A regex name pattern failed to compile
    #[error("Invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The host engine could not install an interceptor
    #[error("Failed to attach interceptor to '{symbol}' at {address}: {reason}")]
    AttachFailed {
        symbol: String,
        address: NativePointer,
        reason: String,
    },

    /// Error when a mutex/rwlock is poisoned
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Scenario files that parse but describe an impossible target
    #[error("Invalid scenario: {0}")]
    Scenario(String),

    /// I/O errors from file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenient Result type alias using `ProbeError`.
pub type Result<T> = std::result::Result<T, ProbeError>;

impl ProbeError {
    /// Creates a new lock poisoned error with a descriptive message.
    pub fn lock_poisoned(resource: &str) -> Self {
        Self::LockPoisoned(format!("Failed to acquire lock on {}", resource))
    }

    /// Creates a discovery failure for the given lookup.
    pub fn discovery(kind: DiscoveryKind, patterns: impl fmt::Display) -> Self {
        Self::DiscoveryFailure {
            kind,
            patterns: patterns.to_string(),
        }
    }

    /// Creates an invalid descriptor error.
    pub fn invalid_descriptor(hook: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            hook: hook.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors the probe is expected to log and move past.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProbeError::DiscoveryFailure { .. }
                | ProbeError::MemoryRead { .. }
                | ProbeError::InvalidLength(_)
                | ProbeError::MissingArgument(_)
                | ProbeError::MalformedSymbolName(_)
                | ProbeError::AttachFailed { .. }
        )
    }
}
