//! Boundary to the host instrumentation engine.
//!
//! The probe never attaches to processes, walks loader structures or patches
//! code itself. Those primitives belong to the engine that hosts the probe
//! and are reached through the traits in this module. `SimulatedProcess`
//! implements them in memory so the probe can be driven without a live
//! target.

pub mod scenario;
pub mod simulated;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use scenario::Scenario;
pub use simulated::SimulatedProcess;

/// An address in the target process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativePointer(pub u64);

impl NativePointer {
    pub const NULL: NativePointer = NativePointer(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns the pointer advanced by `offset` bytes, or `None` on overflow.
    pub fn checked_add(&self, offset: u64) -> Option<NativePointer> {
        self.0.checked_add(offset).map(NativePointer)
    }
}

impl fmt::Display for NativePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for NativePointer {
    fn from(value: u64) -> Self {
        NativePointer(value)
    }
}

/// A native code image loaded in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub base: NativePointer,
    pub size: u64,
}

/// A named, callable function published by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSymbol {
    pub name: String,
    pub address: NativePointer,
}

/// Anything the name matchers can look at.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for Module {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ExportSymbol {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Read access to the target's address space.
pub trait MemoryReader: Send + Sync {
    /// Reads `length` bytes at `address`. Fails with `ProbeError::MemoryRead`
    /// when any part of the range is unmapped or the engine rejects the read.
    fn read_bytes(&self, address: NativePointer, length: usize) -> Result<Vec<u8>>;
}

/// One call into an intercepted function, as seen on entry.
pub trait Invocation {
    /// Raw value of the argument at `index`, or `None` if the calling
    /// convention does not expose it.
    fn argument(&self, index: usize) -> Option<u64>;

    /// Identifier of the target thread performing the call.
    fn thread_id(&self) -> u64;
}

/// Callback run on entry to an intercepted function.
///
/// Listeners run on the target's own threads and must not block.
pub type InvocationListener = Arc<dyn Fn(&dyn Invocation) + Send + Sync>;

/// Primitives consumed from the host instrumentation engine.
pub trait HostEngine: Send + Sync {
    /// Lists the modules currently loaded in the target, in the engine's order.
    fn enumerate_modules(&self) -> Result<Vec<Module>>;

    /// Lists the exports of `module`, in the engine's order.
    fn enumerate_exports(&self, module: &Module) -> Result<Vec<ExportSymbol>>;

    /// Handle used by listeners to read argument buffers.
    fn memory(&self) -> Arc<dyn MemoryReader>;

    /// Installs `listener` on entry to the function at `address`.
    fn attach_interceptor(&self, address: NativePointer, listener: InvocationListener)
        -> Result<()>;
}
