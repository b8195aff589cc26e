//! In-memory stand-in for a live target process.
//!
//! A `SimulatedProcess` owns a list of modules with their export tables, a
//! sparse address space of mapped buffers, and the listeners installed by
//! the probe. Calling an exported symbol runs its listeners on the calling
//! thread, exactly like an entry hook would in a real target.

use crate::error::{DiscoveryKind, ProbeError, Result};
use crate::host::{
    ExportSymbol, HostEngine, Invocation, InvocationListener, MemoryReader, Module, NativePointer,
};
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// First address handed out by `AddressSpace::alloc`.
const HEAP_BASE: u64 = 0x0000_5a00_0000_0000;

/// Unmapped gap left between allocations so over-reads fail.
const HEAP_GUARD: u64 = 0x1000;

/// Ids below this are left to scenarios that name their threads.
pub const FIRST_IMPLICIT_THREAD_ID: u64 = 0x1_0000;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(FIRST_IMPLICIT_THREAD_ID);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns a stable identifier for the calling OS thread, never below
/// `FIRST_IMPLICIT_THREAD_ID`.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// Sparse set of mapped byte regions keyed by start address.
#[derive(Debug)]
pub struct AddressSpace {
    regions: RwLock<BTreeMap<u64, Vec<u8>>>,
    next_alloc: AtomicU64,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self {
            regions: RwLock::new(BTreeMap::new()),
            next_alloc: AtomicU64::new(HEAP_BASE),
        }
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `bytes` at `address`, replacing any region starting there.
    pub fn map(&self, address: NativePointer, bytes: Vec<u8>) -> Result<()> {
        let mut regions = self
            .regions
            .write()
            .map_err(|_| ProbeError::lock_poisoned("address space"))?;
        regions.insert(address.0, bytes);
        Ok(())
    }

    /// Maps `bytes` at a fresh address and returns it.
    pub fn alloc(&self, bytes: Vec<u8>) -> Result<NativePointer> {
        let span = (bytes.len() as u64).max(1).div_ceil(16) * 16 + HEAP_GUARD;
        let address = NativePointer(self.next_alloc.fetch_add(span, Ordering::Relaxed));
        self.map(address, bytes)?;
        Ok(address)
    }

    /// Removes the region starting at `address`, returning whether one existed.
    pub fn unmap(&self, address: NativePointer) -> Result<bool> {
        let mut regions = self
            .regions
            .write()
            .map_err(|_| ProbeError::lock_poisoned("address space"))?;
        Ok(regions.remove(&address.0).is_some())
    }
}

impl MemoryReader for AddressSpace {
    fn read_bytes(&self, address: NativePointer, length: usize) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        let unmapped = |reason: &str| ProbeError::MemoryRead {
            address,
            length,
            reason: reason.to_string(),
        };

        let regions = self
            .regions
            .read()
            .map_err(|_| ProbeError::lock_poisoned("address space"))?;

        let (start, data) = regions
            .range(..=address.0)
            .next_back()
            .ok_or_else(|| unmapped("address is not mapped"))?;

        let offset = (address.0 - start) as usize;
        let end = offset
            .checked_add(length)
            .ok_or_else(|| unmapped("range overflows the address space"))?;

        data.get(offset..end)
            .map(|slice| slice.to_vec())
            .ok_or_else(|| unmapped("range runs past the end of the mapping"))
    }
}

#[derive(Debug, Clone)]
struct SimulatedModule {
    module: Module,
    exports: Vec<ExportSymbol>,
}

/// Arguments of one simulated call.
struct SimulatedInvocation<'a> {
    args: &'a [u64],
    thread_id: u64,
}

impl Invocation for SimulatedInvocation<'_> {
    fn argument(&self, index: usize) -> Option<u64> {
        self.args.get(index).copied()
    }

    fn thread_id(&self) -> u64 {
        self.thread_id
    }
}

/// A scripted target process implementing `HostEngine`.
#[derive(Default)]
pub struct SimulatedProcess {
    modules: Vec<SimulatedModule>,
    memory: Arc<AddressSpace>,
    listeners: RwLock<HashMap<NativePointer, Vec<InvocationListener>>>,
    protected: HashSet<NativePointer>,
}

impl SimulatedProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a loaded module whose exports are given as `(name, offset from base)`.
    pub fn with_module(mut self, name: &str, base: u64, size: u64, exports: &[(&str, u64)]) -> Self {
        self.add_module(name, base, size, exports);
        self
    }

    /// Adds a loaded module in place. Enumeration order is insertion order.
    pub fn add_module(&mut self, name: &str, base: u64, size: u64, exports: &[(&str, u64)]) {
        let exports = exports
            .iter()
            .map(|(export, offset)| ExportSymbol {
                name: export.to_string(),
                address: NativePointer(base.wrapping_add(*offset)),
            })
            .collect();

        self.modules.push(SimulatedModule {
            module: Module {
                name: name.to_string(),
                base: NativePointer(base),
                size,
            },
            exports,
        });
    }

    /// Makes `attach_interceptor` fail for `address`, as engines do for
    /// code they cannot relocate.
    pub fn protect(mut self, address: NativePointer) -> Self {
        self.protected.insert(address);
        self
    }

    /// The simulated address space.
    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.memory
    }

    /// Maps `bytes` at a fresh address and returns it.
    pub fn alloc(&self, bytes: impl Into<Vec<u8>>) -> Result<NativePointer> {
        self.memory.alloc(bytes.into())
    }

    /// Looks up an export by its exact name across all modules.
    pub fn export_address(&self, symbol: &str) -> Option<NativePointer> {
        self.modules
            .iter()
            .flat_map(|m| m.exports.iter())
            .find(|e| e.name == symbol)
            .map(|e| e.address)
    }

    /// Number of listeners installed on `address`.
    pub fn listener_count(&self, address: NativePointer) -> usize {
        self.listeners
            .read()
            .map(|listeners| listeners.get(&address).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Calls `symbol` from the current thread. Returns how many listeners ran.
    pub fn call(&self, symbol: &str, args: &[u64]) -> Result<usize> {
        self.call_on_thread(current_thread_id(), symbol, args)
    }

    /// Calls `symbol` as if from target thread `thread_id`.
    pub fn call_on_thread(&self, thread_id: u64, symbol: &str, args: &[u64]) -> Result<usize> {
        let address = self
            .export_address(symbol)
            .ok_or_else(|| ProbeError::discovery(DiscoveryKind::Export, format!("'{}'", symbol)))?;
        self.call_address(thread_id, address, args)
    }

    /// Calls the function at `address` as if from target thread `thread_id`.
    pub fn call_address(&self, thread_id: u64, address: NativePointer, args: &[u64]) -> Result<usize> {
        // Clone the listener list so no lock is held while listeners run
        let listeners = {
            let listeners = self
                .listeners
                .read()
                .map_err(|_| ProbeError::lock_poisoned("listener table"))?;
            listeners.get(&address).cloned().unwrap_or_default()
        };

        let invocation = SimulatedInvocation { args, thread_id };
        for listener in &listeners {
            listener(&invocation);
        }

        Ok(listeners.len())
    }
}

impl HostEngine for SimulatedProcess {
    fn enumerate_modules(&self) -> Result<Vec<Module>> {
        Ok(self.modules.iter().map(|m| m.module.clone()).collect())
    }

    fn enumerate_exports(&self, module: &Module) -> Result<Vec<ExportSymbol>> {
        Ok(self
            .modules
            .iter()
            .find(|m| m.module.base == module.base && m.module.name == module.name)
            .map(|m| m.exports.clone())
            .unwrap_or_default())
    }

    fn memory(&self) -> Arc<dyn MemoryReader> {
        self.memory.clone()
    }

    fn attach_interceptor(&self, address: NativePointer, listener: InvocationListener) -> Result<()> {
        if self.protected.contains(&address) {
            return Err(ProbeError::AttachFailed {
                symbol: String::new(),
                address,
                reason: "code at this address cannot be relocated".to_string(),
            });
        }

        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| ProbeError::lock_poisoned("listener table"))?;
        listeners.entry(address).or_default().push(listener);
        debug!("Interceptor installed at {}", address);
        Ok(())
    }
}
