//! Entry hooks that turn intercepted calls into fragments.
//!
//! Each listener reads the arguments its descriptor names, formats the
//! buffers they point at, and delivers everything from the invocation to the
//! correlation context in one step. Listeners only observe: arguments and
//! return values of the hooked function are never touched, and a field that
//! cannot be read is replaced by a placeholder instead of aborting the call.

use crate::error::{ProbeError, Result};
use crate::host::{ExportSymbol, HostEngine, Invocation, InvocationListener, MemoryReader, NativePointer};
use crate::probe::correlation::{CapturedFragment, CorrelationContext};
use crate::probe::descriptor::{BufferSlot, TagRole, ValidatedDescriptor};
use crate::probe::format::{BufferFormatter, UNREADABLE};
use crate::probe::stats::SessionStatistics;
use crate::probe::tags::{derive_tags, SymbolTags};
use log::{info, warn};
use std::sync::Arc;

/// A resolved symbol paired with the layout of its arguments.
#[derive(Debug, Clone)]
pub struct InterceptionTarget {
    /// Configuration name of the hook, e.g. `cbc.encrypt`
    pub label: String,
    pub symbol: ExportSymbol,
    pub descriptor: Arc<ValidatedDescriptor>,
}

pub struct InterceptionEngine {
    formatter: Arc<BufferFormatter>,
    context: Arc<CorrelationContext>,
    statistics: Arc<SessionStatistics>,
}

impl InterceptionEngine {
    pub fn new(
        memory: Arc<dyn MemoryReader>,
        max_capture_len: usize,
        context: Arc<CorrelationContext>,
        statistics: Arc<SessionStatistics>,
    ) -> Self {
        Self {
            formatter: Arc::new(BufferFormatter::new(memory, max_capture_len)),
            context,
            statistics,
        }
    }

    /// Installs a listener for `target` through `host`.
    pub fn attach<H: HostEngine + ?Sized>(&self, host: &H, target: &InterceptionTarget) -> Result<()> {
        let tags = self.static_tags(target);
        let listener = self.listener(target, tags);

        host.attach_interceptor(target.symbol.address, listener)
            .map_err(|e| ProbeError::AttachFailed {
                symbol: target.symbol.name.clone(),
                address: target.symbol.address,
                reason: e.to_string(),
            })?;

        info!(
            "Hooked {} ({}) at {}",
            target.symbol.name, target.label, target.symbol.address
        );
        Ok(())
    }

    /// Tags never change for a symbol, so they are parsed once here. Only
    /// the roles the descriptor declares are kept.
    fn static_tags(&self, target: &InterceptionTarget) -> Option<SymbolTags> {
        let descriptor = &target.descriptor;
        if !descriptor.derives_tags() {
            return None;
        }
        match derive_tags(&target.symbol.name) {
            Ok(tags) => Some(tags.retain(
                descriptor.derives(TagRole::Algorithm),
                descriptor.derives(TagRole::Action),
            )),
            Err(e) => {
                warn!("{}, events from this hook will carry no tags", e);
                self.statistics.record_malformed_name();
                None
            }
        }
    }

    fn listener(&self, target: &InterceptionTarget, tags: Option<SymbolTags>) -> InvocationListener {
        let formatter = self.formatter.clone();
        let context = self.context.clone();
        let statistics = self.statistics.clone();
        let descriptor = target.descriptor.clone();
        let symbol = target.symbol.name.clone();

        Arc::new(move |invocation: &dyn Invocation| {
            statistics.record_invocation();
            let fragments = capture(&formatter, &descriptor, invocation, &symbol, &statistics);
            if context
                .deliver(invocation.thread_id(), fragments, tags.clone())
                .is_some()
            {
                statistics.record_event();
            }
        })
    }
}

/// Extracts every buffer the descriptor declares from one invocation.
///
/// A slot that fails is logged and recorded as `UNREADABLE`; the remaining
/// slots are still captured.
pub fn capture(
    formatter: &BufferFormatter,
    descriptor: &ValidatedDescriptor,
    invocation: &dyn Invocation,
    symbol: &str,
    statistics: &SessionStatistics,
) -> Vec<CapturedFragment> {
    descriptor
        .slots()
        .iter()
        .map(|slot| {
            let value = match read_slot(formatter, slot, invocation) {
                Ok(value) => {
                    statistics.record_fragment();
                    value
                }
                Err(e) => {
                    warn!("{}: could not capture {}: {}", symbol, slot.kind, e);
                    statistics.record_failed_field();
                    UNREADABLE.to_string()
                }
            };
            CapturedFragment::new(slot.kind, value)
        })
        .collect()
}

fn read_slot(formatter: &BufferFormatter, slot: &BufferSlot, invocation: &dyn Invocation) -> Result<String> {
    let pointer = invocation
        .argument(slot.pointer)
        .ok_or(ProbeError::MissingArgument(slot.pointer))?;
    let length = invocation
        .argument(slot.length)
        .ok_or(ProbeError::MissingArgument(slot.length))?;
    formatter.format_raw(NativePointer(pointer), length)
}
