//! Exported symbol lookup by name pattern.
//!
//! Substring patterns tolerate prefixed or per-mode variants of a symbol
//! (`CBC_encrypt`, `pycrypto_CBC_encrypt`) without an exact symbol table.

use crate::host::{ExportSymbol, HostEngine, Module};
use crate::probe::pattern::PatternSet;
use log::{debug, warn};

/// Picks an export out of an enumerated export table.
pub fn match_export<'a>(exports: &'a [ExportSymbol], patterns: &PatternSet) -> Option<&'a ExportSymbol> {
    patterns.first_match(exports)
}

/// Finds the export of `module` accepted by `patterns`.
///
/// The export table is enumerated on every call; results are not cached.
pub fn find_export<H: HostEngine + ?Sized>(
    host: &H,
    module: &Module,
    patterns: &PatternSet,
) -> Option<ExportSymbol> {
    let exports = match host.enumerate_exports(module) {
        Ok(exports) => exports,
        Err(e) => {
            warn!("Export enumeration failed for {}: {}", module.name, e);
            return None;
        }
    };

    let found = match_export(&exports, patterns).cloned();
    if found.is_none() {
        debug!("{} exports nothing matching {}", module.name, patterns);
    }
    found
}
