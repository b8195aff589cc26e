//! Module lookup by name pattern.

use crate::host::{HostEngine, Module};
use crate::probe::pattern::PatternSet;
use log::{debug, warn};

/// Picks a module out of an enumerated list.
pub fn match_module<'a>(modules: &'a [Module], patterns: &PatternSet) -> Option<&'a Module> {
    patterns.first_match(modules)
}

/// Finds the loaded module accepted by `patterns`.
///
/// Absence is a normal outcome: optional cipher backends are often not
/// loaded. A failed enumeration is logged and reported as absence.
pub fn find_module<H: HostEngine + ?Sized>(host: &H, patterns: &PatternSet) -> Option<Module> {
    let modules = match host.enumerate_modules() {
        Ok(modules) => modules,
        Err(e) => {
            warn!("Module enumeration failed: {}", e);
            return None;
        }
    };

    let found = match_module(&modules, patterns).cloned();
    if found.is_none() {
        debug!(
            "No module matching {} among {} loaded modules",
            patterns,
            modules.len()
        );
    }
    found
}
