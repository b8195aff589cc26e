//! Fluent construction of `ProbeSettings`.
//!
//! # Example
//!
//! ```rust
//! use cipherprobe::settings::SettingsBuilder;
//! use cipherprobe::probe::correlation::CorrelationScope;
//!
//! let settings = SettingsBuilder::new()
//!     .only_modes(&["cbc", "ctr"])
//!     .max_capture_len(1024)
//!     .correlation_scope(CorrelationScope::PerThread)
//!     .build();
//! assert_eq!(settings.modes.len(), 2);
//! ```

use crate::probe::correlation::CorrelationScope;
use crate::probe::pattern::NamePattern;
use crate::settings::hooks::{HookSpec, KeySource, ModeEntry};
use crate::settings::probe::ProbeSettings;

/// Builder for constructing `ProbeSettings`, starting from the defaults.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: ProbeSettings,
}

impl SettingsBuilder {
    /// Creates a new builder with the default pycryptodome table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the primary module patterns.
    pub fn primary_module(mut self, patterns: Vec<NamePattern>) -> Self {
        self.settings.primary_module = patterns;
        self
    }

    /// Appends a key source after the existing ones.
    pub fn key_source(mut self, source: KeySource) -> Self {
        self.settings.key_sources.push(source);
        self
    }

    /// Drops every key source.
    pub fn without_key_sources(mut self) -> Self {
        self.settings.key_sources.clear();
        self
    }

    /// Adds or replaces a mode entry with the same id.
    pub fn mode(mut self, entry: ModeEntry) -> Self {
        match self.settings.modes.iter_mut().find(|m| m.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.settings.modes.push(entry),
        }
        self
    }

    /// Keeps only the default `_raw_<id>` modes listed, in that order.
    pub fn only_modes(mut self, ids: &[&str]) -> Self {
        self.settings.modes = ids.iter().map(|id| ModeEntry::raw(id)).collect();
        self
    }

    /// Replaces the hooks shared by all mode modules.
    pub fn mode_hooks(mut self, hooks: Vec<HookSpec>) -> Self {
        self.settings.mode_hooks = hooks;
        self
    }

    /// Sets the per-argument capture limit in bytes.
    pub fn max_capture_len(mut self, len: usize) -> Self {
        self.settings.max_capture_len = len;
        self
    }

    /// Sets how many arguments the calling convention exposes.
    pub fn max_arguments(mut self, count: usize) -> Self {
        self.settings.max_arguments = count;
        self
    }

    pub fn correlation_scope(mut self, scope: CorrelationScope) -> Self {
        self.settings.correlation_scope = scope;
        self
    }

    pub fn build(self) -> ProbeSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        assert_eq!(SettingsBuilder::new().build(), ProbeSettings::default());
    }

    #[test]
    fn test_mode_replaces_same_id() {
        let custom = ModeEntry {
            id: "cbc".to_string(),
            modules: vec![NamePattern::regex("cbc")],
            hooks: Some(vec![HookSpec::encrypt()]),
        };
        let settings = SettingsBuilder::new().mode(custom.clone()).build();
        assert_eq!(settings.modes.len(), 6);
        assert_eq!(settings.modes[1], custom);
    }

    #[test]
    fn test_only_modes_and_limits() {
        let settings = SettingsBuilder::new()
            .only_modes(&["ctr"])
            .without_key_sources()
            .key_source(KeySource::portable_aes())
            .max_arguments(4)
            .build();
        assert_eq!(settings.modes, vec![ModeEntry::raw("ctr")]);
        assert_eq!(settings.key_sources, vec![KeySource::portable_aes()]);
        assert_eq!(settings.max_arguments, 4);
    }
}
