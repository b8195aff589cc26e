use crate::error::Result;
use crate::probe::correlation::CorrelationScope;
use crate::probe::format::DEFAULT_MAX_CAPTURE_LEN;
use crate::probe::pattern::NamePattern;
use crate::settings::hooks::{HookSpec, KeySource, ModeEntry, DEFAULT_MODES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Arguments reachable through the host's argument accessors by default.
pub const DEFAULT_MAX_ARGUMENTS: usize = 6;

/// File name of the configuration inside the user config directory.
pub const CONFIG_FILE_NAME: &str = "probe.toml";

/// Everything the probe needs to find and hook its targets.
///
/// Missing keys in a configuration file fall back to the defaults, which
/// describe the pycryptodome `_raw_*` backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Upper bound on bytes read for a single argument buffer
    pub max_capture_len: usize,

    /// Arguments the calling convention exposes to descriptors
    pub max_arguments: usize,

    /// Whether fragments are correlated session-wide or per target thread
    pub correlation_scope: CorrelationScope,

    /// The cryptographic acceleration module; nothing is hooked without it
    pub primary_module: Vec<NamePattern>,

    /// Key capture points, first resolvable one wins
    pub key_sources: Vec<KeySource>,

    /// Hooks installed in every mode module that does not override them
    pub mode_hooks: Vec<HookSpec>,

    /// Optional cipher-mode modules
    pub modes: Vec<ModeEntry>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            max_capture_len: DEFAULT_MAX_CAPTURE_LEN,
            max_arguments: DEFAULT_MAX_ARGUMENTS,
            correlation_scope: CorrelationScope::Global,
            primary_module: vec![NamePattern::contains("_raw_aesni")],
            key_sources: vec![KeySource::aesni(), KeySource::portable_aes()],
            mode_hooks: vec![
                HookSpec::start_operation(),
                HookSpec::encrypt(),
                HookSpec::decrypt(),
            ],
            modes: DEFAULT_MODES.iter().map(|id| ModeEntry::raw(id)).collect(),
        }
    }
}

impl ProbeSettings {
    /// Default location: `<config dir>/cipherprobe/probe.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cipherprobe").join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Loads `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_config_path() {
            Some(default) if default.is_file() => Self::load_from_file(default),
            _ => Ok(Self::default()),
        }
    }

    /// Renders the settings as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Saves current configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml()?;
        let mut file = fs::File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Writes the default configuration with every value commented out, so
    /// the file documents the defaults without overriding them.
    pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
        let serialized = Self::default().to_toml()?;

        let commented_out = serialized
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    line.to_string()
                } else {
                    format!("# {}", line)
                }
            })
            .collect::<Vec<String>>()
            .join("\n");

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(commented_out.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::descriptor::HookDescriptor;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cipherprobe-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_defaults_describe_pycryptodome() {
        let settings = ProbeSettings::default();
        assert_eq!(settings.primary_module, vec![NamePattern::contains("_raw_aesni")]);
        let ids: Vec<_> = settings.modes.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["ecb", "cbc", "cfb", "ofb", "ctr", "ocb"]);
        assert_eq!(settings.mode_hooks.len(), 3);
        assert_eq!(settings.correlation_scope, CorrelationScope::Global);
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let path = temp_path("round-trip.toml");
        let mut settings = ProbeSettings::default();
        settings.correlation_scope = CorrelationScope::PerThread;
        settings.save_to_file(&path).unwrap();

        let loaded = ProbeSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let text = r#"
            max_capture_len = 64
            correlation_scope = "per_thread"

            [[modes]]
            id = "gcm"
            modules = [{ contains = "_raw_gcm" }]
        "#;
        let settings: ProbeSettings = toml::from_str(text).unwrap();
        assert_eq!(settings.max_capture_len, 64);
        assert_eq!(settings.max_arguments, DEFAULT_MAX_ARGUMENTS);
        assert_eq!(settings.correlation_scope, CorrelationScope::PerThread);
        assert_eq!(settings.modes.len(), 1);
        assert_eq!(settings.key_sources.len(), 2);
        assert_eq!(settings.mode_hooks[1].descriptor, HookDescriptor::payload());
    }

    #[test]
    fn test_commented_template_parses_to_defaults() {
        let path = temp_path("template.toml");
        ProbeSettings::create_default_config_file(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content
            .lines()
            .all(|line| line.trim().is_empty() || line.starts_with('#')));
        assert_eq!(ProbeSettings::load_from_file(&path).unwrap(), ProbeSettings::default());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let missing = temp_path("does-not-exist.toml");
        assert!(ProbeSettings::load_or_default(Some(&missing)).is_err());
    }
}
