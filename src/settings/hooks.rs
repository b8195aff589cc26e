use crate::probe::descriptor::{FragmentKind, HookDescriptor};
use crate::probe::pattern::NamePattern;
use serde::{Deserialize, Serialize};

/// One function to intercept: how to find it and how to read its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSpec {
    /// Short name used in logs and reports
    pub name: String,
    /// Acceptable export names, highest priority first
    pub symbol: Vec<NamePattern>,
    pub descriptor: HookDescriptor,
}

impl HookSpec {
    pub fn new(name: &str, symbol: Vec<NamePattern>, descriptor: HookDescriptor) -> Self {
        Self {
            name: name.to_string(),
            symbol,
            descriptor,
        }
    }

    /// `*_start_operation(cipher, iv, iv_len, ...)`
    pub fn start_operation() -> Self {
        Self::new(
            "start_operation",
            vec![NamePattern::contains("_start_operation")],
            HookDescriptor::start_operation(FragmentKind::Iv),
        )
    }

    /// `*_encrypt(state, in, out, data_len)`
    pub fn encrypt() -> Self {
        Self::new(
            "encrypt",
            vec![NamePattern::contains("_encrypt")],
            HookDescriptor::payload(),
        )
    }

    /// `*_decrypt(state, in, out, data_len)`
    pub fn decrypt() -> Self {
        Self::new(
            "decrypt",
            vec![NamePattern::contains("_decrypt")],
            HookDescriptor::payload(),
        )
    }
}

/// A place the cipher key can be captured from.
///
/// Sources are tried in order and the first one that resolves is hooked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySource {
    /// Module to search; the primary module when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<Vec<NamePattern>>,
    pub hook: HookSpec,
}

impl KeySource {
    /// `AESNI_start_operation(key, key_len, ...)` in the primary module.
    pub fn aesni() -> Self {
        Self {
            module: None,
            hook: HookSpec::new(
                "key_setup",
                vec![NamePattern::contains("AESNI_start_operation")],
                HookDescriptor::key_setup(),
            ),
        }
    }

    /// Portable `AES_start_operation(key, key_len, ...)` in `_raw_aes`.
    pub fn portable_aes() -> Self {
        Self {
            // Anchored so that `_raw_aesni` does not match
            module: Some(vec![NamePattern::regex(r"^_raw_aes\.")]),
            hook: HookSpec::new(
                "key_setup",
                vec![NamePattern::contains("AES_start_operation")],
                HookDescriptor::key_setup(),
            ),
        }
    }
}

/// A cipher-mode backend that may or may not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeEntry {
    /// Logical mode identifier, e.g. `cbc`
    pub id: String,
    /// Acceptable module names, highest priority first
    pub modules: Vec<NamePattern>,
    /// Hooks for this mode; the shared `mode_hooks` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Vec<HookSpec>>,
}

impl ModeEntry {
    /// A pycryptodome `_raw_<id>` mode module using the shared hooks.
    pub fn raw(id: &str) -> Self {
        Self {
            id: id.to_string(),
            modules: vec![NamePattern::contains(&format!("_raw_{}", id))],
            hooks: None,
        }
    }
}

/// Modes hooked by default, in hook installation order.
pub const DEFAULT_MODES: &[&str] = &["ecb", "cbc", "cfb", "ofb", "ctr", "ocb"];
