//! Declarative argument layouts for intercepted functions.
//!
//! A `HookDescriptor` says which argument carries which piece of a buffer
//! (`Pointer` or `Length` of a fragment kind) and which tags are derived from
//! the symbol name. Descriptors come from configuration, so they are checked
//! once at setup against the calling convention and compiled into a
//! `ValidatedDescriptor` that the interception engine walks on every call.

use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Semantic role of one captured buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Key,
    Iv,
    Nonce,
    Secret,
    Payload,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FragmentKind::Key => "key",
            FragmentKind::Iv => "iv",
            FragmentKind::Nonce => "nonce",
            FragmentKind::Secret => "secret",
            FragmentKind::Payload => "payload",
        };
        f.write_str(name)
    }
}

/// What a single argument holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentRole {
    /// Address of the buffer for this fragment
    Pointer(FragmentKind),
    /// Byte length of the buffer for this fragment, read as a 32-bit integer
    Length(FragmentKind),
}

/// Tags taken from the intercepted symbol's own name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagRole {
    Algorithm,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentBinding {
    pub index: usize,
    pub role: ArgumentRole,
}

impl ArgumentBinding {
    pub fn new(index: usize, role: ArgumentRole) -> Self {
        Self { index, role }
    }
}

/// Argument layout of one hook, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookDescriptor {
    pub arguments: Vec<ArgumentBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagRole>,
}

impl HookDescriptor {
    /// `key_setup(key, key_len, ...)`: argument 0 is the key, argument 1 its length.
    pub fn key_setup() -> Self {
        Self::buffer_at(FragmentKind::Key, 0, 1)
    }

    /// `mode_start_operation(cipher, iv, iv_len, ...)`.
    pub fn start_operation(kind: FragmentKind) -> Self {
        Self::buffer_at(kind, 1, 2)
    }

    /// `mode_encrypt(state, in, out, data_len)` and its decrypt twin.
    pub fn payload() -> Self {
        Self {
            arguments: vec![
                ArgumentBinding::new(1, ArgumentRole::Pointer(FragmentKind::Payload)),
                ArgumentBinding::new(3, ArgumentRole::Length(FragmentKind::Payload)),
            ],
            tags: vec![TagRole::Algorithm, TagRole::Action],
        }
    }

    /// A single buffer with no tags.
    pub fn buffer_at(kind: FragmentKind, pointer: usize, length: usize) -> Self {
        Self {
            arguments: vec![
                ArgumentBinding::new(pointer, ArgumentRole::Pointer(kind)),
                ArgumentBinding::new(length, ArgumentRole::Length(kind)),
            ],
            tags: Vec::new(),
        }
    }

    /// Checks the layout against a calling convention exposing
    /// `max_arguments` arguments and compiles it.
    pub fn validate(&self, hook: &str, max_arguments: usize) -> Result<ValidatedDescriptor> {
        let mut pointers: HashMap<FragmentKind, usize> = HashMap::new();
        let mut lengths: HashMap<FragmentKind, usize> = HashMap::new();
        let mut used = vec![false; max_arguments];

        for binding in &self.arguments {
            let slot = used.get_mut(binding.index).ok_or_else(|| {
                ProbeError::invalid_descriptor(
                    hook,
                    format!(
                        "argument index {} is outside the {} available arguments",
                        binding.index, max_arguments
                    ),
                )
            })?;
            if *slot {
                return Err(ProbeError::invalid_descriptor(
                    hook,
                    format!("argument index {} is bound twice", binding.index),
                ));
            }
            *slot = true;

            let (table, kind, what) = match binding.role {
                ArgumentRole::Pointer(kind) => (&mut pointers, kind, "pointer"),
                ArgumentRole::Length(kind) => (&mut lengths, kind, "length"),
            };
            if table.insert(kind, binding.index).is_some() {
                return Err(ProbeError::invalid_descriptor(
                    hook,
                    format!("{} has more than one {} argument", kind, what),
                ));
            }
        }

        let mut slots = Vec::with_capacity(pointers.len());
        for (kind, pointer) in &pointers {
            let length = lengths.get(kind).copied().ok_or_else(|| {
                ProbeError::invalid_descriptor(hook, format!("{} pointer has no length argument", kind))
            })?;
            slots.push(BufferSlot {
                kind: *kind,
                pointer: *pointer,
                length,
            });
        }
        if let Some(kind) = lengths.keys().find(|kind| !pointers.contains_key(kind)) {
            return Err(ProbeError::invalid_descriptor(
                hook,
                format!("{} length has no pointer argument", kind),
            ));
        }
        if slots.is_empty() {
            return Err(ProbeError::invalid_descriptor(hook, "no buffer is captured"));
        }
        // Keep extraction order stable regardless of map iteration order
        slots.sort_by_key(|slot| slot.pointer);

        let mut tags = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            if tags.contains(tag) {
                return Err(ProbeError::invalid_descriptor(
                    hook,
                    format!("tag {:?} is declared twice", tag),
                ));
            }
            tags.push(*tag);
        }
        if !tags.is_empty() && !pointers.contains_key(&FragmentKind::Payload) {
            return Err(ProbeError::invalid_descriptor(
                hook,
                "symbol tags are only meaningful on a payload hook",
            ));
        }

        Ok(ValidatedDescriptor { slots, tags })
    }
}

/// A pointer/length argument pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSlot {
    pub kind: FragmentKind,
    pub pointer: usize,
    pub length: usize,
}

/// A descriptor that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDescriptor {
    slots: Vec<BufferSlot>,
    tags: Vec<TagRole>,
}

impl ValidatedDescriptor {
    pub fn slots(&self) -> &[BufferSlot] {
        &self.slots
    }

    pub fn derives(&self, tag: TagRole) -> bool {
        self.tags.contains(&tag)
    }

    pub fn derives_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn captures(&self, kind: FragmentKind) -> bool {
        self.slots.iter().any(|slot| slot.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shapes_validate() {
        let key = HookDescriptor::key_setup().validate("key", 6).unwrap();
        assert_eq!(
            key.slots(),
            &[BufferSlot {
                kind: FragmentKind::Key,
                pointer: 0,
                length: 1
            }]
        );
        assert!(!key.derives_tags());

        let iv = HookDescriptor::start_operation(FragmentKind::Iv)
            .validate("iv", 6)
            .unwrap();
        assert_eq!(iv.slots()[0].pointer, 1);
        assert_eq!(iv.slots()[0].length, 2);

        let payload = HookDescriptor::payload().validate("payload", 6).unwrap();
        assert!(payload.captures(FragmentKind::Payload));
        assert!(payload.derives(TagRole::Algorithm));
        assert!(payload.derives(TagRole::Action));
    }

    #[test]
    fn test_index_out_of_range() {
        let err = HookDescriptor::payload().validate("payload", 3).unwrap_err();
        assert!(err.to_string().contains("outside the 3 available arguments"));
    }

    #[test]
    fn test_index_bound_twice() {
        let descriptor = HookDescriptor {
            arguments: vec![
                ArgumentBinding::new(0, ArgumentRole::Pointer(FragmentKind::Key)),
                ArgumentBinding::new(0, ArgumentRole::Length(FragmentKind::Key)),
            ],
            tags: Vec::new(),
        };
        assert!(descriptor.validate("key", 6).is_err());
    }

    #[test]
    fn test_unpaired_roles() {
        let pointer_only = HookDescriptor {
            arguments: vec![ArgumentBinding::new(0, ArgumentRole::Pointer(FragmentKind::Iv))],
            tags: Vec::new(),
        };
        assert!(pointer_only.validate("iv", 6).is_err());

        let length_only = HookDescriptor {
            arguments: vec![
                ArgumentBinding::new(0, ArgumentRole::Pointer(FragmentKind::Iv)),
                ArgumentBinding::new(1, ArgumentRole::Length(FragmentKind::Iv)),
                ArgumentBinding::new(2, ArgumentRole::Length(FragmentKind::Nonce)),
            ],
            tags: Vec::new(),
        };
        assert!(length_only.validate("iv", 6).is_err());
    }

    #[test]
    fn test_tags_need_payload() {
        let mut descriptor = HookDescriptor::key_setup();
        descriptor.tags.push(TagRole::Action);
        assert!(descriptor.validate("key", 6).is_err());
    }

    #[test]
    fn test_multiple_slots_keep_argument_order() {
        let descriptor = HookDescriptor {
            arguments: vec![
                ArgumentBinding::new(3, ArgumentRole::Pointer(FragmentKind::Nonce)),
                ArgumentBinding::new(4, ArgumentRole::Length(FragmentKind::Nonce)),
                ArgumentBinding::new(1, ArgumentRole::Pointer(FragmentKind::Key)),
                ArgumentBinding::new(2, ArgumentRole::Length(FragmentKind::Key)),
            ],
            tags: Vec::new(),
        };
        let validated = descriptor.validate("ocb", 6).unwrap();
        let kinds: Vec<_> = validated.slots().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![FragmentKind::Key, FragmentKind::Nonce]);
    }

    #[test]
    fn test_toml_layout() {
        let text = r#"
            arguments = [
                { index = 1, role = { pointer = "payload" } },
                { index = 3, role = { length = "payload" } },
            ]
            tags = ["algorithm", "action"]
        "#;
        let descriptor: HookDescriptor = toml::from_str(text).unwrap();
        assert_eq!(descriptor, HookDescriptor::payload());
    }
}
