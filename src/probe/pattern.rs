//! Name patterns used to pick modules and exports.
//!
//! Matching is a pure function over an already-enumerated list. Patterns are
//! tried in declaration order and, for each one, the first item in
//! enumeration order wins. Enumeration order comes from the host engine and
//! is not stable across platforms, so ties between several matching items
//! are arbitrary.

use crate::error::{ProbeError, Result};
use crate::host::Named;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamePattern {
    /// Case-sensitive substring match
    Contains(String),
    /// Regular expression, searched anywhere in the name
    Regex(String),
}

impl NamePattern {
    pub fn contains(fragment: &str) -> Self {
        NamePattern::Contains(fragment.to_string())
    }

    pub fn regex(expression: &str) -> Self {
        NamePattern::Regex(expression.to_string())
    }

    pub fn compile(&self) -> Result<CompiledPattern> {
        match self {
            NamePattern::Contains(fragment) => Ok(CompiledPattern::Contains(fragment.clone())),
            NamePattern::Regex(expression) => Regex::new(expression)
                .map(CompiledPattern::Regex)
                .map_err(|source| ProbeError::InvalidPattern {
                    pattern: expression.clone(),
                    source,
                }),
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Contains(fragment) => write!(f, "contains '{}'", fragment),
            NamePattern::Regex(expression) => write!(f, "regex '{}'", expression),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Contains(String),
    Regex(Regex),
}

impl CompiledPattern {
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            CompiledPattern::Contains(fragment) => name.contains(fragment.as_str()),
            CompiledPattern::Regex(regex) => regex.is_match(name),
        }
    }
}

/// An ordered list of acceptable patterns for one logical target.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
    description: String,
}

impl PatternSet {
    pub fn compile(patterns: &[NamePattern]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(NamePattern::compile)
            .collect::<Result<Vec<_>>>()?;
        let description = patterns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            patterns: compiled,
            description: format!("[{}]", description),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Returns the first item accepted by the highest-priority pattern.
    pub fn first_match<'a, T: Named>(&self, items: &'a [T]) -> Option<&'a T> {
        self.patterns
            .iter()
            .find_map(|pattern| items.iter().find(|item| pattern.is_match(item.name())))
    }
}

impl fmt::Display for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
