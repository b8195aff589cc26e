use crate::error::{ProbeError, Result};

/// Algorithm and action parsed out of a mode symbol such as `CBC_encrypt`.
///
/// A field is `None` when the hook's descriptor does not declare that tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTags {
    pub algorithm: Option<String>,
    pub action: Option<String>,
}

impl SymbolTags {
    /// Keeps only the tags whose flag is set.
    pub fn retain(self, algorithm: bool, action: bool) -> Self {
        Self {
            algorithm: self.algorithm.filter(|_| algorithm),
            action: self.action.filter(|_| action),
        }
    }
}

/// Splits `{algorithm}_{action}` on the first separator.
///
/// A name without a separator, or with an empty half, is malformed.
pub fn derive_tags(symbol: &str) -> Result<SymbolTags> {
    match symbol.split_once('_') {
        Some((algorithm, action)) if !algorithm.is_empty() && !action.is_empty() => Ok(SymbolTags {
            algorithm: Some(algorithm.to_string()),
            action: Some(action.to_string()),
        }),
        _ => Err(ProbeError::MalformedSymbolName(symbol.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_symbols() {
        let tags = derive_tags("CBC_encrypt").unwrap();
        assert_eq!(tags.algorithm.as_deref(), Some("CBC"));
        assert_eq!(tags.action.as_deref(), Some("encrypt"));

        let tags = derive_tags("OFB_decrypt").unwrap();
        assert_eq!(tags.algorithm.as_deref(), Some("OFB"));
        assert_eq!(tags.action.as_deref(), Some("decrypt"));
    }

    #[test]
    fn test_split_on_first_separator_only() {
        let tags = derive_tags("pycrypto_CBC_encrypt").unwrap();
        assert_eq!(tags.algorithm.as_deref(), Some("pycrypto"));
        assert_eq!(tags.action.as_deref(), Some("CBC_encrypt"));
    }

    #[test]
    fn test_retain_drops_undeclared_tags() {
        let tags = derive_tags("CBC_encrypt").unwrap().retain(true, false);
        assert_eq!(tags.algorithm.as_deref(), Some("CBC"));
        assert_eq!(tags.action, None);
    }

    #[test]
    fn test_malformed_names() {
        for name in ["encrypt", "_encrypt", "CBC_", ""] {
            assert!(
                matches!(derive_tags(name), Err(ProbeError::MalformedSymbolName(_))),
                "{} should be malformed",
                name
            );
        }
    }
}
