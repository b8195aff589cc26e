use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One correlated cryptographic operation, as handed to the display side.
///
/// Fields that were never observed before the payload arrived stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoEvent {
    /// Position of this event in the session, starting at 1
    pub sequence: u64,
    /// Target thread that carried the payload
    pub thread_id: u64,
    pub captured_at: DateTime<Utc>,
    /// `encrypt` or `decrypt` for the stock mode hooks
    pub action: Option<String>,
    pub payload: String,
    /// Mode name taken from the symbol, e.g. `CBC`
    pub algorithm: Option<String>,
    pub key: Option<String>,
    pub iv: Option<String>,
    pub nonce: Option<String>,
    pub secret: Option<String>,
}

impl CryptoEvent {
    /// Renders the event as a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_serialize_as_null() {
        let event = CryptoEvent {
            sequence: 1,
            thread_id: 7,
            captured_at: Utc::now(),
            action: Some("encrypt".to_string()),
            payload: "HELLO".to_string(),
            algorithm: Some("CBC".to_string()),
            key: None,
            iv: Some("0x010203".to_string()),
            nonce: None,
            secret: None,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["action"], "encrypt");
        assert_eq!(value["iv"], "0x010203");
        assert!(value["key"].is_null());
        assert!(value["secret"].is_null());
    }
}
