//! Stored channels: per-(network, channel) data bags.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::casemap::irc_to_lower;
use crate::error::StoreError;

/// A persisted channel record.
///
/// Carries no access of its own; it is a data bag for external consumers,
/// keyed by network id and case-folded name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChannel {
    net_id: String,
    name: String,
    /// Opaque per-channel values owned by external consumers.
    #[serde(default)]
    pub data: HashMap<String, Vec<u8>>,
}

impl StoredChannel {
    /// Create a channel record for a network.
    pub fn new(net_id: &str, name: &str) -> Self {
        StoredChannel {
            net_id: net_id.to_string(),
            name: name.to_string(),
            data: HashMap::new(),
        }
    }

    /// The owning network id.
    pub fn net_id(&self) -> &str {
        &self.net_id
    }

    /// The original-case channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The persistence key: network id and folded name, NUL-joined so the
    /// parts cannot collide.
    pub fn key(&self) -> String {
        make_key(&self.net_id, &self.name)
    }

    /// Encode for the KV store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode a KV record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// KV key for a (network, channel) pair.
pub(crate) fn make_key(net_id: &str, name: &str) -> String {
    format!("{}\0{}", net_id, irc_to_lower(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_folded_and_unambiguous() {
        let c = StoredChannel::new("net", "#Chan[1]");
        assert_eq!(c.key(), "net\0#chan{1}");
        assert_eq!(c.name(), "#Chan[1]");
        assert_eq!(c.net_id(), "net");
    }

    #[test]
    fn round_trips_with_data() {
        let mut c = StoredChannel::new("net", "#chan");
        c.data.insert("greeting".to_string(), b"hello".to_vec());
        let bytes = c.to_bytes().unwrap();
        let back = StoredChannel::from_bytes(&bytes).unwrap();
        assert_eq!(c, back);
    }

    #[test]
    fn corrupt_record_is_a_serialization_error() {
        assert!(matches!(
            StoredChannel::from_bytes(b"{"),
            Err(StoreError::Serialization(_))
        ));
    }
}
