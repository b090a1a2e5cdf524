//! Identity key the supervisor uses to decide whether a newly resolved LSL
//! stream is one it already has a worker for, grounded in the resolver's
//! `DiscoveredStream` dedup fields in the device-bridge LSL integration
//! this engine descends from.

use serde::{Deserialize, Serialize};

/// Uniquely identifies an upstream stream for the purposes of relay/monitor
/// spawn-once bookkeeping (spec.md §4.6). `content_type` is only included
/// when the key is built for a relay (two relays may legitimately share
/// name/source_id/hostname/channel_count across different content types,
/// but never for the same content type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub name: String,
    pub source_id: String,
    pub hostname: String,
    pub channel_count: u32,
    pub content_type: Option<String>,
}

impl StreamKey {
    pub fn new(name: impl Into<String>, source_id: impl Into<String>, hostname: impl Into<String>, channel_count: u32) -> Self {
        Self {
            name: name.into(),
            source_id: source_id.into(),
            hostname: hostname.into(),
            channel_count,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_with_different_content_type_are_distinct() {
        let a = StreamKey::new("eeg", "src1", "host1", 8).with_content_type("EEG");
        let b = StreamKey::new("eeg", "src1", "host1", 8).with_content_type("Markers");
        assert_ne!(a, b);
    }

    #[test]
    fn identical_fields_produce_equal_keys() {
        let a = StreamKey::new("eeg", "src1", "host1", 8);
        let b = StreamKey::new("eeg", "src1", "host1", 8);
        assert_eq!(a, b);
    }
}
