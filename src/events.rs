//! Byte-exact arbiter event topics and the small helpers for pulling
//! `suspect`/`last_time` out of a log's indexed topics.

use crate::encoding::{u64_from_u256_be, word_from_slice};
use crate::error::Result;

pub const NEW_OPTIMISTIC_STATE: [u8; 32] = [
    0x47, 0x79, 0xc4, 0xb0, 0x7a, 0xbf, 0xf8, 0x2b, 0x16, 0x06, 0x1e, 0xc9, 0xa4, 0x7d, 0x08, 0x1e,
    0x7f, 0x49, 0x81, 0xc2, 0x90, 0x88, 0x39, 0x5c, 0xdb, 0x7f, 0xf8, 0x7e, 0x32, 0x2c, 0xbb, 0xc6,
];
pub const NEW_OPTIMISTIC_STATES: [u8; 32] = [
    0x0b, 0x87, 0xb1, 0x36, 0x84, 0x0d, 0x19, 0xf5, 0xf2, 0x53, 0x29, 0x27, 0x30, 0x82, 0xc0, 0x08,
    0x33, 0x26, 0x5a, 0x18, 0x9b, 0x70, 0x13, 0x7e, 0x06, 0xdf, 0x63, 0x15, 0xdd, 0xc7, 0x83, 0x9e,
];
pub const NEW_STATE: [u8; 32] = [
    0x0f, 0x50, 0x25, 0xcc, 0x4f, 0x20, 0xaa, 0x47, 0xa3, 0x46, 0xd1, 0xb7, 0xd9, 0xda, 0x6b, 0xa8,
    0xc6, 0x8c, 0xc8, 0xe8, 0x3b, 0x75, 0xe8, 0x13, 0xda, 0x4b, 0x44, 0x90, 0xd5, 0x53, 0x65, 0xae,
];
pub const FRAUD_PROVEN: [u8; 32] = [
    0xa6, 0x62, 0x90, 0xbc, 0x21, 0xce, 0xe2, 0xba, 0x1a, 0x3c, 0x6b, 0xa2, 0xca, 0xc2, 0x1d, 0x24,
    0x51, 0x1c, 0xea, 0x1f, 0x9e, 0xd7, 0xef, 0xe4, 0x53, 0x73, 0x6f, 0x24, 0xfd, 0x89, 0x48, 0x86,
];
pub const LOCKED: [u8; 32] = [
    0x87, 0x73, 0xbd, 0xe6, 0x58, 0x1a, 0xd6, 0xdd, 0xd4, 0x21, 0x21, 0x0d, 0xe8, 0x67, 0x34, 0x00,
    0x39, 0xfb, 0x65, 0xce, 0x3d, 0xf4, 0x1e, 0xdb, 0xa7, 0xb5, 0xde, 0x6d, 0x24, 0xae, 0x7a, 0x51,
];
pub const UNLOCKED: [u8; 32] = [
    0x52, 0x45, 0x12, 0x34, 0x4e, 0x53, 0x5e, 0x9b, 0xda, 0x79, 0xe9, 0x16, 0xc2, 0xea, 0x8c, 0x7b,
    0x9e, 0x5d, 0x23, 0xd8, 0x3e, 0x1b, 0x95, 0x18, 0x1d, 0x76, 0x22, 0xb4, 0xac, 0x3d, 0x42, 0x93,
];
pub const ROLLED_BACK: [u8; 32] = [
    0x4d, 0x7e, 0xd8, 0xc4, 0x9e, 0x6b, 0x03, 0xda, 0xee, 0x23, 0xa1, 0x8f, 0x4b, 0xd1, 0x4b, 0xd7,
    0xe4, 0x62, 0x8e, 0x5e, 0xd5, 0x4c, 0x57, 0xbf, 0x84, 0x40, 0x7a, 0x69, 0x38, 0x67, 0xec, 0xa9,
];

/// Both "new optimistic state(s)" topics — the set §4.7 step 3 matches
/// against to locate the one relevant log in a receipt.
pub const OPTIMISTIC_STATE_TOPICS: [[u8; 32]; 2] = [NEW_OPTIMISTIC_STATE, NEW_OPTIMISTIC_STATES];

/// A single decoded log entry: topics plus opaque data, exactly as a
/// chain adapter would hand it back from a receipt.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// Find the one log whose first topic is an optimistic-state event and
/// pull `suspect`/`last_time` from topic[1]/topic[2]. `None` means "not
/// an optimistic record" per §4.7 step 3.
pub fn find_optimistic_log(logs: &[LogEntry]) -> Result<Option<(crate::encoding::Address, u64)>> {
    for log in logs {
        let Some(topic0) = log.topics.first() else {
            continue;
        };
        if OPTIMISTIC_STATE_TOPICS.contains(topic0) {
            let suspect_word = log
                .topics
                .get(1)
                .ok_or_else(|| crate::error::EngineError::DecodeError("missing suspect topic".into()))?;
            let suspect = crate::encoding::address_from_slice(&suspect_word[12..])?;
            let last_time_word = log
                .topics
                .get(2)
                .ok_or_else(|| crate::error::EngineError::DecodeError("missing last_time topic".into()))?;
            let last_time = u64_from_u256_be(&word_from_slice(last_time_word)?)?;
            return Ok(Some((suspect, last_time)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_word(addr_or_time: &[u8]) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[32 - addr_or_time.len()..].copy_from_slice(addr_or_time);
        w
    }

    #[test]
    fn finds_matching_log_and_extracts_fields() {
        let suspect = [0x11u8; 20];
        let last_time: u64 = 42;
        let logs = vec![
            LogEntry { topics: vec![NEW_STATE], data: vec![] },
            LogEntry {
                topics: vec![NEW_OPTIMISTIC_STATE, topic_word(&suspect), topic_word(&last_time.to_be_bytes())],
                data: vec![],
            },
        ];
        let (found_suspect, found_time) = find_optimistic_log(&logs).unwrap().unwrap();
        assert_eq!(found_suspect, suspect);
        assert_eq!(found_time, last_time);
    }

    #[test]
    fn returns_none_when_no_optimistic_log_present() {
        let logs = vec![LogEntry { topics: vec![NEW_STATE], data: vec![] }];
        assert!(find_optimistic_log(&logs).unwrap().is_none());
    }
}
