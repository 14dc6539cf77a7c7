//! Id and clock utilities shared across the governance engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_ENQUEUE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Milliseconds since the UNIX epoch. Used for all audit/session timestamps.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis()
        as u64
}

/// Next monotonic enqueue sequence number for audit events (starts at 1).
///
/// Used to prove ordering: for any successful flush, `event[i].enqueue_seq <
/// event[i+1].enqueue_seq`.
pub fn next_enqueue_seq() -> u64 {
    NEXT_ENQUEUE_SEQ.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_seq_is_monotonic() {
        let a = next_enqueue_seq();
        let b = next_enqueue_seq();
        assert!(b > a);
    }

    #[test]
    fn now_ms_is_plausible() {
        // Any time after 2024-01-01T00:00:00Z in millis.
        assert!(now_ms() > 1_700_000_000_000);
    }
}
