use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide submission sequence.
///
/// Orders futures by the moment they were submitted; used as the tie-break when
/// several upstreams block the same run.
static SUBMIT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Returns next sequence value.
pub(crate) fn next_seq() -> u64 {
    SUBMIT_SEQ.fetch_add(1, Ordering::Relaxed)
}
