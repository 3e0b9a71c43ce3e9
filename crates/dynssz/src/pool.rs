//! Process-wide scratch resources.
//!
//! A static zero block backs `encode_zero_padding`, and decoded offset
//! tables borrow vectors from a small free list instead of allocating per
//! container. Both are initialized on first use and never mutated after
//! publication.

use std::sync::Mutex;

/// Zero bytes used for padding writes. Padding larger than this block is
/// written in chunks.
pub(crate) static ZERO_BLOCK: [u8; 256] = [0u8; 256];

const POOL_CAP: usize = 32;

static OFFSET_POOL: Mutex<Vec<Vec<usize>>> = Mutex::new(Vec::new());

/// Borrows an empty offset vector from the pool.
pub(crate) fn take_offsets() -> Vec<usize> {
    OFFSET_POOL
        .lock()
        .expect("offset pool poisoned")
        .pop()
        .unwrap_or_default()
}

/// Returns an offset vector to the pool. The vector is cleared; excess
/// vectors beyond the pool capacity are dropped.
pub(crate) fn give_offsets(mut offsets: Vec<usize>) {
    offsets.clear();
    let mut pool = OFFSET_POOL.lock().expect("offset pool poisoned");
    if pool.len() < POOL_CAP {
        pool.push(offsets);
    }
}
