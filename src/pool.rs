//! Process-wide pool of reusable block buffers.
//!
//! Every block read leases a buffer from this pool and returns it via
//! `release` once the block or iterator holding it is done. Buffers are
//! keyed by capacity only; a fetch is satisfied by any pooled buffer
//! large enough, resized to the requested length.

use parking_lot::Mutex;

// Bounds idle memory; anything beyond this is simply dropped.
const MAX_IDLE: usize = 32;

static POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());

/// Leases a zeroed buffer of exactly `size` bytes.
pub(crate) fn fetch(size: usize) -> Vec<u8> {
    if let Some(mut buf) = POOL.lock().pop() {
        if buf.capacity() >= size {
            buf.clear();
            buf.resize(size, 0);
            return buf;
        }
    }
    vec![0; size]
}

/// Returns a buffer to the pool. Zero-capacity buffers are rejected.
pub(crate) fn release(buf: Vec<u8>) {
    if buf.capacity() == 0 {
        return;
    }
    let mut pool = POOL.lock();
    if pool.len() < MAX_IDLE {
        pool.push(buf);
    }
}
