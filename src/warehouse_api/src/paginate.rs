//! Fixed-size batching of fully materialized result sets.

use std::num::NonZeroUsize;

use serde::Serialize;

/// Batch size used when a request does not specify one.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => panic!("default batch size must be non-zero"),
};

/// One batch of a result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchedResponse<T> {
    /// Zero-based batch index that was requested.
    pub batch_id: usize,
    /// `ceil(len / batch_size)` over the full result set.
    pub total_batches: usize,
    /// Records of this batch; empty when `batch_id` is past the end.
    pub records: Vec<T>,
    /// Whether a later batch holds records.
    pub has_more: bool,
}

/// Cuts batch `batch_id` of `batch_size` records out of `full`.
///
/// Boundaries depend only on `(full.len(), batch_size, batch_id)`, so a client
/// walking `0..total_batches` over an unchanged result set sees every record
/// exactly once. Ids past the end give an empty batch, not an error.
pub fn paginate<T>(full: Vec<T>, batch_size: NonZeroUsize, batch_id: usize) -> BatchedResponse<T> {
    let len = full.len();
    let size = batch_size.get();
    let start = batch_id.saturating_mul(size);
    let end = start.saturating_add(size);

    let records = if start >= len {
        Vec::new()
    } else {
        full.into_iter().skip(start).take(size).collect()
    };

    BatchedResponse {
        batch_id,
        total_batches: len.div_ceil(size),
        records,
        has_more: end < len,
    }
}
