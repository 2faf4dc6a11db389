//! Chunk planning and claiming.

use std::sync::Mutex;

/// Inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Range` request header for this chunk.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Split `[0, total)` into consecutive ranges of `chunk_size` bytes; the
/// last one may be shorter. An empty file has no chunks.
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<ChunkRange> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(total.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total) - 1;
        chunks.push(ChunkRange { start, end });
        start = end + 1;
    }
    chunks
}

/// Hands out pending ranges to workers, each exactly once, in order.
pub struct ChunkCursor {
    pending: Vec<ChunkRange>,
    next: Mutex<usize>,
}

impl ChunkCursor {
    pub fn new(pending: Vec<ChunkRange>) -> Self {
        Self {
            pending,
            next: Mutex::new(0),
        }
    }

    pub fn claim(&self) -> Option<ChunkRange> {
        let mut next = self.next.lock().unwrap_or_else(|p| p.into_inner());
        let range = self.pending.get(*next).copied()?;
        *next += 1;
        Some(range)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
