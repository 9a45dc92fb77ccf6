//! Partitioning of an object into consecutive byte ranges.
//!

use std::fmt::{Display, Formatter};

/// An inclusive byte range `[start, end]` within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Create a new range. `end` is inclusive and must not be less than `start`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    /// The first byte of the range.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// The last byte of the range, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// The number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Format as an HTTP `Range` header value, e.g. `bytes=0-99`.
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl Display for ByteRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// The number of ranges needed to cover `total_size` bytes with `chunk_size` sized ranges.
pub fn range_count(total_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size)
}

/// Iterate the ranges that tile `[0, total_size)`, the last one truncated to the remainder.
pub fn ranges(total_size: u64, chunk_size: u64) -> Ranges {
    Ranges {
        next: 0,
        total_size,
        chunk_size,
    }
}

/// Iterator returned by [`ranges`].
#[derive(Debug, Clone)]
pub struct Ranges {
    next: u64,
    total_size: u64,
    chunk_size: u64,
}

impl Iterator for Ranges {
    type Item = ByteRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.chunk_size == 0 || self.next >= self.total_size {
            return None;
        }

        let start = self.next;
        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(self.total_size - 1);
        self.next = end + 1;

        Some(ByteRange::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(range_count(
            self.total_size.saturating_sub(self.next),
            self.chunk_size,
        ))
        .ok();
        (remaining.unwrap_or(usize::MAX), remaining)
    }
}
