//! Contiguous work partitions
//!
//! A phase covers an extent (rows, or boundary seeds) split into at most
//! `threads` contiguous ranges. Sizes differ by at most one and no range
//! is empty.

use std::ops::Range;

/// One worker's share of a phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Position of this partition among its siblings
    pub index: usize,
    /// Half-open range of the extent owned by this partition
    pub range: Range<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Split `extent` into `min(parts, extent)` contiguous partitions.
///
/// The first `extent % n` partitions get one extra element. An empty
/// extent yields no partitions; `parts == 0` is treated as one.
pub fn partition(extent: usize, parts: usize) -> Vec<Partition> {
    let count = parts.max(1).min(extent);
    if count == 0 {
        return Vec::new();
    }

    let base = extent / count;
    let extra = extent % count;
    let mut start = 0;
    (0..count)
        .map(|index| {
            let len = base + usize::from(index < extra);
            let range = start..start + len;
            start += len;
            Partition { index, range }
        })
        .collect()
}

/// Split a row-major buffer into the mutable row blocks of `partitions`.
///
/// `partitions` must be contiguous and start at row 0, as produced by
/// [`partition`]; the returned slices are in the same order.
pub fn split_rows_mut<'a, T>(data: &'a mut [T], cols: usize, partitions: &[Partition]) -> Vec<&'a mut [T]> {
    let mut rest = data;
    let mut blocks = Vec::with_capacity(partitions.len());
    for part in partitions {
        let take = (part.len() * cols).min(rest.len());
        let (block, tail) = std::mem::take(&mut rest).split_at_mut(take);
        blocks.push(block);
        rest = tail;
    }
    blocks
}
