//! Chunk scheduling: static split of the index space across origins, and
//! round-robin redistribution of an abandoned range.

use std::ops::Range;

/// Split `[0, total_chunks)` into `parts` contiguous ranges of near-equal size.
/// The first `total_chunks % parts` ranges get one extra index. Ranges may be empty
/// when there are more parts than chunks. Returns no ranges when `parts` is 0.
pub fn partition(total_chunks: u64, parts: usize) -> Vec<Range<u64>> {
    if parts == 0 {
        return vec![];
    }
    let n = parts as u64;
    let base = total_chunks / n;
    let remainder = total_chunks % n;
    let mut out = Vec::with_capacity(parts);
    let mut start = 0u64;
    for i in 0..n {
        let count = base + u64::from(i < remainder);
        out.push(start..start + count);
        start += count;
    }
    out
}

/// Pair each origin with its initial range, dropping origins whose range is empty.
pub fn assign_ranges<'a>(total_chunks: u64, origins: &'a [String]) -> Vec<(&'a str, Range<u64>)> {
    origins
        .iter()
        .zip(partition(total_chunks, origins.len()))
        .filter(|(_, range)| !range.is_empty())
        .map(|(origin, range)| (origin.as_str(), range))
        .collect()
}

/// Assign each index of `range` to an origin, round-robin in order.
/// Returns empty if `origins` is empty.
pub fn round_robin<'a>(range: Range<u64>, origins: &'a [String]) -> Vec<(u64, &'a str)> {
    if origins.is_empty() {
        return vec![];
    }
    range
        .enumerate()
        .map(|(i, index)| (index, origins[i % origins.len()].as_str()))
        .collect()
}
