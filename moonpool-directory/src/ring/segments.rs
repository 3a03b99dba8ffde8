//! Linear segment arithmetic backing [`RingRange`](super::RingRange) and
//! [`RingRangeSet`](super::RingRangeSet).
//!
//! A ring range `(start, end]` is unrolled onto a line as one or two
//! segments `(lo, hi]` with `-1 <= lo < hi <= u32::MAX`. A wrapping range
//! becomes `(-1, end]` plus `(start, u32::MAX]`. Set operations on sorted,
//! disjoint segment lists are then plain interval sweeps, and the wrap is
//! re-joined when converting back.

/// Lowest segment bound: covers hash `0` as `(-1, ..]`.
pub(crate) const LO: i64 = -1;
/// Highest segment bound.
pub(crate) const HI: i64 = u32::MAX as i64;

/// A linear segment `(lo, hi]`, non-empty (`lo < hi`).
pub(crate) type Segment = (i64, i64);

/// Sort and merge overlapping or touching segments.
pub(crate) fn normalize(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.retain(|(lo, hi)| lo < hi);
    segments.sort_unstable();
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for (lo, hi) in segments {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Pairwise intersection of two normalized segment lists.
pub(crate) fn intersect(a: &[Segment], b: &[Segment]) -> Vec<Segment> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let lo = a[i].0.max(b[j].0);
        let hi = a[i].1.min(b[j].1);
        if lo < hi {
            out.push((lo, hi));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// Gaps of a normalized segment list over the whole ring.
pub(crate) fn complement(segments: &[Segment]) -> Vec<Segment> {
    let mut out = Vec::with_capacity(segments.len() + 1);
    let mut cursor = LO;
    for &(lo, hi) in segments {
        if cursor < lo {
            out.push((cursor, lo));
        }
        cursor = hi;
    }
    if cursor < HI {
        out.push((cursor, HI));
    }
    out
}

/// `a \ b` for normalized segment lists.
pub(crate) fn difference(a: &[Segment], b: &[Segment]) -> Vec<Segment> {
    intersect(a, &complement(b))
}

/// Number of hash values covered by a normalized segment list.
pub(crate) fn size(segments: &[Segment]) -> u64 {
    segments.iter().map(|(lo, hi)| (hi - lo) as u64).sum()
}

/// Whether `hash` falls in any segment.
pub(crate) fn contains(segments: &[Segment], hash: u32) -> bool {
    let hash = hash as i64;
    segments.iter().any(|&(lo, hi)| lo < hash && hash <= hi)
}
