//! A single interval on the 32-bit hash ring.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::segments::{self, HI, LO, Segment};

/// Number of points on the ring (`2^32`).
pub const RING_SIZE: u64 = 1 << 32;

/// Half-open interval `(start, end]` on the 32-bit hash ring.
///
/// A range with `start > end` wraps through zero: it covers
/// `start + 1 ..= u32::MAX` and `0 ..= end`. Besides proper intervals there
/// are two distinguished values, [`RingRange::EMPTY`] and
/// [`RingRange::FULL`].
///
/// Every proper subset of the ring that forms one contiguous interval has
/// exactly one representation, so structural equality is set equality.
///
/// All operations are total. Ranges have no default value: an
/// uninitialised range cannot be expressed, so [`size`](Self::size) is
/// always defined.
///
/// ```text
/// Non-wrapping (start < end)       Wrapping (start > end)
/// |-----s=======e-----|            |====e-------s=====|
/// 0                   MAX          0                  MAX
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingRange(Repr);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum Repr {
    Empty,
    Full,
    Span { start: u32, end: u32 },
}

impl RingRange {
    /// The range containing no hash values.
    pub const EMPTY: RingRange = RingRange(Repr::Empty);
    /// The range containing every hash value.
    pub const FULL: RingRange = RingRange(Repr::Full);

    /// Create `(start, end]`. `start == end` yields [`RingRange::EMPTY`].
    pub fn create(start: u32, end: u32) -> Self {
        if start == end {
            Self::EMPTY
        } else {
            Self(Repr::Span { start, end })
        }
    }

    /// The `index`-th of `parts` equal slices of the ring.
    ///
    /// Slice 0 starts at hash 0. `parts == 1` gives the full ring; an
    /// out-of-bounds index (or zero parts) gives the empty range.
    pub fn equally_divided(parts: u32, index: u32) -> Self {
        if parts == 0 || index >= parts {
            return Self::EMPTY;
        }
        if parts == 1 {
            return Self::FULL;
        }
        let bound = |i: u32| (RING_SIZE * i as u64 / parts as u64) as u32;
        Self::create(bound(index), bound(index + 1))
    }

    /// Exclusive lower bound. `0` for the empty and full ranges.
    pub fn start(&self) -> u32 {
        match self.0 {
            Repr::Span { start, .. } => start,
            Repr::Empty | Repr::Full => 0,
        }
    }

    /// Inclusive upper bound. `0` for the empty and full ranges.
    pub fn end(&self) -> u32 {
        match self.0 {
            Repr::Span { end, .. } => end,
            Repr::Empty | Repr::Full => 0,
        }
    }

    /// Whether this range contains no hash values.
    pub fn is_empty(&self) -> bool {
        matches!(self.0, Repr::Empty)
    }

    /// Whether this range contains every hash value.
    pub fn is_full(&self) -> bool {
        matches!(self.0, Repr::Full)
    }

    /// Whether this range crosses the ring's zero point.
    pub fn is_wrapped(&self) -> bool {
        matches!(self.0, Repr::Span { start, end } if start > end)
    }

    /// Whether `hash` is in the range.
    pub fn contains(&self, hash: u32) -> bool {
        match self.0 {
            Repr::Empty => false,
            Repr::Full => true,
            Repr::Span { start, end } if start < end => start < hash && hash <= end,
            Repr::Span { start, end } => hash > start || hash <= end,
        }
    }

    /// Number of hash values covered. The full ring is `2^32`.
    pub fn size(&self) -> u64 {
        match self.0 {
            Repr::Empty => 0,
            Repr::Full => RING_SIZE,
            Repr::Span { start, end } => end.wrapping_sub(start) as u64,
        }
    }

    /// Share of the ring covered, in percent.
    pub fn size_percent(&self) -> f64 {
        self.size() as f64 * 100.0 / RING_SIZE as f64
    }

    /// The ring minus this range.
    pub fn complement(&self) -> Self {
        match self.0 {
            Repr::Empty => Self::FULL,
            Repr::Full => Self::EMPTY,
            Repr::Span { start, end } => Self(Repr::Span {
                start: end,
                end: start,
            }),
        }
    }

    /// Whether the two ranges share at least one hash value.
    pub fn intersects(&self, other: &RingRange) -> bool {
        !segments::intersect(&self.segments(), &other.segments()).is_empty()
    }

    /// The sub-ranges shared by both ranges (at most two).
    ///
    /// Two pieces arise when both ranges wrap around, or one wraps and the
    /// other overlaps both of its ends.
    pub fn intersections(&self, other: &RingRange) -> Vec<RingRange> {
        from_segments(&segments::intersect(&self.segments(), &other.segments()))
    }

    /// `self \ other`: zero, one or two disjoint sub-ranges.
    ///
    /// Two pieces are returned when `other` lies strictly inside `self`.
    pub fn difference(&self, other: &RingRange) -> Vec<RingRange> {
        from_segments(&segments::difference(&self.segments(), &other.segments()))
    }

    /// `self ∪ other`: one range when the operands overlap or touch,
    /// otherwise both operands.
    pub fn union(&self, other: &RingRange) -> Vec<RingRange> {
        let mut all = self.segments();
        all.extend(other.segments());
        from_segments(&segments::normalize(all))
    }

    /// Unroll onto the line: zero, one or two sorted segments.
    pub(crate) fn segments(&self) -> Vec<Segment> {
        match self.0 {
            Repr::Empty => Vec::new(),
            Repr::Full => vec![(LO, HI)],
            Repr::Span { start, end } if start < end => vec![(start as i64, end as i64)],
            Repr::Span { start, end } => {
                let mut out = vec![(LO, end as i64)];
                if start < u32::MAX {
                    out.push((start as i64, HI));
                }
                out
            }
        }
    }
}

/// Convert normalized segments back to ring ranges, re-joining the piece
/// that ends at `u32::MAX` with the piece that starts at zero.
///
/// Ranges come back ordered by their lower bound.
pub(crate) fn from_segments(segments: &[Segment]) -> Vec<RingRange> {
    match segments {
        [] => Vec::new(),
        [(LO, HI)] => vec![RingRange::FULL],
        [first, middle @ .., last] if first.0 == LO && last.1 == HI => {
            let mut out: Vec<RingRange> = middle.iter().map(|&s| span(s)).collect();
            out.push(RingRange::create(last.0 as u32, first.1 as u32));
            out
        }
        _ => segments.iter().map(|&s| span(s)).collect(),
    }
}

/// A single segment as a ring range; `lo == -1` maps to `start == u32::MAX`.
fn span((lo, hi): Segment) -> RingRange {
    RingRange::create(lo as u32, hi as u32)
}

impl fmt::Debug for RingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for RingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Repr::Empty => write!(f, "<empty>"),
            Repr::Full => write!(f, "<full>"),
            Repr::Span { start, end } => write!(
                f,
                "({start:#010x}, {end:#010x}] {:.2}%",
                self.size_percent()
            ),
        }
    }
}
