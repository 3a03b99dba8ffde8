//! A union of disjoint ring ranges.

use std::fmt;

use super::range::{RING_SIZE, RingRange, from_segments};
use super::segments::{self, Segment};

/// Set of hash values on the ring, stored as disjoint ranges.
///
/// Used to describe everything a silo owns in a directory view (one range
/// per virtual bucket, merged where adjacent), and to diff ownership between
/// two views.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RingRangeSet {
    segments: Vec<Segment>,
}

impl RingRangeSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The whole ring.
    pub fn full() -> Self {
        Self::from_ranges([RingRange::FULL])
    }

    /// Union of the given ranges. Overlapping or adjacent ranges merge.
    pub fn from_ranges(ranges: impl IntoIterator<Item = RingRange>) -> Self {
        let all = ranges.into_iter().flat_map(|r| r.segments()).collect();
        Self {
            segments: segments::normalize(all),
        }
    }

    /// Disjoint ranges making up this set, ordered by lower bound. A range
    /// wrapping through zero comes last.
    pub fn ranges(&self) -> Vec<RingRange> {
        from_segments(&self.segments)
    }

    /// Whether `hash` is in the set.
    pub fn contains(&self, hash: u32) -> bool {
        segments::contains(&self.segments, hash)
    }

    /// Whether the set shares at least one hash value with `range`.
    pub fn intersects(&self, range: &RingRange) -> bool {
        !segments::intersect(&self.segments, &range.segments()).is_empty()
    }

    /// Number of hash values covered.
    pub fn size(&self) -> u64 {
        segments::size(&self.segments)
    }

    /// Share of the ring covered, in percent.
    pub fn size_percent(&self) -> f64 {
        self.size() as f64 * 100.0 / RING_SIZE as f64
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the set covers the whole ring.
    pub fn is_full(&self) -> bool {
        self.size() == RING_SIZE
    }

    /// `self ∪ other`.
    pub fn union(&self, other: &RingRangeSet) -> RingRangeSet {
        let mut all = self.segments.clone();
        all.extend_from_slice(&other.segments);
        Self {
            segments: segments::normalize(all),
        }
    }

    /// `self \ other`.
    pub fn difference(&self, other: &RingRangeSet) -> RingRangeSet {
        Self {
            segments: segments::difference(&self.segments, &other.segments),
        }
    }

    /// `self ∩ other`.
    pub fn intersection(&self, other: &RingRangeSet) -> RingRangeSet {
        Self {
            segments: segments::intersect(&self.segments, &other.segments),
        }
    }
}

impl FromIterator<RingRange> for RingRangeSet {
    fn from_iter<I: IntoIterator<Item = RingRange>>(iter: I) -> Self {
        Self::from_ranges(iter)
    }
}

impl fmt::Debug for RingRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ranges()).finish()
    }
}
