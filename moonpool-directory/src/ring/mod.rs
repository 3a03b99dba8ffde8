//! Hash ring arithmetic.
//!
//! The directory partitions grain ownership over a 32-bit hash ring. Each
//! silo owns a handful of ranges (one per virtual bucket), and ownership
//! changes between membership views are expressed as range differences.
//!
//! - [`RingRange`]: a single `(start, end]` interval, possibly wrapping.
//! - [`RingRangeSet`]: a union of disjoint intervals.

mod range;
mod segments;
mod set;

pub use range::{RING_SIZE, RingRange};
pub use set::RingRangeSet;
