//! Ring ownership derived from a membership snapshot.
//!
//! Every live silo places `buckets_per_silo` virtual buckets on the 32-bit
//! ring. A bucket at boundary `b` owns the arc `(previous boundary, b]`;
//! the first bucket also owns the arc wrapping through zero. Every silo
//! computes the same assignment from the same snapshot, so any silo can
//! route a grain to its owner without coordination.
//!
//! # Orleans Reference
//!
//! Corresponds to Orleans' `DirectoryMembershipSnapshot` used by
//! `DistributedGrainDirectory` (30 virtual buckets per silo by default).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::membership::{ClusterMembershipSnapshot, MembershipService, MembershipVersion};
use crate::ring::{RingRange, RingRangeSet};
use crate::silo::SiloAddress;
use crate::types::GrainId;

/// Places a silo's virtual buckets on the ring.
///
/// Must be stable across processes: every silo has to derive the same
/// boundaries from the same membership.
pub trait BucketHasher: Send + Sync + fmt::Debug {
    /// Ring position of virtual bucket `bucket` of `silo`.
    fn bucket_hash(&self, silo: &SiloAddress, bucket: u32) -> u32;
}

/// [`BucketHasher`] backed by [`SiloAddress::bucket_hash`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBucketHasher;

impl BucketHasher for DefaultBucketHasher {
    fn bucket_hash(&self, silo: &SiloAddress, bucket: u32) -> u32 {
        silo.bucket_hash(bucket)
    }
}

/// Result of resolving a ring position against a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingOwner {
    /// The view has no live members.
    NoOwner,
    /// The asking silo owns the position.
    Local,
    /// Another silo owns the position.
    Remote(SiloAddress),
}

/// Deterministic partition of the hash ring over the live members of one
/// membership snapshot.
///
/// With at least one live member, the members' ranges are pairwise
/// disjoint, their union is the full ring, and every live member owns a
/// non-empty range.
#[derive(Debug)]
pub struct DirectoryMembershipSnapshot {
    snapshot: Arc<ClusterMembershipSnapshot>,
    members: Vec<SiloAddress>,
    boundaries: Vec<(u32, SiloAddress)>,
    bucket_ranges: HashMap<SiloAddress, Vec<RingRange>>,
    member_ranges: HashMap<SiloAddress, RingRangeSet>,
}

impl DirectoryMembershipSnapshot {
    /// Build the view of `snapshot`.
    ///
    /// `buckets_per_silo` below 1 is treated as 1. A bucket whose hash is
    /// already taken moves forward to the next free ring position, so every
    /// bucket keeps a boundary of its own.
    pub fn new(
        snapshot: Arc<ClusterMembershipSnapshot>,
        hasher: &dyn BucketHasher,
        buckets_per_silo: u32,
    ) -> Self {
        let members = snapshot.live_members();
        let buckets = buckets_per_silo.max(1);

        let mut candidates: Vec<(u32, SiloAddress)> = members
            .iter()
            .flat_map(|silo| (0..buckets).map(move |b| (hasher.bucket_hash(silo, b), silo.clone())))
            .collect();
        candidates.sort();
        // Collisions are resolved in (hash, silo) order so every silo agrees.
        let mut taken: HashSet<u32> = HashSet::with_capacity(candidates.len());
        let mut boundaries: Vec<(u32, SiloAddress)> = candidates
            .into_iter()
            .map(|(mut hash, silo)| {
                while !taken.insert(hash) {
                    hash = hash.wrapping_add(1);
                }
                (hash, silo)
            })
            .collect();
        boundaries.sort();

        let mut bucket_ranges: HashMap<SiloAddress, Vec<RingRange>> = HashMap::new();
        let count = boundaries.len();
        for (i, (end, owner)) in boundaries.iter().enumerate() {
            let range = if count == 1 {
                RingRange::FULL
            } else {
                let (start, _) = &boundaries[(i + count - 1) % count];
                RingRange::create(*start, *end)
            };
            bucket_ranges.entry(owner.clone()).or_default().push(range);
        }

        let member_ranges = bucket_ranges
            .iter()
            .map(|(silo, ranges)| (silo.clone(), RingRangeSet::from_ranges(ranges.iter().copied())))
            .collect();

        tracing::debug!(
            version = %snapshot.version,
            members = members.len(),
            boundaries = count,
            "built directory view"
        );

        Self {
            snapshot,
            members,
            boundaries,
            bucket_ranges,
            member_ranges,
        }
    }

    /// Membership version this view was built from.
    pub fn version(&self) -> MembershipVersion {
        self.snapshot.version
    }

    /// Live members taking part in the partition, sorted.
    pub fn members(&self) -> &[SiloAddress] {
        &self.members
    }

    /// The membership snapshot this view was built from.
    pub fn cluster_snapshot(&self) -> &Arc<ClusterMembershipSnapshot> {
        &self.snapshot
    }

    /// Owner of ring position `hash`, `None` only without live members.
    ///
    /// The owner is the silo of the first boundary at or after `hash`,
    /// wrapping to the first boundary.
    pub fn get_owner(&self, hash: u32) -> Option<&SiloAddress> {
        if self.boundaries.is_empty() {
            return None;
        }
        let idx = self.boundaries.partition_point(|(b, _)| *b < hash);
        let (_, owner) = &self.boundaries[idx % self.boundaries.len()];
        Some(owner)
    }

    /// Owner of `grain_id`'s ring position.
    pub fn get_owner_for_grain(&self, grain_id: &GrainId) -> Option<&SiloAddress> {
        self.get_owner(grain_id.uniform_hash())
    }

    /// Owner of `hash` from the point of view of silo `local`.
    pub fn resolve_owner(&self, hash: u32, local: &SiloAddress) -> RingOwner {
        match self.get_owner(hash) {
            None => RingOwner::NoOwner,
            Some(owner) if owner == local => RingOwner::Local,
            Some(owner) => RingOwner::Remote(owner.clone()),
        }
    }

    /// Everything `member` owns, merged. Empty for non-members.
    pub fn get_member_ranges(&self, member: &SiloAddress) -> RingRangeSet {
        self.member_ranges.get(member).cloned().unwrap_or_default()
    }

    /// One range per virtual bucket of `member`, unmerged, in ring order.
    pub fn get_member_bucket_ranges(&self, member: &SiloAddress) -> Vec<RingRange> {
        self.bucket_ranges.get(member).cloned().unwrap_or_default()
    }
}

/// Caches the [`DirectoryMembershipSnapshot`] of the newest membership
/// version.
///
/// The view is rebuilt only when the membership version moved.
#[derive(Debug)]
pub struct DirectoryMembershipService {
    membership: Arc<dyn MembershipService>,
    hasher: Arc<dyn BucketHasher>,
    buckets_per_silo: u32,
    current: Mutex<Option<Arc<DirectoryMembershipSnapshot>>>,
}

impl DirectoryMembershipService {
    /// Create a view service over `membership`.
    pub fn new(
        membership: Arc<dyn MembershipService>,
        hasher: Arc<dyn BucketHasher>,
        buckets_per_silo: u32,
    ) -> Self {
        Self {
            membership,
            hasher,
            buckets_per_silo,
            current: Mutex::new(None),
        }
    }

    /// The underlying membership service.
    pub fn membership(&self) -> &Arc<dyn MembershipService> {
        &self.membership
    }

    /// View of the newest membership snapshot.
    pub fn current_view(&self) -> Arc<DirectoryMembershipSnapshot> {
        self.view_of(self.membership.current_snapshot())
    }

    /// View of `snapshot`, reusing the cached view if the version matches.
    ///
    /// The cache only moves forward: an older snapshot gets a fresh view
    /// without replacing the cached one.
    pub fn view_of(
        &self,
        snapshot: Arc<ClusterMembershipSnapshot>,
    ) -> Arc<DirectoryMembershipSnapshot> {
        let mut current = self.current.lock();
        if let Some(view) = current.as_ref() {
            if view.version() == snapshot.version {
                return Arc::clone(view);
            }
            if view.version() > snapshot.version {
                return Arc::new(self.build(snapshot));
            }
        }
        let view = Arc::new(self.build(snapshot));
        *current = Some(Arc::clone(&view));
        view
    }

    fn build(&self, snapshot: Arc<ClusterMembershipSnapshot>) -> DirectoryMembershipSnapshot {
        DirectoryMembershipSnapshot::new(snapshot, self.hasher.as_ref(), self.buckets_per_silo)
    }
}
