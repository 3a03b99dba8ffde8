//! Immutable membership snapshots.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::silo::SiloAddress;

/// Monotonically increasing membership version.
///
/// Every membership change (join, status transition, leave) bumps the version.
/// Used to detect stale snapshots and order membership updates.
///
/// # Orleans Reference
///
/// Corresponds to Orleans' `MembershipVersion`, a simple monotonic counter
/// that increases with every table write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MembershipVersion(pub u64);

impl MembershipVersion {
    /// Version 0, before any silo joined.
    pub const ZERO: MembershipVersion = MembershipVersion(0);

    /// Return the next version.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MembershipVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Status of a silo in the cluster.
///
/// # Orleans Reference
///
/// Corresponds to Orleans' `SiloStatus`, restricted to the states visible
/// to the membership protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiloStatus {
    /// Silo announced itself but is not serving yet.
    Joining,
    /// Silo is fully operational.
    Active,
    /// Silo is draining work before leaving.
    ShuttingDown,
    /// Silo crashed or completed shutdown. Terminal.
    Dead,
}

impl SiloStatus {
    /// Whether the silo still takes part in directory ownership.
    ///
    /// Everything except `Dead` is live: a joining silo already owns ring
    /// ranges, and a silo shutting down keeps them until it is declared dead.
    pub fn is_live(self) -> bool {
        self != Self::Dead
    }
}

impl fmt::Display for SiloStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joining => write!(f, "Joining"),
            Self::Active => write!(f, "Active"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Dead => write!(f, "Dead"),
        }
    }
}

/// A single member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    /// Address of this silo incarnation.
    pub address: SiloAddress,
    /// Current lifecycle status.
    pub status: SiloStatus,
    /// Human-readable name (for logging/debugging).
    pub name: String,
}

impl ClusterMember {
    /// Create a new cluster member.
    pub fn new(address: SiloAddress, status: SiloStatus, name: impl Into<String>) -> Self {
        Self {
            address,
            status,
            name: name.into(),
        }
    }

    /// Whether this member is not `Dead`.
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// Immutable snapshot of cluster membership at a specific version.
///
/// Snapshots are shared through `Arc` and never mutated after publication.
/// A silo that was declared dead stays in later snapshots with status
/// `Dead`; a silo that never appeared is simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterMembershipSnapshot {
    /// All known members, keyed by silo address.
    pub members: HashMap<SiloAddress, ClusterMember>,
    /// Version of this snapshot.
    pub version: MembershipVersion,
}

impl ClusterMembershipSnapshot {
    /// Create a snapshot from members.
    pub fn new(
        members: impl IntoIterator<Item = ClusterMember>,
        version: MembershipVersion,
    ) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|m| (m.address.clone(), m))
                .collect(),
            version,
        }
    }

    /// Get a specific member by address.
    pub fn get_member(&self, address: &SiloAddress) -> Option<&ClusterMember> {
        self.members.get(address)
    }

    /// Status of a specific silo, or `None` if it is not in the snapshot.
    pub fn get_status(&self, address: &SiloAddress) -> Option<SiloStatus> {
        self.members.get(address).map(|m| m.status)
    }

    /// Addresses of all live members, sorted.
    pub fn live_members(&self) -> Vec<SiloAddress> {
        let mut live: Vec<SiloAddress> = self
            .members
            .values()
            .filter(|m| m.is_live())
            .map(|m| m.address.clone())
            .collect();
        live.sort();
        live
    }

    /// Members that appeared or changed status since `previous`.
    ///
    /// Sorted by address so callers process changes deterministically.
    pub fn create_update(&self, previous: &ClusterMembershipSnapshot) -> Vec<ClusterMember> {
        let mut changes: Vec<ClusterMember> = self
            .members
            .values()
            .filter(|m| previous.get_status(&m.address) != Some(m.status))
            .cloned()
            .collect();
        changes.sort_by(|a, b| a.address.cmp(&b.address));
        changes
    }

    /// Silos that are `Dead` here but were not `Dead` in `previous`.
    pub fn newly_dead(&self, previous: &ClusterMembershipSnapshot) -> Vec<SiloAddress> {
        self.create_update(previous)
            .into_iter()
            .filter(|m| m.status == SiloStatus::Dead)
            .map(|m| m.address)
            .collect()
    }
}
