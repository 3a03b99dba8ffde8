//! Membership: which silos are in the cluster, and in which state.
//!
//! The directory consumes membership in two ways: as a point-in-time
//! [`ClusterMembershipSnapshot`] (to compute ring ownership and to decide
//! whether an address points at a dead silo) and as an ordered stream of
//! snapshots ([`MembershipUpdates`]) to react when silos die.
//!
//! # Design
//!
//! - `MembershipService` is a trait so implementations can range from a
//!   shared in-process table (tests) to a gossip-backed table (production).
//! - Snapshots are immutable and shared through `Arc`; consumers never
//!   observe a partially applied change.
//! - Each subscriber gets its own unbounded queue, drained by a single task,
//!   so one snapshot is fully processed before the next is received.

mod shared;
mod snapshot;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

pub use shared::SharedMembership;
pub use snapshot::{ClusterMember, ClusterMembershipSnapshot, MembershipVersion, SiloStatus};

use crate::silo::SiloAddress;

/// Errors from membership operations.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    /// The silo was never registered.
    #[error("silo not found in membership: {address}")]
    UnknownSilo {
        /// The address that was not found.
        address: SiloAddress,
    },

    /// The membership table could not be read.
    #[error("membership unavailable: {reason}")]
    Unavailable {
        /// Backend-specific failure description.
        reason: String,
    },
}

/// Ordered stream of membership snapshots for one subscriber.
///
/// The first item is the snapshot current at subscription time; every later
/// version follows in order. The stream ends when the service is dropped.
#[derive(Debug)]
pub struct MembershipUpdates {
    rx: mpsc::UnboundedReceiver<Arc<ClusterMembershipSnapshot>>,
}

impl MembershipUpdates {
    /// Create a feed and the sender a [`MembershipService`] pushes into.
    pub fn channel() -> (
        mpsc::UnboundedSender<Arc<ClusterMembershipSnapshot>>,
        MembershipUpdates,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, MembershipUpdates { rx })
    }

    /// Wait for the next snapshot. `None` once the service is gone.
    pub async fn next(&mut self) -> Option<Arc<ClusterMembershipSnapshot>> {
        self.rx.recv().await
    }
}

/// Read access to cluster membership.
///
/// # Orleans Reference
///
/// Corresponds to Orleans' `IClusterMembershipService`: a current snapshot,
/// a subscription to updates, and a way to force a refresh when a caller
/// learns about a version newer than the one it holds.
#[async_trait::async_trait]
pub trait MembershipService: Send + Sync + fmt::Debug {
    /// The newest snapshot known locally.
    fn current_snapshot(&self) -> Arc<ClusterMembershipSnapshot>;

    /// Subscribe to snapshots, starting with the current one.
    fn subscribe(&self) -> MembershipUpdates;

    /// Bring the local view up to at least `minimum_version` if possible,
    /// and return the newest snapshot.
    ///
    /// The returned snapshot may still be older than `minimum_version` if
    /// the table has not caught up yet.
    async fn refresh(
        &self,
        minimum_version: MembershipVersion,
    ) -> Result<Arc<ClusterMembershipSnapshot>, MembershipError>;
}
