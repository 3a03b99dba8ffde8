//! In-process membership table shared by every silo of a test cluster.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::snapshot::{ClusterMember, ClusterMembershipSnapshot, MembershipVersion, SiloStatus};
use super::{MembershipError, MembershipService, MembershipUpdates};
use crate::silo::SiloAddress;

/// Shared in-memory membership.
///
/// All silos of an in-process cluster share the same `Arc<SharedMembership>`
/// and therefore see the same view immediately. Every change bumps the
/// version and is pushed to every live subscriber, in version order.
///
/// # Example
///
/// ```rust
/// # use moonpool_directory::{SharedMembership, SiloAddress, SiloStatus, MembershipService};
/// let a = SiloAddress::parse("10.0.0.1:4500@1").unwrap();
/// let membership = SharedMembership::new();
/// membership.register_silo(a.clone(), SiloStatus::Active, "silo-a");
/// membership.update_status(&a, SiloStatus::Dead).unwrap();
/// assert!(membership.current_snapshot().live_members().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SharedMembership {
    inner: Mutex<SharedMembershipInner>,
}

#[derive(Debug, Default)]
struct SharedMembershipInner {
    current: Arc<ClusterMembershipSnapshot>,
    subscribers: Vec<mpsc::UnboundedSender<Arc<ClusterMembershipSnapshot>>>,
}

impl SharedMembership {
    /// Create an empty membership at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a membership pre-populated with active silos.
    ///
    /// Each silo counts as one join, so the version equals the silo count.
    pub fn with_members(addresses: Vec<SiloAddress>) -> Self {
        let members: HashMap<SiloAddress, ClusterMember> = addresses
            .iter()
            .enumerate()
            .map(|(i, addr)| {
                (
                    addr.clone(),
                    ClusterMember::new(addr.clone(), SiloStatus::Active, format!("silo-{i}")),
                )
            })
            .collect();
        let snapshot = ClusterMembershipSnapshot {
            members,
            version: MembershipVersion(addresses.len() as u64),
        };
        Self {
            inner: Mutex::new(SharedMembershipInner {
                current: Arc::new(snapshot),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a silo with the given status, or overwrite its entry.
    ///
    /// Returns the new membership version.
    pub fn register_silo(
        &self,
        address: SiloAddress,
        status: SiloStatus,
        name: impl Into<String>,
    ) -> MembershipVersion {
        let mut inner = self.inner.lock();
        let mut next = (*inner.current).clone();
        next.members
            .insert(address.clone(), ClusterMember::new(address, status, name));
        inner.publish(next)
    }

    /// Update the status of an already-registered silo.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::UnknownSilo`] if the silo never registered.
    pub fn update_status(
        &self,
        address: &SiloAddress,
        status: SiloStatus,
    ) -> Result<MembershipVersion, MembershipError> {
        let mut inner = self.inner.lock();
        let mut next = (*inner.current).clone();
        match next.members.get_mut(address) {
            Some(member) => member.status = status,
            None => {
                return Err(MembershipError::UnknownSilo {
                    address: address.clone(),
                });
            }
        }
        Ok(inner.publish(next))
    }

    /// Number of subscribers still attached.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

impl SharedMembershipInner {
    fn publish(&mut self, mut next: ClusterMembershipSnapshot) -> MembershipVersion {
        next.version = self.current.version.next();
        let version = next.version;
        self.current = Arc::new(next);
        let snapshot = &self.current;
        self.subscribers
            .retain(|tx| tx.send(Arc::clone(snapshot)).is_ok());
        tracing::debug!(%version, subscribers = self.subscribers.len(), "membership updated");
        version
    }
}

#[async_trait::async_trait]
impl MembershipService for SharedMembership {
    fn current_snapshot(&self) -> Arc<ClusterMembershipSnapshot> {
        Arc::clone(&self.inner.lock().current)
    }

    fn subscribe(&self) -> MembershipUpdates {
        let (tx, updates) = MembershipUpdates::channel();
        let mut inner = self.inner.lock();
        // Receiver is alive, so the first send cannot fail.
        if tx.send(Arc::clone(&inner.current)).is_ok() {
            inner.subscribers.push(tx);
        }
        updates
    }

    async fn refresh(
        &self,
        _minimum_version: MembershipVersion,
    ) -> Result<Arc<ClusterMembershipSnapshot>, MembershipError> {
        // Updates are applied synchronously, so the current snapshot is
        // always the newest one.
        Ok(self.current_snapshot())
    }
}
