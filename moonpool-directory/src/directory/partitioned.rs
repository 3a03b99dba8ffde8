//! In-process DHT directory.
//!
//! Holds one partition per live silo and routes every grain to the
//! partition of its ring owner. When the membership view changes, entries
//! are handed over to their new owners and registrations pointing at dead
//! silos are dropped.
//!
//! # Design
//!
//! - The partition table sits behind a `RwLock`: requests take the read
//!   side and only lock the partition they touch, a view change takes the
//!   write side and rebuilds the table in one step.
//! - The view is synced lazily at the start of each request, so the table
//!   never routes with a version older than the one the caller observed.
//! - Removals are counted per [`UnregistrationCause`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::view::{DefaultBucketHasher, DirectoryMembershipService, DirectoryMembershipSnapshot};
use super::{DirectoryError, LocalGrainDirectory};
use crate::membership::{MembershipService, MembershipVersion, SiloStatus};
use crate::silo::SiloAddress;
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// DHT directory over the live silos of an in-process cluster.
#[derive(Debug)]
pub struct PartitionedGrainDirectory {
    views: DirectoryMembershipService,
    table: RwLock<PartitionTable>,
    removals: Mutex<HashMap<UnregistrationCause, u64>>,
}

#[derive(Debug, Default)]
struct PartitionTable {
    view: Option<Arc<DirectoryMembershipSnapshot>>,
    partitions: HashMap<SiloAddress, DirectoryPartition>,
}

#[derive(Debug, Default)]
struct DirectoryPartition {
    entries: Mutex<HashMap<GrainId, GrainAddress>>,
}

impl PartitionTable {
    fn partition_for(&self, grain_id: &GrainId) -> Result<&DirectoryPartition, DirectoryError> {
        self.view
            .as_ref()
            .and_then(|view| view.get_owner_for_grain(grain_id))
            .and_then(|owner| self.partitions.get(owner))
            .ok_or_else(|| DirectoryError::NoOwner {
                grain_id: grain_id.clone(),
            })
    }

    fn owner_of(&self, grain_id: &GrainId) -> Result<SiloAddress, DirectoryError> {
        self.view
            .as_ref()
            .and_then(|view| view.get_owner_for_grain(grain_id))
            .cloned()
            .ok_or_else(|| DirectoryError::NoOwner {
                grain_id: grain_id.clone(),
            })
    }

    fn is_dead(&self, silo: &SiloAddress) -> bool {
        self.view.as_ref().is_some_and(|view| {
            view.cluster_snapshot().get_status(silo) == Some(SiloStatus::Dead)
        })
    }
}

impl PartitionedGrainDirectory {
    /// Create a directory routed by `views`.
    pub fn new(views: DirectoryMembershipService) -> Self {
        Self {
            views,
            table: RwLock::new(PartitionTable::default()),
            removals: Mutex::new(HashMap::new()),
        }
    }

    /// Create a directory over `membership` with the default bucket hasher.
    pub fn with_membership(membership: Arc<dyn MembershipService>, buckets_per_silo: u32) -> Self {
        Self::new(DirectoryMembershipService::new(
            membership,
            Arc::new(DefaultBucketHasher),
            buckets_per_silo,
        ))
    }

    /// Membership version the partition table currently reflects.
    pub fn current_version(&self) -> Option<MembershipVersion> {
        self.table.read().view.as_ref().map(|view| view.version())
    }

    /// Entry count per owning silo.
    pub fn partition_sizes(&self) -> BTreeMap<SiloAddress, usize> {
        self.sync();
        self.table
            .read()
            .partitions
            .iter()
            .map(|(silo, partition)| (silo.clone(), partition.entries.lock().len()))
            .collect()
    }

    /// Silo holding `grain_id`'s entry in the current table.
    pub fn owner_of(&self, grain_id: &GrainId) -> Option<SiloAddress> {
        self.sync();
        self.table.read().owner_of(grain_id).ok()
    }

    /// Number of entries removed so far with `cause`.
    pub fn removals(&self, cause: UnregistrationCause) -> u64 {
        self.removals.lock().get(&cause).copied().unwrap_or(0)
    }

    fn record_removals(&self, cause: UnregistrationCause, count: u64) {
        if count > 0 {
            *self.removals.lock().entry(cause).or_default() += count;
        }
    }

    /// Bring the partition table up to the newest view.
    fn sync(&self) {
        let view = self.views.current_view();
        let current = self.table.read().view.as_ref().map(|v| v.version());
        if current.is_some_and(|v| v >= view.version()) {
            return;
        }
        self.handoff(view);
    }

    fn handoff(&self, view: Arc<DirectoryMembershipSnapshot>) {
        let mut table = self.table.write();
        if table
            .view
            .as_ref()
            .is_some_and(|current| current.version() >= view.version())
        {
            return;
        }

        let mut partitions: HashMap<SiloAddress, DirectoryPartition> = view
            .members()
            .iter()
            .map(|silo| (silo.clone(), DirectoryPartition::default()))
            .collect();
        let snapshot = Arc::clone(view.cluster_snapshot());
        let (mut moved, mut dead, mut orphaned) = (0u64, 0u64, 0u64);

        for (previous_owner, partition) in table.partitions.drain() {
            for (grain_id, address) in partition.entries.into_inner() {
                if snapshot.get_status(&address.silo) == Some(SiloStatus::Dead) {
                    dead += 1;
                    continue;
                }
                let Some(target) = view
                    .get_owner_for_grain(&grain_id)
                    .and_then(|owner| partitions.get(owner).map(|p| (owner, p)))
                else {
                    orphaned += 1;
                    continue;
                };
                if *target.0 != previous_owner {
                    moved += 1;
                }
                target.1.entries.lock().insert(grain_id, address);
            }
        }

        table.partitions = partitions;
        table.view = Some(Arc::clone(&view));
        drop(table);

        self.record_removals(UnregistrationCause::SiloDied, dead);
        if orphaned > 0 {
            tracing::warn!(
                version = %view.version(),
                orphaned,
                "no live silo to hand directory entries over to"
            );
        }
        tracing::info!(
            version = %view.version(),
            members = view.members().len(),
            moved,
            dropped = dead,
            "directory partitions handed over"
        );
    }

    /// Remove a batch of addresses owned by one silo, re-routing each through
    /// the current table.
    fn unregister_batch(
        &self,
        batch: &[&GrainAddress],
        cause: UnregistrationCause,
    ) -> Result<u64, DirectoryError> {
        let table = self.table.read();
        let mut removed = 0;
        for address in batch {
            let partition = table.partition_for(&address.grain_id)?;
            let mut entries = partition.entries.lock();
            let matches = entries
                .get(&address.grain_id)
                .is_some_and(|existing| existing.matches(address));
            if matches {
                entries.remove(&address.grain_id);
                tracing::trace!(grain_id = %address.grain_id, %cause, "grain unregistered");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl LocalGrainDirectory for PartitionedGrainDirectory {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, DirectoryError> {
        self.sync();
        let table = self.table.read();
        let partition = table.partition_for(&address.grain_id)?;
        let mut entries = partition.entries.lock();

        let winner = match entries.get(&address.grain_id) {
            Some(existing) if previous.is_some_and(|prev| existing.matches(prev)) => {
                tracing::debug!(
                    grain_id = %address.grain_id,
                    replaced = %existing.activation_id,
                    "grain registration replaced"
                );
                entries.insert(address.grain_id.clone(), address.clone());
                address
            }
            Some(existing) if !table.is_dead(&existing.silo) => existing.clone(),
            Some(existing) => {
                tracing::debug!(
                    grain_id = %address.grain_id,
                    silo = %existing.silo,
                    "replacing registration on dead silo"
                );
                self.record_removals(UnregistrationCause::SiloDied, 1);
                entries.insert(address.grain_id.clone(), address.clone());
                address
            }
            None => {
                entries.insert(address.grain_id.clone(), address.clone());
                address
            }
        };
        Ok(winner)
    }

    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, DirectoryError> {
        self.sync();
        let table = self.table.read();
        let partition = table.partition_for(grain_id)?;
        let found = partition.entries.lock().get(grain_id).cloned();
        Ok(found)
    }

    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), DirectoryError> {
        self.sync();
        let removed = self.unregister_batch(&[address], cause)?;
        self.record_removals(cause, removed);
        Ok(())
    }

    async fn unregister_many(
        &self,
        addresses: &[GrainAddress],
        cause: UnregistrationCause,
    ) -> Result<(), DirectoryError> {
        self.sync();
        let batches = {
            let table = self.table.read();
            let mut batches: HashMap<SiloAddress, Vec<&GrainAddress>> = HashMap::new();
            for address in addresses {
                let owner = table.owner_of(&address.grain_id)?;
                batches.entry(owner).or_default().push(address);
            }
            batches
        };

        tracing::debug!(
            addresses = addresses.len(),
            owners = batches.len(),
            %cause,
            "unregistering batch"
        );

        // Batches run one after another; a failed batch does not stop the rest.
        let mut removed = 0;
        let mut first_error = None;
        for batch in batches.values() {
            match self.unregister_batch(batch, cause) {
                Ok(count) => removed += count,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        self.record_removals(cause, removed);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::membership::SharedMembership;
    use crate::silo::NetworkAddress;
    use crate::types::{ActivationId, GrainType};

    fn silo(port: u16) -> SiloAddress {
        SiloAddress::new(
            NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            1,
        )
    }

    fn grain(key: u64) -> GrainId {
        GrainId::from_integer(GrainType(0xBA4E_4B00), key)
    }

    fn activation(key: u64, port: u16) -> GrainAddress {
        GrainAddress::new(grain(key), silo(port), ActivationId(key), MembershipVersion(1))
    }

    fn cluster(ports: &[u16]) -> (Arc<SharedMembership>, PartitionedGrainDirectory) {
        let membership = Arc::new(SharedMembership::with_members(
            ports.iter().map(|p| silo(*p)).collect(),
        ));
        let dir = PartitionedGrainDirectory::with_membership(membership.clone(), 30);
        (membership, dir)
    }

    #[tokio::test]
    async fn test_register_lookup_unregister() {
        let (_membership, dir) = cluster(&[4500, 4501, 4502]);
        let addr = activation(1, 4500);

        assert_eq!(dir.register(addr.clone(), None).await.expect("register"), addr);
        assert_eq!(
            dir.register(activation(1, 4501), None).await.expect("register"),
            addr,
            "first registration wins"
        );
        assert_eq!(dir.lookup(&grain(1)).await.expect("lookup"), Some(addr.clone()));

        dir.unregister(&addr, UnregistrationCause::Force)
            .await
            .expect("unregister");
        assert_eq!(dir.lookup(&grain(1)).await.expect("lookup"), None);
        assert_eq!(dir.removals(UnregistrationCause::Force), 1);
    }

    #[tokio::test]
    async fn test_entries_live_on_owner_partition() {
        let (_membership, dir) = cluster(&[4500, 4501, 4502]);
        for key in 0..60 {
            dir.register(activation(key, 4500), None).await.expect("register");
        }
        let sizes = dir.partition_sizes();
        assert_eq!(sizes.values().sum::<usize>(), 60);
        assert_eq!(sizes.len(), 3);
    }

    #[tokio::test]
    async fn test_no_members_is_no_owner() {
        let (_membership, dir) = cluster(&[]);
        let result = dir.register(activation(1, 4500), None).await;
        assert!(matches!(result, Err(DirectoryError::NoOwner { .. })));
    }

    #[tokio::test]
    async fn test_handoff_on_join_keeps_entries() {
        let (membership, dir) = cluster(&[4500]);
        for key in 0..50 {
            dir.register(activation(key, 4500), None).await.expect("register");
        }

        membership.register_silo(silo(4501), SiloStatus::Active, "silo-b");

        for key in 0..50 {
            assert!(dir.lookup(&grain(key)).await.expect("lookup").is_some());
        }
        let sizes = dir.partition_sizes();
        assert_eq!(sizes.values().sum::<usize>(), 50);
        assert!(sizes[&silo(4501)] > 0, "new silo should take over some grains");
        assert_eq!(dir.current_version(), Some(MembershipVersion(2)));
    }

    #[tokio::test]
    async fn test_handoff_drops_dead_silo_registrations() {
        let (membership, dir) = cluster(&[4500, 4501]);
        dir.register(activation(1, 4500), None).await.expect("register");
        dir.register(activation(2, 4501), None).await.expect("register");

        membership
            .update_status(&silo(4501), SiloStatus::Dead)
            .expect("update");

        assert!(dir.lookup(&grain(1)).await.expect("lookup").is_some());
        assert_eq!(dir.lookup(&grain(2)).await.expect("lookup"), None);
        assert_eq!(dir.removals(UnregistrationCause::SiloDied), 1);
        assert_eq!(dir.owner_of(&grain(2)), Some(silo(4500)));
    }

    #[tokio::test]
    async fn test_unregister_many_groups_by_owner() {
        let (_membership, dir) = cluster(&[4500, 4501, 4502]);
        let addresses: Vec<GrainAddress> = (0..20).map(|k| activation(k, 4500)).collect();
        for addr in &addresses {
            dir.register(addr.clone(), None).await.expect("register");
        }

        dir.unregister_many(&addresses, UnregistrationCause::NonexistentActivation)
            .await
            .expect("unregister many");

        assert_eq!(dir.partition_sizes().values().sum::<usize>(), 0);
        assert_eq!(dir.removals(UnregistrationCause::NonexistentActivation), 20);
    }

    #[tokio::test]
    async fn test_unregister_many_skips_other_activations() {
        let (_membership, dir) = cluster(&[4500, 4501, 4502]);
        let addresses: Vec<GrainAddress> = (0..12).map(|k| activation(k, 4500)).collect();
        for addr in &addresses {
            dir.register(addr.clone(), None).await.expect("register");
        }

        // Half the batch names activations that are not the registered ones.
        let batch: Vec<GrainAddress> = addresses
            .iter()
            .map(|addr| {
                if addr.activation_id.0 % 2 == 0 {
                    addr.clone()
                } else {
                    GrainAddress::new(
                        addr.grain_id.clone(),
                        addr.silo.clone(),
                        ActivationId(addr.activation_id.0 + 100),
                        addr.membership_version,
                    )
                }
            })
            .collect();
        dir.unregister_many(&batch, UnregistrationCause::Force)
            .await
            .expect("unregister many");

        assert_eq!(dir.partition_sizes().values().sum::<usize>(), 6);
        assert_eq!(dir.removals(UnregistrationCause::Force), 6);
        assert_eq!(dir.removals(UnregistrationCause::NonexistentActivation), 0);
    }

    #[tokio::test]
    async fn test_register_replaces_matching_previous() {
        let (_membership, dir) = cluster(&[4500, 4501]);
        let existing = activation(1, 4500);
        let replacement = GrainAddress::new(
            grain(1),
            silo(4501),
            ActivationId(77),
            MembershipVersion(1),
        );
        dir.register(existing.clone(), None).await.expect("register");

        assert_eq!(
            dir.register(replacement.clone(), None).await.expect("register"),
            existing
        );
        assert_eq!(
            dir.register(replacement.clone(), Some(&existing))
                .await
                .expect("register"),
            replacement
        );
        assert_eq!(dir.lookup(&grain(1)).await.expect("lookup"), Some(replacement));
    }
}
