//! Shared helpers for integration tests.
//!
//! - Address and grain builders
//! - [`ScriptedDirectory`]: a first-wins directory that records every call
//!   and can be scripted to return chosen winners or fail
//! - [`LaggingMembership`]: a membership whose local snapshot stays behind
//!   until `refresh` is called

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use moonpool_directory::{
    ActivationId, ClusterMembershipSnapshot, DirectoryError, GrainAddress, GrainDirectory,
    GrainId, GrainType, MembershipError, MembershipService, MembershipUpdates,
    MembershipVersion, NetworkAddress, SharedMembership, SiloAddress, UnregistrationCause,
};

pub const ACCOUNTS: GrainType = GrainType(0xBA4E_4B00);
pub const PLAYERS: GrainType = GrainType(0x504C_4159);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moonpool_directory=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn silo(port: u16) -> SiloAddress {
    silo_gen(port, 1)
}

pub fn silo_gen(port: u16, generation: u64) -> SiloAddress {
    SiloAddress::new(
        NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        generation,
    )
}

pub fn account(key: &str) -> GrainId {
    GrainId::from_string(ACCOUNTS, key)
}

pub fn activation(grain: &GrainId, port: u16, id: u64, version: u64) -> GrainAddress {
    GrainAddress::new(
        grain.clone(),
        silo(port),
        ActivationId(id),
        MembershipVersion(version),
    )
}

/// First-wins directory that records every call.
#[derive(Debug, Default)]
pub struct ScriptedDirectory {
    entries: Mutex<HashMap<GrainId, GrainAddress>>,
    scripted_winners: Mutex<VecDeque<GrainAddress>>,
    unavailable: Mutex<bool>,
    pub register_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    pub unregister_calls: Mutex<Vec<(GrainAddress, UnregistrationCause)>>,
    pub unregister_silos_calls: Mutex<Vec<Vec<SiloAddress>>>,
}

impl ScriptedDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store an entry directly, bypassing the call log.
    pub fn seed(&self, address: GrainAddress) {
        self.entries
            .lock()
            .insert(address.grain_id.clone(), address);
    }

    /// Make the next `register` declare `winner` the winner, whatever is
    /// stored.
    pub fn script_winner(&self, winner: GrainAddress) {
        self.scripted_winners.lock().push_back(winner);
    }

    /// Make every call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    pub fn stored(&self, grain_id: &GrainId) -> Option<GrainAddress> {
        self.entries.lock().get(grain_id).cloned()
    }

    pub fn register_count(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn unregistered(&self) -> Vec<(GrainAddress, UnregistrationCause)> {
        self.unregister_calls.lock().clone()
    }

    pub fn unregistered_silos(&self) -> Vec<Vec<SiloAddress>> {
        self.unregister_silos_calls.lock().clone()
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if *self.unavailable.lock() {
            return Err(DirectoryError::Unavailable {
                reason: "scripted outage".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl GrainDirectory for ScriptedDirectory {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, DirectoryError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut entries = self.entries.lock();
        if let Some(winner) = self.scripted_winners.lock().pop_front() {
            entries.insert(winner.grain_id.clone(), winner.clone());
            return Ok(winner);
        }
        match entries.get(&address.grain_id) {
            Some(existing) if !previous.is_some_and(|prev| existing.matches(prev)) => {
                Ok(existing.clone())
            }
            _ => {
                entries.insert(address.grain_id.clone(), address.clone());
                Ok(address)
            }
        }
    }

    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, DirectoryError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.entries.lock().get(grain_id).cloned())
    }

    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), DirectoryError> {
        self.check_available()?;
        self.unregister_calls.lock().push((address.clone(), cause));
        let mut entries = self.entries.lock();
        if entries
            .get(&address.grain_id)
            .is_some_and(|existing| existing.matches(address))
        {
            entries.remove(&address.grain_id);
        }
        Ok(())
    }

    async fn unregister_silos(&self, silos: &[SiloAddress]) -> Result<(), DirectoryError> {
        self.check_available()?;
        self.unregister_silos_calls.lock().push(silos.to_vec());
        self.entries
            .lock()
            .retain(|_, address| !silos.contains(&address.silo));
        Ok(())
    }
}

/// Membership whose local snapshot is pinned until `refresh`.
#[derive(Debug)]
pub struct LaggingMembership {
    inner: Arc<SharedMembership>,
    pinned: Mutex<Option<Arc<ClusterMembershipSnapshot>>>,
    pub refresh_calls: AtomicUsize,
}

impl LaggingMembership {
    /// Pin the current snapshot of `inner`.
    pub fn new(inner: Arc<SharedMembership>) -> Arc<Self> {
        let pinned = inner.current_snapshot();
        Arc::new(Self {
            inner,
            pinned: Mutex::new(Some(pinned)),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MembershipService for LaggingMembership {
    fn current_snapshot(&self) -> Arc<ClusterMembershipSnapshot> {
        match self.pinned.lock().as_ref() {
            Some(pinned) => Arc::clone(pinned),
            None => self.inner.current_snapshot(),
        }
    }

    fn subscribe(&self) -> MembershipUpdates {
        self.inner.subscribe()
    }

    async fn refresh(
        &self,
        _minimum_version: MembershipVersion,
    ) -> Result<Arc<ClusterMembershipSnapshot>, MembershipError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pinned.lock().take();
        Ok(self.inner.current_snapshot())
    }
}
