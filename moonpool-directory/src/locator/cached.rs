//! Locator caching an external grain directory.
//!
//! # Design
//!
//! - The cache is a `DashMap<GrainId, GrainAddress>`: lookups never wait on
//!   writers of unrelated keys, and every removal is a compare-and-remove on
//!   the exact address, so a removal racing a newer registration for the
//!   same grain never evicts it.
//! - The cache is only written after the directory call it depends on
//!   returned. Dropping a request future mid-call leaves the cache as it was.
//! - One background task per locator drains the membership feed. For each
//!   new version it finds silos that became `Dead`, evicts their entries
//!   and issues a single `unregister_silos` for the batch.
//! - "Dead" is decided against the newest snapshot. An address registered
//!   at a version newer than the local snapshot forces a membership refresh
//!   first, so a silo that joined recently is not mistaken for a dead one.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{GrainLocator, LocatorError};
use crate::directory::GrainDirectory;
use crate::lifecycle::{
    LifecycleObserver, LifecycleParticipant, LifecycleStage, ObserverError, SiloLifecycle,
};
use crate::membership::{
    ClusterMembershipSnapshot, MembershipService, MembershipUpdates, MembershipVersion, SiloStatus,
};
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// Lifecycle state of a [`CachedGrainLocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorState {
    /// Not reacting to membership changes.
    Stopped,
    /// Subscribing to membership.
    Starting,
    /// Membership reaction task running.
    Active,
    /// Waiting for the membership reaction task to finish.
    Stopping,
}

impl fmt::Display for LocatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Active => write!(f, "Active"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Grain locator in front of an external [`GrainDirectory`].
///
/// Requests work in every state; starting the locator only adds the
/// membership reaction. Without it, dead-silo entries are still filtered
/// on access but not evicted in bulk.
#[derive(Debug)]
pub struct CachedGrainLocator {
    core: Arc<LocatorCore>,
    control: Mutex<Control>,
}

#[derive(Debug)]
struct LocatorCore {
    name: String,
    directory: Arc<dyn GrainDirectory>,
    membership: Arc<dyn MembershipService>,
    cache: DashMap<GrainId, GrainAddress>,
    stale_registration_retries: u32,
    processed: watch::Sender<MembershipVersion>,
}

#[derive(Debug)]
struct Control {
    state: LocatorState,
    task: Option<ReactionTask>,
}

#[derive(Debug)]
struct ReactionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CachedGrainLocator {
    /// Create a stopped locator over `directory`.
    ///
    /// `name` identifies the directory in logs. A stale winner is retried
    /// at most `stale_registration_retries` times.
    pub fn new(
        name: impl Into<String>,
        directory: Arc<dyn GrainDirectory>,
        membership: Arc<dyn MembershipService>,
        stale_registration_retries: u32,
    ) -> Self {
        let (processed, _) = watch::channel(MembershipVersion::ZERO);
        Self {
            core: Arc::new(LocatorCore {
                name: name.into(),
                directory,
                membership,
                cache: DashMap::new(),
                stale_registration_retries,
                processed,
            }),
            control: Mutex::new(Control {
                state: LocatorState::Stopped,
                task: None,
            }),
        }
    }

    /// Name of the directory this locator fronts.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The directory this locator fronts.
    pub fn directory(&self) -> &Arc<dyn GrainDirectory> {
        &self.core.directory
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LocatorState {
        self.control.lock().state
    }

    /// Number of cached entries.
    pub fn cached_len(&self) -> usize {
        self.core.cache.len()
    }

    /// Newest membership version the reaction task finished processing.
    pub fn last_processed_version(&self) -> MembershipVersion {
        *self.core.processed.borrow()
    }

    /// Wait until the reaction task has processed `version`.
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError::NotActive`] if the locator is not running, or
    /// stops while waiting.
    pub async fn wait_for_version(&self, version: MembershipVersion) -> Result<(), LocatorError> {
        let mut rx = self.core.processed.subscribe();
        loop {
            let processed = *rx.borrow_and_update();
            if processed >= version {
                return Ok(());
            }
            let state = self.state();
            if !matches!(state, LocatorState::Starting | LocatorState::Active) {
                return Err(LocatorError::NotActive { state });
            }
            if rx.changed().await.is_err() {
                return Err(LocatorError::NotActive {
                    state: self.state(),
                });
            }
        }
    }

    /// Subscribe to membership and spawn the reaction task.
    ///
    /// Must be called from within a tokio runtime. No-op unless stopped.
    pub fn start(&self) {
        let mut control = self.control.lock();
        if control.state != LocatorState::Stopped {
            return;
        }
        control.state = LocatorState::Starting;

        let updates = self.core.membership.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.core).run_membership_reaction(
            updates,
            cancel.clone(),
        ));
        control.task = Some(ReactionTask { cancel, handle });
        control.state = LocatorState::Active;
        tracing::info!(directory = %self.core.name, "cached grain locator started");
    }

    /// Cancel the reaction task and wait for it to finish.
    ///
    /// A snapshot being processed is finished first. No-op unless active.
    pub async fn stop(&self) {
        let task = {
            let mut control = self.control.lock();
            if control.state != LocatorState::Active {
                return;
            }
            control.state = LocatorState::Stopping;
            control.task.take()
        };

        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                tracing::warn!(directory = %self.core.name, error = %e, "membership reaction task failed");
            }
        }

        self.control.lock().state = LocatorState::Stopped;
        // Wake waiters so they observe the state change.
        self.core.processed.send_modify(|_| {});
        tracing::info!(directory = %self.core.name, "cached grain locator stopped");
    }
}

impl LocatorCore {
    async fn run_membership_reaction(
        self: Arc<Self>,
        mut updates: MembershipUpdates,
        cancel: CancellationToken,
    ) {
        let mut previous: Option<Arc<ClusterMembershipSnapshot>> = None;
        loop {
            let snapshot = tokio::select! {
                _ = cancel.cancelled() => break,
                next = updates.next() => match next {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            if previous
                .as_ref()
                .is_some_and(|p| snapshot.version <= p.version)
            {
                continue;
            }
            // The first snapshot is the baseline: there is nothing to diff.
            let baseline = previous.as_deref().unwrap_or(&snapshot);
            self.on_membership_update(baseline, &snapshot).await;
            previous = Some(snapshot);
        }
        tracing::debug!(directory = %self.name, "membership reaction task exiting");
    }

    async fn on_membership_update(
        &self,
        previous: &ClusterMembershipSnapshot,
        snapshot: &ClusterMembershipSnapshot,
    ) {
        let dead = snapshot.newly_dead(previous);
        if !dead.is_empty() {
            let before = self.cache.len();
            self.cache.retain(|_, address| !dead.contains(&address.silo));
            tracing::info!(
                directory = %self.name,
                version = %snapshot.version,
                dead = dead.len(),
                evicted = before.saturating_sub(self.cache.len()),
                "silos declared dead"
            );
            if let Err(e) = self.directory.unregister_silos(&dead).await {
                tracing::warn!(
                    directory = %self.name,
                    version = %snapshot.version,
                    error = %e,
                    "failed to unregister dead silos"
                );
            }
        }
        self.processed.send_replace(snapshot.version);
    }

    /// Whether `address` points at a dead silo, refreshing membership first
    /// when the address comes from a newer view than ours.
    async fn is_known_dead(&self, address: &GrainAddress) -> bool {
        let mut snapshot = self.membership.current_snapshot();
        if address.membership_version > snapshot.version {
            match self.membership.refresh(address.membership_version).await {
                Ok(refreshed) => snapshot = refreshed,
                Err(e) => tracing::warn!(
                    version = %address.membership_version,
                    error = %e,
                    "membership refresh failed"
                ),
            }
        }
        is_dead_in(&snapshot, address)
    }

    /// Dead check against the local snapshot only. Never performs I/O.
    fn is_dead_now(&self, address: &GrainAddress) -> bool {
        is_dead_in(&self.membership.current_snapshot(), address)
    }

    /// Unregister without failing the caller.
    async fn unregister_best_effort(&self, address: &GrainAddress, cause: UnregistrationCause) {
        if let Err(e) = self.directory.unregister(address, cause).await {
            tracing::warn!(
                directory = %self.name,
                grain_id = %address.grain_id,
                silo = %address.silo,
                %cause,
                error = %e,
                "best-effort unregister failed"
            );
        }
    }

    fn evict(&self, address: &GrainAddress) -> bool {
        self.cache
            .remove_if(&address.grain_id, |_, cached| cached == address)
            .is_some()
    }
}

/// A silo present in the snapshot is dead iff its status is `Dead`; an
/// absent silo is dead iff the snapshot is at least as new as the address.
fn is_dead_in(snapshot: &ClusterMembershipSnapshot, address: &GrainAddress) -> bool {
    match snapshot.get_status(&address.silo) {
        Some(status) => status == SiloStatus::Dead,
        None => snapshot.version >= address.membership_version,
    }
}

#[async_trait::async_trait]
impl GrainLocator for CachedGrainLocator {
    /// A winner on a silo known to be dead is unregistered and the call
    /// retried, up to the configured number of retries. An activation whose
    /// own silo is dead is never committed and fails with
    /// [`LocatorError::SiloDead`].
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, LocatorError> {
        let core = &self.core;
        let mut attempts = 0u32;
        let winner = loop {
            attempts += 1;
            let winner = core.directory.register(address.clone(), previous).await?;
            if !core.is_known_dead(&winner).await {
                break winner;
            }
            if winner.matches(&address) {
                core.unregister_best_effort(&winner, UnregistrationCause::SiloDied)
                    .await;
                return Err(LocatorError::SiloDead {
                    grain_id: winner.grain_id,
                    silo: winner.silo,
                });
            }
            if attempts > core.stale_registration_retries {
                return Err(LocatorError::StaleRegistration {
                    grain_id: address.grain_id.clone(),
                    attempts,
                });
            }
            tracing::debug!(
                directory = %core.name,
                grain_id = %address.grain_id,
                silo = %winner.silo,
                attempt = attempts,
                "registration won by dead silo, retrying"
            );
            core.directory
                .unregister(&winner, UnregistrationCause::SiloDied)
                .await?;
        };

        let displaced = core.cache.insert(winner.grain_id.clone(), winner.clone());
        if let Some(loser) = displaced.filter(|cached| !cached.matches(&winner)) {
            tracing::debug!(
                directory = %core.name,
                grain_id = %loser.grain_id,
                silo = %loser.silo,
                "cached activation lost the registration race"
            );
            core.unregister_best_effort(&loser, UnregistrationCause::NonexistentActivation)
                .await;
        }

        // The silo may have died while we were inserting.
        if core.is_dead_now(&winner) {
            core.evict(&winner);
            core.unregister_best_effort(&winner, UnregistrationCause::SiloDied)
                .await;
            return Err(LocatorError::SiloDead {
                grain_id: winner.grain_id,
                silo: winner.silo,
            });
        }
        Ok(winner)
    }

    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, LocatorError> {
        if let Some(cached) = self.try_lookup_in_cache(grain_id) {
            return Ok(Some(cached));
        }

        let core = &self.core;
        let Some(found) = core.directory.lookup(grain_id).await? else {
            return Ok(None);
        };
        if core.is_known_dead(&found).await {
            tracing::debug!(
                directory = %core.name,
                grain_id = %grain_id,
                silo = %found.silo,
                "directory entry points at dead silo"
            );
            core.unregister_best_effort(&found, UnregistrationCause::SiloDied)
                .await;
            return Ok(None);
        }

        // A registration that completed meanwhile takes precedence.
        let cached = core
            .cache
            .entry(grain_id.clone())
            .or_insert(found)
            .value()
            .clone();
        Ok(Some(cached))
    }

    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError> {
        self.core.directory.unregister(address, cause).await?;
        self.core.evict(address);
        Ok(())
    }

    fn try_lookup_in_cache(&self, grain_id: &GrainId) -> Option<GrainAddress> {
        let cached = self.core.cache.get(grain_id)?.value().clone();
        if self.core.is_dead_now(&cached) {
            self.core.evict(&cached);
            return None;
        }
        Some(cached)
    }

    fn invalidate_cache(&self, grain_id: &GrainId) {
        self.core.cache.remove(grain_id);
    }
}

#[async_trait::async_trait]
impl LifecycleObserver for CachedGrainLocator {
    async fn on_start(&self) -> Result<(), ObserverError> {
        self.start();
        Ok(())
    }

    async fn on_stop(&self) {
        self.stop().await;
    }
}

impl LifecycleParticipant for CachedGrainLocator {
    fn participate(self: &Arc<Self>, lifecycle: &mut SiloLifecycle) {
        lifecycle.subscribe(
            format!("CachedGrainLocator({})", self.core.name),
            LifecycleStage::RuntimeGrainServices,
            Arc::clone(self) as Arc<dyn LifecycleObserver>,
        );
    }
}

impl Drop for CachedGrainLocator {
    fn drop(&mut self) {
        if let Some(task) = self.control.get_mut().task.take() {
            task.cancel.cancel();
        }
    }
}
