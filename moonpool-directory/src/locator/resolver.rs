//! Per-grain-type locator selection.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;

use super::{CachedGrainLocator, ClientGrainLocator, DhtGrainLocator, GrainLocator};
use crate::directory::GrainDirectoryResolver;
use crate::lifecycle::{
    LifecycleObserver, LifecycleParticipant, LifecycleStage, ObserverError, SiloLifecycle,
};
use crate::membership::MembershipService;
use crate::types::GrainType;

/// Chooses the locator for each grain type.
///
/// - [`GrainType::CLIENT`] → the client locator.
/// - A type governed by a named external directory → the
///   [`CachedGrainLocator`] of that directory, shared by every type using it.
/// - Anything else → the shared DHT locator.
///
/// Answers are memoised per type: asking twice returns the same `Arc`, so
/// caches are shared rather than fragmented.
#[derive(Debug)]
pub struct GrainLocatorResolver {
    directories: Arc<GrainDirectoryResolver>,
    dht: Arc<DhtGrainLocator>,
    client: Arc<ClientGrainLocator>,
    membership: Arc<dyn MembershipService>,
    stale_registration_retries: u32,
    cached: DashMap<String, Arc<CachedGrainLocator>>,
    resolved: DashMap<GrainType, Arc<dyn GrainLocator>>,
    running: Mutex<bool>,
}

impl GrainLocatorResolver {
    /// Create a resolver. One cached locator is created up front for every
    /// directory registered in `directories`.
    pub fn new(
        directories: Arc<GrainDirectoryResolver>,
        dht: Arc<DhtGrainLocator>,
        client: Arc<ClientGrainLocator>,
        membership: Arc<dyn MembershipService>,
        stale_registration_retries: u32,
    ) -> Self {
        let cached = DashMap::new();
        for named in directories.directories() {
            cached.insert(
                named.name.clone(),
                Arc::new(CachedGrainLocator::new(
                    named.name.clone(),
                    Arc::clone(&named.directory),
                    Arc::clone(&membership),
                    stale_registration_retries,
                )),
            );
        }
        Self {
            directories,
            dht,
            client,
            membership,
            stale_registration_retries,
            cached,
            resolved: DashMap::new(),
            running: Mutex::new(false),
        }
    }

    /// The directory resolver consulted for named directories.
    pub fn directory_resolver(&self) -> &Arc<GrainDirectoryResolver> {
        &self.directories
    }

    /// The shared DHT locator.
    pub fn dht_locator(&self) -> &Arc<DhtGrainLocator> {
        &self.dht
    }

    /// The client locator.
    pub fn client_locator(&self) -> &Arc<ClientGrainLocator> {
        &self.client
    }

    /// Every cached locator created so far.
    pub fn cached_locators(&self) -> Vec<Arc<CachedGrainLocator>> {
        self.cached.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Locator governing `grain_type`.
    pub fn get_grain_locator(&self, grain_type: GrainType) -> Arc<dyn GrainLocator> {
        if let Some(found) = self.resolved.get(&grain_type) {
            return Arc::clone(found.value());
        }

        let locator: Arc<dyn GrainLocator> = if grain_type.is_client() {
            self.client.clone()
        } else {
            match self.directories.resolve_named(grain_type) {
                None => self.dht.clone(),
                Some(named) => {
                    // Held across the insert so `on_start` cannot miss a new locator.
                    let running = self.running.lock();
                    self.cached
                        .entry(named.name.clone())
                        .or_insert_with(|| {
                            let locator = Arc::new(CachedGrainLocator::new(
                                named.name.clone(),
                                Arc::clone(&named.directory),
                                Arc::clone(&self.membership),
                                self.stale_registration_retries,
                            ));
                            if *running {
                                locator.start();
                            }
                            locator
                        })
                        .value()
                        .clone()
                }
            }
        };

        tracing::debug!(%grain_type, "resolved grain locator");
        // A concurrent resolution for the same type may have won.
        Arc::clone(self.resolved.entry(grain_type).or_insert(locator).value())
    }
}

#[async_trait::async_trait]
impl LifecycleObserver for GrainLocatorResolver {
    async fn on_start(&self) -> Result<(), ObserverError> {
        let mut running = self.running.lock();
        *running = true;
        for locator in self.cached_locators() {
            locator.start();
        }
        Ok(())
    }

    async fn on_stop(&self) {
        let locators = {
            let mut running = self.running.lock();
            *running = false;
            self.cached_locators()
        };
        join_all(locators.iter().map(|locator| locator.stop())).await;
    }
}

impl LifecycleParticipant for GrainLocatorResolver {
    fn participate(self: &Arc<Self>, lifecycle: &mut SiloLifecycle) {
        lifecycle.subscribe(
            "GrainLocatorResolver",
            LifecycleStage::RuntimeGrainServices,
            Arc::clone(self) as Arc<dyn LifecycleObserver>,
        );
    }
}
