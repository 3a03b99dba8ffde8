//! Single entry point dispatching on the grain type.

use std::sync::Arc;

use futures::future::join_all;

use super::{GrainLocator, GrainLocatorResolver, LocatorError};
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// [`GrainLocator`] that routes each request to the locator governing the
/// grain's type.
///
/// Callers hold one locator for every kind of grain; the per-type choice
/// lives in the [`GrainLocatorResolver`].
#[derive(Debug, Clone)]
pub struct ClusterGrainLocator {
    resolver: Arc<GrainLocatorResolver>,
}

impl ClusterGrainLocator {
    /// Create a facade over `resolver`.
    pub fn new(resolver: Arc<GrainLocatorResolver>) -> Self {
        Self { resolver }
    }

    /// The resolver requests are dispatched through.
    pub fn resolver(&self) -> &Arc<GrainLocatorResolver> {
        &self.resolver
    }

    fn locator_for(&self, grain_id: &GrainId) -> Arc<dyn GrainLocator> {
        self.resolver.get_grain_locator(grain_id.grain_type)
    }
}

#[async_trait::async_trait]
impl GrainLocator for ClusterGrainLocator {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, LocatorError> {
        self.locator_for(&address.grain_id)
            .register(address, previous)
            .await
    }

    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, LocatorError> {
        self.locator_for(grain_id).lookup(grain_id).await
    }

    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError> {
        self.locator_for(&address.grain_id)
            .unregister(address, cause)
            .await
    }

    /// Groups addresses by governing locator and unregisters the groups
    /// concurrently. Every group runs; the first error is returned.
    async fn unregister_many(
        &self,
        addresses: &[GrainAddress],
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError> {
        let mut groups: Vec<(Arc<dyn GrainLocator>, Vec<GrainAddress>)> = Vec::new();
        for address in addresses {
            let locator = self.locator_for(&address.grain_id);
            match groups.iter_mut().find(|(l, _)| Arc::ptr_eq(l, &locator)) {
                Some((_, group)) => group.push(address.clone()),
                None => groups.push((locator, vec![address.clone()])),
            }
        }

        let results = join_all(
            groups
                .iter()
                .map(|(locator, group)| locator.unregister_many(group, cause)),
        )
        .await;
        results.into_iter().collect()
    }

    fn try_lookup_in_cache(&self, grain_id: &GrainId) -> Option<GrainAddress> {
        self.locator_for(grain_id).try_lookup_in_cache(grain_id)
    }

    fn invalidate_cache(&self, grain_id: &GrainId) {
        self.locator_for(grain_id).invalidate_cache(grain_id);
    }
}
