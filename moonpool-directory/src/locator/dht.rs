//! Locator over the DHT directory.

use std::sync::Arc;

use super::{GrainLocator, LocatorError};
use crate::directory::LocalGrainDirectory;
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// Forwards every request to a [`LocalGrainDirectory`].
///
/// Keeps no cache: the ring partition of the local directory already routes
/// each grain to exactly one owner, and [`try_lookup_in_cache`] always
/// misses. Removal causes are passed through untouched.
///
/// [`try_lookup_in_cache`]: GrainLocator::try_lookup_in_cache
#[derive(Debug)]
pub struct DhtGrainLocator {
    directory: Arc<dyn LocalGrainDirectory>,
}

impl DhtGrainLocator {
    /// Create a locator over `directory`.
    pub fn new(directory: Arc<dyn LocalGrainDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait::async_trait]
impl GrainLocator for DhtGrainLocator {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, LocatorError> {
        Ok(self.directory.register(address, previous).await?)
    }

    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, LocatorError> {
        Ok(self.directory.lookup(grain_id).await?)
    }

    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError> {
        Ok(self.directory.unregister(address, cause).await?)
    }

    async fn unregister_many(
        &self,
        addresses: &[GrainAddress],
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError> {
        Ok(self.directory.unregister_many(addresses, cause).await?)
    }

    fn try_lookup_in_cache(&self, _grain_id: &GrainId) -> Option<GrainAddress> {
        None
    }

    fn invalidate_cache(&self, _grain_id: &GrainId) {}
}
