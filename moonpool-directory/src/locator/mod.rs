//! Grain locators: where does a grain's activation live?
//!
//! A locator is what the runtime asks when it needs to send a message to a
//! grain. Three strategies sit behind one [`GrainLocator`] contract:
//!
//! - [`CachedGrainLocator`]: an external [`GrainDirectory`](crate::GrainDirectory)
//!   with a local cache invalidated by membership changes.
//! - [`DhtGrainLocator`]: forwards to the ring-partitioned
//!   [`LocalGrainDirectory`](crate::LocalGrainDirectory), no cache.
//! - [`ClientGrainLocator`]: routes to connected clients, which are never
//!   registered in a directory.
//!
//! [`GrainLocatorResolver`] picks the strategy per grain type and
//! [`ClusterGrainLocator`] dispatches on the grain id so callers hold a
//! single locator.
//!
//! # Orleans Reference
//!
//! Corresponds to Orleans' `IGrainLocator` with `CachedGrainLocator`,
//! `DhtGrainLocator`, `ClientGrainLocator` and `GrainLocatorResolver`.

mod cached;
mod client;
mod dht;
mod facade;
mod resolver;

use std::fmt;

pub use cached::{CachedGrainLocator, LocatorState};
pub use client::{ClientGrainLocator, ClientRouteTable};
pub use dht::DhtGrainLocator;
pub use facade::ClusterGrainLocator;
pub use resolver::GrainLocatorResolver;

use crate::directory::DirectoryError;
use crate::silo::SiloAddress;
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// Errors from locator operations.
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    /// The underlying directory failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Every registration attempt was won by an activation on a dead silo.
    #[error("registration of {grain_id} kept losing to dead silos after {attempts} attempts")]
    StaleRegistration {
        /// The grain being registered.
        grain_id: GrainId,
        /// Number of register calls issued.
        attempts: u32,
    },

    /// The activation is hosted on a silo that is already dead.
    #[error("activation of {grain_id} is hosted on dead silo {silo}")]
    SiloDead {
        /// The grain being registered.
        grain_id: GrainId,
        /// The dead host.
        silo: SiloAddress,
    },

    /// Clients are routed by connection, never registered.
    #[error("client {grain_id} cannot be registered in a grain directory")]
    ClientRegistration {
        /// The client grain id.
        grain_id: GrainId,
    },

    /// The locator is not running.
    #[error("locator is {state}")]
    NotActive {
        /// State the locator was found in.
        state: LocatorState,
    },
}

/// Resolves grain identities to activation addresses.
#[async_trait::async_trait]
pub trait GrainLocator: Send + Sync + fmt::Debug {
    /// Register an activation. Returns the committed address, which may be
    /// another activation that won the race.
    ///
    /// When `previous` is given and is still the registered activation, it is
    /// replaced by `address`.
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, LocatorError>;

    /// Find the live activation of `grain_id`, if any.
    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, LocatorError>;

    /// Remove an activation if it is still the registered one.
    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError>;

    /// Remove several activations with a shared cause.
    ///
    /// The default unregisters one at a time and stops at the first error.
    async fn unregister_many(
        &self,
        addresses: &[GrainAddress],
        cause: UnregistrationCause,
    ) -> Result<(), LocatorError> {
        for address in addresses {
            self.unregister(address, cause).await?;
        }
        Ok(())
    }

    /// Cached address of `grain_id`. Never performs I/O.
    fn try_lookup_in_cache(&self, grain_id: &GrainId) -> Option<GrainAddress>;

    /// Forget any cached address of `grain_id`.
    fn invalidate_cache(&self, grain_id: &GrainId);
}
