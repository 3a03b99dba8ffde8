//! The DHT directory seam.

use std::fmt;

use super::DirectoryError;
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// Directory spread over the live silos by ring ownership.
///
/// Each request is served by the silo owning the grain's ring position.
/// The DHT locator forwards to this trait without caching; the
/// implementation is responsible for routing and for handing entries over
/// when ownership moves.
///
/// # Orleans Reference
///
/// Corresponds to Orleans' `ILocalGrainDirectory` as used by
/// `DhtGrainLocator`: `RegisterAsync`, `LookupAsync`, `UnregisterAsync` and
/// `UnregisterManyAsync`, each removal tagged with its cause.
#[async_trait::async_trait]
pub trait LocalGrainDirectory: Send + Sync + fmt::Debug {
    /// Register an activation, or return the entry that already exists.
    ///
    /// An existing entry matching `previous` is replaced.
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, DirectoryError>;

    /// Look up the current activation of a grain.
    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, DirectoryError>;

    /// Remove an entry if it still names exactly this activation.
    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), DirectoryError>;

    /// Remove several entries with a shared cause.
    async fn unregister_many(
        &self,
        addresses: &[GrainAddress],
        cause: UnregistrationCause,
    ) -> Result<(), DirectoryError>;
}
