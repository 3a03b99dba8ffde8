//! Pluggable grain directory store.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use super::DirectoryError;
use crate::silo::SiloAddress;
use crate::types::{GrainAddress, GrainId, UnregistrationCause};

/// External directory store mapping grain identities to activations.
///
/// This is the seam a table store, a key-value store or any other shared
/// backend plugs into. The cached locator sits in front of it.
///
/// # Register Semantics
///
/// `register()` is idempotent with conflict detection:
/// - If no entry exists: registers the new address, returns it
/// - If the existing entry matches `previous`: replaces it, returns the new address
/// - Otherwise: does NOT overwrite, returns the existing entry
///
/// The caller compares the returned `GrainAddress` with what it tried to
/// register. If they differ, another activation won and the caller should
/// use the returned address instead.
///
/// # Orleans Reference
///
/// Corresponds to Orleans' `IGrainDirectory`:
/// - `Register(GrainAddress, GrainAddress?)` → returns existing on conflict,
///   replaces an entry matching the previous address
/// - `Lookup(GrainId)` → returns `GrainAddress?`
/// - `Unregister(GrainAddress)` → removes only if the activation matches
/// - `UnregisterSilos(List<SiloAddress>)` → batch cleanup on silo death
#[async_trait::async_trait]
pub trait GrainDirectory: Send + Sync + fmt::Debug {
    /// Register an activation, or return the entry that already exists.
    ///
    /// When `previous` is given and the stored entry matches it, the entry is
    /// replaced by `address`.
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, DirectoryError>;

    /// Look up the current activation of a grain.
    ///
    /// Returns `Ok(None)` if the grain is not registered.
    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, DirectoryError>;

    /// Remove an entry, only if it still names exactly this activation.
    ///
    /// Returns `Ok(())` if the entry was removed or didn't exist.
    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), DirectoryError>;

    /// Remove every entry hosted on any of `silos`.
    ///
    /// Called once per batch of silos declared dead.
    async fn unregister_silos(&self, silos: &[SiloAddress]) -> Result<(), DirectoryError>;
}

/// In-memory directory store.
///
/// All operations are O(1) map operations behind a short lock. No network
/// calls, no persistence. Suitable for single-process clusters and tests.
#[derive(Debug, Default)]
pub struct InMemoryGrainDirectory {
    entries: Mutex<HashMap<GrainId, GrainAddress>>,
}

impl InMemoryGrainDirectory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries currently stored. Order is unspecified.
    pub fn entries(&self) -> Vec<GrainAddress> {
        self.entries.lock().values().cloned().collect()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the directory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl GrainDirectory for InMemoryGrainDirectory {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> Result<GrainAddress, DirectoryError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(&address.grain_id) {
            Some(existing) if previous.is_some_and(|prev| existing.matches(prev)) => {
                tracing::debug!(
                    grain_id = %address.grain_id,
                    replaced = %existing.activation_id,
                    "grain registration replaced"
                );
                *existing = address.clone();
                Ok(address)
            }
            Some(existing) => Ok(existing.clone()),
            None => {
                entries.insert(address.grain_id.clone(), address.clone());
                Ok(address)
            }
        }
    }

    async fn lookup(&self, grain_id: &GrainId) -> Result<Option<GrainAddress>, DirectoryError> {
        Ok(self.entries.lock().get(grain_id).cloned())
    }

    async fn unregister(
        &self,
        address: &GrainAddress,
        cause: UnregistrationCause,
    ) -> Result<(), DirectoryError> {
        let mut entries = self.entries.lock();
        let matches = entries
            .get(&address.grain_id)
            .is_some_and(|existing| existing.matches(address));
        if matches {
            entries.remove(&address.grain_id);
            tracing::debug!(grain_id = %address.grain_id, %cause, "grain unregistered");
        }
        Ok(())
    }

    async fn unregister_silos(&self, silos: &[SiloAddress]) -> Result<(), DirectoryError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, addr| !silos.contains(&addr.silo));
        tracing::debug!(
            silos = silos.len(),
            removed = before - entries.len(),
            "unregistered silos"
        );
        Ok(())
    }
}
