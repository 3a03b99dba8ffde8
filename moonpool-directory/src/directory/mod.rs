//! Directory storage and ring ownership.
//!
//! Two families of directories live here:
//!
//! - [`GrainDirectory`]: an external store (shared table, key-value store)
//!   consulted through the cached locator. [`InMemoryGrainDirectory`] is the
//!   in-process implementation.
//! - [`LocalGrainDirectory`]: the DHT directory that spreads entries over the
//!   live silos by hash-ring ownership. [`PartitionedGrainDirectory`] is the
//!   in-process implementation, driven by a [`DirectoryMembershipSnapshot`].
//!
//! [`GrainDirectoryResolver`] decides, per grain type, which external store
//! governs it, or whether it falls back to the DHT.

mod grain_directory;
mod local;
mod partitioned;
mod resolver;
mod view;

pub use grain_directory::{GrainDirectory, InMemoryGrainDirectory};
pub use local::LocalGrainDirectory;
pub use partitioned::PartitionedGrainDirectory;
pub use resolver::{
    DEFAULT_DIRECTORY_NAME, GrainDirectoryResolver, GrainDirectoryResolverHook, NamedDirectory,
};
pub use view::{
    BucketHasher, DefaultBucketHasher, DirectoryMembershipService, DirectoryMembershipSnapshot,
    RingOwner,
};

use crate::types::GrainId;

/// Errors from directory operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The backing store could not serve the request.
    #[error("directory unavailable: {reason}")]
    Unavailable {
        /// Backend-specific failure description.
        reason: String,
    },

    /// No live silo owns the grain's ring position.
    #[error("no live silo owns {grain_id}")]
    NoOwner {
        /// The grain whose owner was requested.
        grain_id: GrainId,
    },

    /// The operation was abandoned before completion.
    #[error("directory operation cancelled")]
    Cancelled,
}
