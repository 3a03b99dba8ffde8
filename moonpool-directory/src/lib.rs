//! # Moonpool Directory
//!
//! The grain directory of the moonpool virtual-actor runtime: for every
//! grain in the cluster, which silo hosts its activation, kept consistent
//! while silos join, leave and fail.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ClusterGrainLocator  (one entry point for every grain)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  GrainLocatorResolver (per grain type)                      │
//! │   ├─ CLIENT        → ClientGrainLocator → ClientRouteTable  │
//! │   ├─ named dir     → CachedGrainLocator → GrainDirectory    │
//! │   └─ otherwise     → DhtGrainLocator → LocalGrainDirectory  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DirectoryMembershipSnapshot: ring ownership per version    │
//! │  RingRange / RingRangeSet: 32-bit hash ring arithmetic      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MembershipService: snapshots + ordered update feed         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use moonpool_directory::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), LocatorError> {
//! let silo = SiloAddress::parse("10.0.0.1:4500@1").unwrap();
//! let membership = Arc::new(SharedMembership::with_members(vec![silo.clone()]));
//!
//! let dht = Arc::new(PartitionedGrainDirectory::with_membership(membership.clone(), 30));
//! let resolver = Arc::new(GrainLocatorResolver::new(
//!     Arc::new(GrainDirectoryResolver::dht_only()),
//!     Arc::new(DhtGrainLocator::new(dht)),
//!     Arc::new(ClientGrainLocator::new(Arc::new(ClientRouteTable::new()), membership.clone())),
//!     membership.clone(),
//!     1,
//! ));
//! let locator = ClusterGrainLocator::new(resolver);
//!
//! let alice = GrainId::from_string(GrainType(0xBA4E_4B00), "alice");
//! let address = GrainAddress::new(alice.clone(), silo, ActivationId(1), MembershipVersion(1));
//! locator.register(address.clone(), None).await?;
//! assert_eq!(locator.lookup(&alice).await?, Some(address));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ring`] - Hash ring ranges
//! - [`membership`] - Membership snapshots and feed
//! - [`directory`] - Directory stores, ring view, directory resolver
//! - [`locator`] - Locators and the locator resolver
//! - [`lifecycle`] - Staged startup/shutdown
//! - [`config`] - Directory configuration

#![deny(missing_docs)]

pub mod config;
pub mod directory;
pub mod lifecycle;
pub mod locator;
pub mod membership;
pub mod ring;
mod silo;
mod types;

pub use config::{ConfigError, DirectoryConfig, DirectoryConfigBuilder, GrainDirectoryBinding};
pub use directory::{
    BucketHasher, DEFAULT_DIRECTORY_NAME, DefaultBucketHasher, DirectoryError,
    DirectoryMembershipService, DirectoryMembershipSnapshot, GrainDirectory,
    GrainDirectoryResolver, GrainDirectoryResolverHook, InMemoryGrainDirectory,
    LocalGrainDirectory, NamedDirectory, PartitionedGrainDirectory, RingOwner,
};
pub use lifecycle::{
    LifecycleError, LifecycleObserver, LifecycleParticipant, LifecycleStage, ObserverError,
    SiloLifecycle,
};
pub use locator::{
    CachedGrainLocator, ClientGrainLocator, ClientRouteTable, ClusterGrainLocator,
    DhtGrainLocator, GrainLocator, GrainLocatorResolver, LocatorError, LocatorState,
};
pub use membership::{
    ClusterMember, ClusterMembershipSnapshot, MembershipError, MembershipService,
    MembershipUpdates, MembershipVersion, SharedMembership, SiloStatus,
};
pub use ring::{RING_SIZE, RingRange, RingRangeSet};
pub use silo::{AddressParseError, NetworkAddress, SiloAddress};
pub use types::{ActivationId, GrainAddress, GrainId, GrainKey, GrainType, UnregistrationCause};
