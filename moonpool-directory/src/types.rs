//! Core grain directory types.
//!
//! # Design
//!
//! - `GrainType` is a u64 tag naming a class of grains.
//! - `GrainId` is `GrainType` + a key (integer, GUID or string).
//! - `GrainAddress` is the value stored in the directory: which activation
//!   of which grain lives on which silo, and at which membership version the
//!   registrar saw the cluster when it registered.
//! - `UnregistrationCause` travels with every removal so storage backends
//!   can apply per-cause retention or logging.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::membership::MembershipVersion;
use crate::silo::{SiloAddress, fold_to_u32};

/// Identifies a grain TYPE.
///
/// This is a stable identifier for a class of grains, not a specific
/// instance.
///
/// # Convention
///
/// Use a hex constant:
/// ```rust
/// use moonpool_directory::GrainType;
/// const BANK_ACCOUNT: GrainType = GrainType(0xBA4E_4B00);
/// ```
#[derive(
    Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize, Debug,
)]
pub struct GrainType(pub u64);

impl GrainType {
    /// Reserved type for client (non-grain) addressable objects.
    ///
    /// Always resolved to the client locator, never to a directory.
    pub const CLIENT: GrainType = GrainType(u64::MAX);

    /// Whether this is the reserved client type.
    pub fn is_client(self) -> bool {
        self == Self::CLIENT
    }
}

impl fmt::Display for GrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_client() {
            write!(f, "client")
        } else {
            write!(f, "{:x}", self.0)
        }
    }
}

/// Key part of a [`GrainId`].
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub enum GrainKey {
    /// Integer-keyed grain.
    Integer(u64),
    /// GUID-keyed grain.
    Guid(u128),
    /// String-keyed grain (e.g. "player-42").
    String(String),
}

impl fmt::Display for GrainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(key) => write!(f, "{key}"),
            Self::Guid(key) => write!(f, "{key:032x}"),
            Self::String(key) => write!(f, "{key}"),
        }
    }
}

/// Globally unique identity of a grain: type + key.
///
/// # Examples
///
/// ```rust
/// use moonpool_directory::{GrainId, GrainType};
///
/// let player = GrainId::from_string(GrainType(0x504C_4159), "player-42");
/// assert_eq!(player.to_string(), "504c4159/player-42");
/// ```
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct GrainId {
    /// The type of grain.
    pub grain_type: GrainType,
    /// The specific instance key.
    pub key: GrainKey,
}

impl GrainId {
    /// Create a new grain id.
    pub fn new(grain_type: GrainType, key: GrainKey) -> Self {
        Self { grain_type, key }
    }

    /// Create a string-keyed grain id.
    pub fn from_string(grain_type: GrainType, key: impl Into<String>) -> Self {
        Self::new(grain_type, GrainKey::String(key.into()))
    }

    /// Create an integer-keyed grain id.
    pub fn from_integer(grain_type: GrainType, key: u64) -> Self {
        Self::new(grain_type, GrainKey::Integer(key))
    }

    /// Create a GUID-keyed grain id.
    pub fn from_guid(grain_type: GrainType, key: u128) -> Self {
        Self::new(grain_type, GrainKey::Guid(key))
    }

    /// Position of this grain on the directory ring.
    ///
    /// Stable across processes: every silo computes the same owner for the
    /// same grain given the same membership view.
    pub fn uniform_hash(&self) -> u32 {
        let mut hasher = Xxh3::new();
        hasher.update(&self.grain_type.0.to_le_bytes());
        match &self.key {
            GrainKey::Integer(key) => {
                hasher.update(&[0]);
                hasher.update(&key.to_le_bytes());
            }
            GrainKey::Guid(key) => {
                hasher.update(&[1]);
                hasher.update(&key.to_le_bytes());
            }
            GrainKey::String(key) => {
                hasher.update(&[2]);
                hasher.update(key.as_bytes());
            }
        }
        fold_to_u32(hasher.digest())
    }
}

impl fmt::Display for GrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.grain_type, self.key)
    }
}

/// Unique identifier for a specific grain activation.
///
/// A grain deactivated and later re-activated (possibly on another silo)
/// gets a new `ActivationId`, which distinguishes stale directory entries
/// from current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationId(pub u64);

impl ActivationId {
    /// Create a new activation ID from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "act-{:016x}", self.0)
    }
}

/// Full address of a grain activation: identity + silo + activation.
///
/// This is the value stored in the directory. `register()` on a directory
/// returns the existing `GrainAddress` on conflict, so callers compare the
/// returned value with what they asked for to learn who won.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrainAddress {
    /// The grain's identity.
    pub grain_id: GrainId,
    /// The silo hosting this activation.
    pub silo: SiloAddress,
    /// Unique identifier for this specific activation.
    pub activation_id: ActivationId,
    /// Membership version observed by the registrar.
    pub membership_version: MembershipVersion,
}

impl GrainAddress {
    /// Create a new grain address.
    pub fn new(
        grain_id: GrainId,
        silo: SiloAddress,
        activation_id: ActivationId,
        membership_version: MembershipVersion,
    ) -> Self {
        Self {
            grain_id,
            silo,
            activation_id,
            membership_version,
        }
    }

    /// Whether `other` names the same activation (grain + silo + activation).
    ///
    /// The membership version is ignored: the same activation may be
    /// re-registered after the registrar observed a newer view.
    pub fn matches(&self, other: &GrainAddress) -> bool {
        self.grain_id == other.grain_id
            && self.silo == other.silo
            && self.activation_id == other.activation_id
    }
}

impl fmt::Display for GrainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} on {} ({})]",
            self.grain_id, self.activation_id, self.silo, self.membership_version
        )
    }
}

/// Why a directory entry is being removed.
///
/// Closed set: storage backends match on it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnregistrationCause {
    /// Explicit removal requested by the hosting silo or a client.
    Force,
    /// The registered activation was detected as non-existent.
    NonexistentActivation,
    /// Cleanup after the hosting silo was declared dead.
    SiloDied,
}

impl fmt::Display for UnregistrationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Force => write!(f, "Force"),
            Self::NonexistentActivation => write!(f, "NonexistentActivation"),
            Self::SiloDied => write!(f, "SiloDied"),
        }
    }
}
