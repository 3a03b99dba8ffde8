//! Silo addressing.
//!
//! - [`NetworkAddress`]: IP address + port where a silo listens.
//! - [`SiloAddress`]: network address + generation, identifying one
//!   incarnation of a silo. A silo restarted on the same endpoint gets a
//!   higher generation, so registrations made by the previous incarnation
//!   never alias the new one.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

/// Network address (IPv4/IPv6 + port).
///
/// # Examples
///
/// ```
/// use moonpool_directory::NetworkAddress;
/// use std::net::{IpAddr, Ipv4Addr};
///
/// let addr = NetworkAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4500);
/// assert_eq!(addr.to_string(), "127.0.0.1:4500");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// IP address (IPv4 or IPv6).
    pub ip: IpAddr,
    /// Port number.
    pub port: u16,
}

impl NetworkAddress {
    /// Create a new network address.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse from `ip:port` (or `[ipv6]:port`) notation.
    ///
    /// # Errors
    ///
    /// Returns an error if the IP or port cannot be parsed.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let (ip_str, port_str) = match s.strip_prefix('[') {
            Some(rest) => rest
                .split_once("]:")
                .ok_or(AddressParseError::MissingPort)?,
            None => s.rsplit_once(':').ok_or(AddressParseError::MissingPort)?,
        };
        let ip: IpAddr = ip_str.parse().map_err(|_| AddressParseError::InvalidIp)?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| AddressParseError::InvalidPort)?;
        Ok(Self::new(ip, port))
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// Error parsing a network or silo address from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// The IP address could not be parsed.
    #[error("invalid IP address")]
    InvalidIp,
    /// The port number could not be parsed.
    #[error("invalid port number")]
    InvalidPort,
    /// No port separator (`:`) found in the input.
    #[error("missing port separator")]
    MissingPort,
    /// The generation suffix (`@<generation>`) could not be parsed.
    #[error("invalid generation")]
    InvalidGeneration,
}

/// Identity of one silo incarnation: endpoint + generation.
///
/// Two addresses are equal iff both the endpoint and the generation match.
/// Equality is purely structural; nothing relies on reference identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiloAddress {
    /// Endpoint the silo listens on.
    pub endpoint: NetworkAddress,
    /// Monotonically increasing generation, bumped on every restart.
    pub generation: u64,
}

impl SiloAddress {
    /// Create a new silo address.
    pub fn new(endpoint: NetworkAddress, generation: u64) -> Self {
        Self {
            endpoint,
            generation,
        }
    }

    /// Parse from `ip:port@generation` notation.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint or generation cannot be parsed.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let (endpoint, generation) = s
            .rsplit_once('@')
            .ok_or(AddressParseError::InvalidGeneration)?;
        let generation = generation
            .parse()
            .map_err(|_| AddressParseError::InvalidGeneration)?;
        Ok(Self::new(NetworkAddress::parse(endpoint)?, generation))
    }

    /// Default virtual-bucket hash: stable across processes and platforms.
    ///
    /// The hash covers the endpoint, the generation and the bucket index, so
    /// a restarted silo lands on different points of the ring than its
    /// previous incarnation.
    pub fn bucket_hash(&self, bucket: u32) -> u32 {
        let mut hasher = Xxh3::new();
        match self.endpoint.ip {
            IpAddr::V4(ip) => hasher.update(&ip.octets()),
            IpAddr::V6(ip) => hasher.update(&ip.octets()),
        }
        hasher.update(&self.endpoint.port.to_le_bytes());
        hasher.update(&self.generation.to_le_bytes());
        hasher.update(&bucket.to_le_bytes());
        fold_to_u32(hasher.digest())
    }
}

impl fmt::Display for SiloAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.endpoint, self.generation)
    }
}

/// Fold a 64-bit digest into the 32-bit ring space.
pub(crate) fn fold_to_u32(digest: u64) -> u32 {
    ((digest >> 32) ^ digest) as u32
}
