//! Directory configuration.
//!
//! [`DirectoryConfig`] carries the knobs shared by every silo of a cluster:
//! ring granularity, the stale-registration retry bound, and the manifest
//! binding grain types to named external directories.
//!
//! # Example
//!
//! ```rust
//! # use moonpool_directory::{DirectoryConfig, GrainType};
//! let config = DirectoryConfig::builder()
//!     .virtual_buckets_per_silo(60)
//!     .grain_directory(GrainType(0xBA4E_4B00), "tables")
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.directory_for(GrainType(0xBA4E_4B00)), Some("tables"));
//! ```

use serde::{Deserialize, Serialize};

use crate::types::GrainType;

/// Default number of virtual buckets each silo places on the ring.
pub const DEFAULT_VIRTUAL_BUCKETS_PER_SILO: u32 = 30;

/// Default number of retries when a registration is won by a dead silo.
pub const DEFAULT_STALE_REGISTRATION_RETRIES: u32 = 1;

/// Binds a grain type to a named external directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrainDirectoryBinding {
    /// The grain type.
    pub grain_type: GrainType,
    /// Name the directory was registered under.
    pub directory: String,
}

/// Cluster-wide directory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Virtual buckets per silo on the hash ring. At least 1.
    pub virtual_buckets_per_silo: u32,
    /// How many times a registration won by a dead silo is retried.
    pub stale_registration_retries: u32,
    /// Grain type → directory name. Unlisted types use the `"default"`
    /// directory if one is registered, the DHT otherwise.
    pub grain_directories: Vec<GrainDirectoryBinding>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            virtual_buckets_per_silo: DEFAULT_VIRTUAL_BUCKETS_PER_SILO,
            stale_registration_retries: DEFAULT_STALE_REGISTRATION_RETRIES,
            grain_directories: Vec::new(),
        }
    }
}

impl DirectoryConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> DirectoryConfigBuilder {
        DirectoryConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.virtual_buckets_per_silo == 0 {
            return Err(ConfigError::InvalidBucketCount);
        }
        for (i, binding) in self.grain_directories.iter().enumerate() {
            if self.grain_directories[..i]
                .iter()
                .any(|b| b.grain_type == binding.grain_type)
            {
                return Err(ConfigError::DuplicateGrainType {
                    grain_type: binding.grain_type,
                });
            }
        }
        Ok(())
    }

    /// Directory name bound to `grain_type`, if any.
    pub fn directory_for(&self, grain_type: GrainType) -> Option<&str> {
        self.grain_directories
            .iter()
            .find(|b| b.grain_type == grain_type)
            .map(|b| b.directory.as_str())
    }

    /// The manifest as `(grain type, directory name)` pairs.
    pub fn manifest(&self) -> impl Iterator<Item = (GrainType, String)> + '_ {
        self.grain_directories
            .iter()
            .map(|b| (b.grain_type, b.directory.clone()))
    }
}

/// Builder for [`DirectoryConfig`].
#[derive(Debug)]
pub struct DirectoryConfigBuilder {
    config: DirectoryConfig,
}

impl DirectoryConfigBuilder {
    /// Set the number of virtual buckets per silo.
    pub fn virtual_buckets_per_silo(mut self, buckets: u32) -> Self {
        self.config.virtual_buckets_per_silo = buckets;
        self
    }

    /// Set the stale-registration retry bound.
    pub fn stale_registration_retries(mut self, retries: u32) -> Self {
        self.config.stale_registration_retries = retries;
        self
    }

    /// Bind `grain_type` to the directory registered as `directory`.
    pub fn grain_directory(mut self, grain_type: GrainType, directory: impl Into<String>) -> Self {
        self.config.grain_directories.push(GrainDirectoryBinding {
            grain_type,
            directory: directory.into(),
        });
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket count is zero or a grain type is bound
    /// twice.
    pub fn build(self) -> Result<DirectoryConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Errors from building or loading a [`DirectoryConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON could not be parsed.
    #[error("invalid directory config: {0}")]
    Json(#[from] serde_json::Error),

    /// `virtual_buckets_per_silo` was zero.
    #[error("virtual_buckets_per_silo must be at least 1")]
    InvalidBucketCount,

    /// A grain type was bound to more than one directory.
    #[error("grain type {grain_type} is bound to more than one directory")]
    DuplicateGrainType {
        /// The grain type bound twice.
        grain_type: GrainType,
    },
}
