//! Configuration system for the simulator.
//!
//! This module defines the configuration structures used to parameterize a
//! run. It provides:
//! 1. **Defaults:** Baseline cache geometry and latencies.
//! 2. **Structures:** `CacheConfig` (geometry) and `TimingConfig` (cycle
//!    costs), gathered under `Config`.
//! 3. **Validation:** Geometry checks performed once, before any cache is
//!    built.
//!
//! Configuration is supplied as JSON (`--config` on the CLI) or via
//! `Config::default()`.

use serde::Deserialize;

use crate::common::SimError;

/// Default configuration constants for the simulator.
mod defaults {
    /// Total private cache capacity per CPU (32 KiB).
    pub const CACHE_SIZE: usize = 32 * 1024;

    /// Cache line size in bytes.
    pub const LINE_SIZE: usize = 32;

    /// Cache associativity (ways per set).
    pub const WAYS: usize = 8;

    /// Cycles for a local cache access (hit service, bus data beat).
    pub const CACHE_LATENCY: u64 = 1;

    /// Cycles for main memory to serve a fill or accept a writeback.
    pub const MEM_LATENCY: u64 = 100;
}

/// Geometry of each private set-associative cache.
///
/// All CPUs share one geometry. The number of sets is derived:
/// `size_bytes / (line_bytes * ways)`; with the defaults that is
/// 32768 / (32 * 8) = 128 sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total capacity in bytes.
    pub size_bytes: usize,
    /// Line size in bytes.
    pub line_bytes: usize,
    /// Associativity (ways per set).
    pub ways: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size_bytes: defaults::CACHE_SIZE,
            line_bytes: defaults::LINE_SIZE,
            ways: defaults::WAYS,
        }
    }
}

impl CacheConfig {
    /// Number of sets implied by the geometry.
    pub const fn num_sets(&self) -> usize {
        self.size_bytes / (self.line_bytes * self.ways)
    }

    /// Rejects degenerate or non-dividing geometries.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if any dimension is zero or the capacity
    /// is not an exact multiple of `line_bytes * ways`.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.size_bytes == 0 || self.line_bytes == 0 || self.ways == 0 {
            return Err(SimError::Config(format!(
                "cache geometry must be nonzero: size={} line={} ways={}",
                self.size_bytes, self.line_bytes, self.ways
            )));
        }
        if self.size_bytes % (self.line_bytes * self.ways) != 0 {
            return Err(SimError::Config(format!(
                "cache size {} is not a multiple of line_bytes*ways ({})",
                self.size_bytes,
                self.line_bytes * self.ways
            )));
        }
        Ok(())
    }
}

/// Cycle costs charged by the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Cycles for a local cache access.
    pub cache_latency: u64,
    /// Cycles for a memory fill or writeback.
    pub mem_latency: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cache_latency: defaults::CACHE_LATENCY,
            mem_latency: defaults::MEM_LATENCY,
        }
    }
}

/// Root configuration structure.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use mcsim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.cache.num_sets(), 128);
/// assert_eq!(config.timing.mem_latency, 100);
/// ```
///
/// Deserializing an override file:
///
/// ```
/// use mcsim_core::config::Config;
///
/// let json = r#"{
///     "cache": { "size_bytes": 4096, "line_bytes": 32, "ways": 1 },
///     "timing": { "cache_latency": 1, "mem_latency": 100 }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.cache.num_sets(), 128);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Private cache geometry (shared by all CPUs).
    pub cache: CacheConfig,
    /// Cycle costs.
    pub timing: TimingConfig,
}

impl Config {
    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] for any rejected field; see
    /// [`CacheConfig::validate`].
    pub fn validate(&self) -> Result<(), SimError> {
        self.cache.validate()
    }
}
