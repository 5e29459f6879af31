//! Configuration structures for the guest bridge.
//!
//! This module defines configuration options for the bridge components:
//! - [`BridgeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (fuel metering)
//! - [`PoolConfig`]: Instance pool sizing and acquisition timeout
//! - [`SinkConfig`]: Guest stdout/stderr sink destinations

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Top-level bridge configuration.
///
/// It can be loaded from files (TOML, JSON) or constructed in code; every
/// field has a serde default so partial documents deserialize cleanly.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Instance pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Guest output sink configuration.
    #[serde(default)]
    pub sinks: SinkConfig,
}

impl BridgeConfig {
    /// Validate the configuration before building a bridge from it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the pool capacity is zero, the acquisition
    /// timeout is zero, or fuel metering is enabled with a zero fuel budget.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.pool.capacity == 0 {
            return Err(BridgeError::invalid_config(
                "pool capacity must be at least 1",
            ));
        }
        if self.pool.acquire_timeout_ms == 0 {
            return Err(BridgeError::invalid_config(
                "acquisition timeout must be nonzero",
            ));
        }
        if self.engine.fuel_metering && self.engine.max_fuel_per_call == 0 {
            return Err(BridgeError::invalid_config(
                "max fuel per call must be nonzero when fuel metering is enabled",
            ));
        }
        Ok(())
    }
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable fuel metering.
    ///
    /// When enabled, each guest call runs under a fuel budget, bounding
    /// runaway executions deterministically.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Maximum fuel (CPU instructions) per guest call.
    ///
    /// A typical simple operation consumes ~1,000-10,000 fuel.
    #[serde(default = "defaults::max_fuel_per_call")]
    pub max_fuel_per_call: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_metering: defaults::fuel_metering(),
            max_fuel_per_call: defaults::max_fuel_per_call(),
        }
    }
}

/// Instance pool configuration.
///
/// The pool is sized once at construction; capacity bounds the number of
/// concurrently executing guest calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Number of instances created eagerly at pool construction.
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,

    /// Maximum wait for a pooled instance, in milliseconds.
    ///
    /// Bounds acquisition only; guest execution itself is bounded by fuel.
    #[serde(default = "defaults::acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::capacity(),
            acquire_timeout_ms: defaults::acquire_timeout_ms(),
        }
    }
}

impl PoolConfig {
    /// Get the acquisition timeout as a `Duration`.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Destination for one guest output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkTarget {
    /// Inherit the corresponding process stream.
    Inherit,
    /// Discard all output.
    Discard,
}

/// Guest stdout/stderr sink configuration.
///
/// Defaults to the process standard streams.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    /// Destination for guest standard output.
    #[serde(default = "defaults::sink_target")]
    pub stdout: SinkTarget,

    /// Destination for guest standard error.
    #[serde(default = "defaults::sink_target")]
    pub stderr: SinkTarget,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            stdout: defaults::sink_target(),
            stderr: defaults::sink_target(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    use super::SinkTarget;

    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn max_fuel_per_call() -> u64 {
        10_000_000
    }

    pub const fn capacity() -> usize {
        10
    }

    pub const fn acquire_timeout_ms() -> u64 {
        1_000
    }

    pub const fn sink_target() -> SinkTarget {
        SinkTarget::Inherit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();

        assert!(config.engine.fuel_metering);
        assert_eq!(config.engine.max_fuel_per_call, 10_000_000);
        assert_eq!(config.pool.capacity, 10);
        assert_eq!(config.pool.acquire_timeout_ms, 1_000);
        assert_eq!(config.sinks.stdout, SinkTarget::Inherit);
        assert_eq!(config.sinks.stderr, SinkTarget::Inherit);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_acquire_timeout() {
        let config = PoolConfig {
            acquire_timeout_ms: 250,
            ..Default::default()
        };

        assert_eq!(config.acquire_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = BridgeConfig {
            pool: PoolConfig {
                capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = BridgeConfig {
            pool: PoolConfig {
                acquire_timeout_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_fuel_budget() {
        let config = BridgeConfig {
            engine: EngineConfig {
                fuel_metering: true,
                max_fuel_per_call: 0,
            },
            ..Default::default()
        };

        assert!(config.validate().is_err());

        let config = BridgeConfig {
            engine: EngineConfig {
                fuel_metering: false,
                max_fuel_per_call: 0,
            },
            ..Default::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"pool": {"capacity": 4}}"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();

        // Explicitly set value
        assert_eq!(config.pool.capacity, 4);
        // Default values for unspecified fields
        assert_eq!(config.pool.acquire_timeout_ms, 1_000);
        assert!(config.engine.fuel_metering);
        assert_eq!(config.sinks.stdout, SinkTarget::Inherit);
    }

    #[test]
    fn test_config_serialization() {
        let config = BridgeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: BridgeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.pool.capacity, deserialized.pool.capacity);
        assert_eq!(
            config.engine.max_fuel_per_call,
            deserialized.engine.max_fuel_per_call
        );
    }
}
