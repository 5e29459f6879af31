//! Wasmtime engine configuration and creation.
//!
//! The [`GuestEngine`] is the foundation of the bridge. It is:
//! - Thread-safe and shared by every instance derived from one module
//! - Configured for async instantiation and guest calls
//! - Optionally set up with fuel metering for per-call CPU bounding

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine, OptLevel};

use guest_bridge_common::{BridgeError, EngineConfig};

/// Thread-safe WebAssembly engine wrapper.
///
/// Wraps a Wasmtime [`Engine`] configured for pooled guest execution. The
/// engine is shared across all instances of a bridge and contains no
/// per-call state.
#[derive(Clone)]
pub struct GuestEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl GuestEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the Wasmtime configuration is rejected.
    pub fn new(config: &EngineConfig) -> Result<Self, BridgeError> {
        let mut wasmtime_config = Config::new();

        // Instantiation and guest calls go through the async API
        wasmtime_config.async_support(true);

        if config.fuel_metering {
            wasmtime_config.consume_fuel(true);
        }

        wasmtime_config.cranelift_opt_level(OptLevel::Speed);

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            BridgeError::invalid_config(format!("failed to create wasmtime engine: {e}"))
        })?;

        info!(
            fuel_metering = config.fuel_metering,
            "wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for GuestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestEngine")
            .field("fuel_metering", &self.config.fuel_metering)
            .field("max_fuel_per_call", &self.config.max_fuel_per_call)
            .finish_non_exhaustive()
    }
}
