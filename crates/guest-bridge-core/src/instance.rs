//! Guest instance lifecycle and invocation.
//!
//! This module provides:
//! - [`GuestFactory`]: creates pooled instances from one loaded module
//! - [`GuestInstance`]: one runnable instantiation, executing named
//!   operations against binary payloads via the guest call protocol
//!
//! An instance is created once, reused across calls for its pool lifetime,
//! and used by exactly one caller at a time.

use std::sync::Arc;

use tracing::{debug, instrument};
use wasmtime::{Linker, Store, Trap, TypedFunc};

use guest_bridge_common::{BridgeError, SinkConfig};

use crate::context::GuestContext;
use crate::dispatch::HostDispatcher;
use crate::engine::GuestEngine;
use crate::module::LoadedModule;

/// Creates guest instances from one loaded module.
///
/// Holds everything instantiation needs: the engine, the compiled module,
/// a linker with the host side of the call protocol registered, and the
/// host-callback dispatcher injected into every instance context.
pub struct GuestFactory {
    engine: GuestEngine,
    module: LoadedModule,
    linker: Linker<GuestContext>,
    dispatcher: Arc<dyn HostDispatcher>,
    sinks: SinkConfig,
}

impl GuestFactory {
    /// Create a new factory.
    pub fn new(
        engine: GuestEngine,
        module: LoadedModule,
        linker: Linker<GuestContext>,
        dispatcher: Arc<dyn HostDispatcher>,
        sinks: SinkConfig,
    ) -> Self {
        Self {
            engine,
            module,
            linker,
            dispatcher,
            sinks,
        }
    }

    /// The loaded module instances are derived from.
    pub fn module(&self) -> &LoadedModule {
        &self.module
    }

    /// Instantiate one guest instance.
    ///
    /// Creates a fresh store, instantiates the module, runs the guest's
    /// initializer once (`_start` if exported, otherwise `wapc_init`), and
    /// resolves the `__guest_call` entry point.
    ///
    /// # Errors
    ///
    /// Returns `PoolInit` if instantiation or initialization fails, or if
    /// the guest does not export `__guest_call`.
    #[instrument(skip(self), fields(content_hash = %self.module.content_hash()))]
    pub async fn instantiate(&self, instance_id: usize) -> Result<GuestInstance, BridgeError> {
        let context = GuestContext::new(Arc::clone(&self.dispatcher), &self.sinks, instance_id);
        let mut store = Store::new(self.engine.inner(), context);

        let fuel = self
            .engine
            .config()
            .fuel_metering
            .then_some(self.engine.config().max_fuel_per_call);
        if let Some(fuel) = fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::pool_init(format!("failed to set fuel: {e}")))?;
        }

        let instance = self
            .linker
            .instantiate_async(&mut store, self.module.inner())
            .await
            .map_err(|e| BridgeError::pool_init(format!("instantiation failed: {e}")))?;

        // TinyGo and Rust guests export `_start`, AssemblyScript `wapc_init`;
        // whichever is present runs exactly once per instance
        for initializer in ["_start", "wapc_init"] {
            if let Ok(func) = instance.get_typed_func::<(), ()>(&mut store, initializer) {
                func.call_async(&mut store, ()).await.map_err(|e| {
                    BridgeError::pool_init(format!(
                        "guest initializer '{initializer}' failed: {e}"
                    ))
                })?;
                break;
            }
        }

        let guest_call = instance
            .get_typed_func::<(i32, i32), i32>(&mut store, "__guest_call")
            .map_err(|_| BridgeError::pool_init("guest does not export __guest_call"))?;

        debug!(instance_id, "guest instance created");

        Ok(GuestInstance {
            store,
            guest_call,
            id: instance_id,
            fuel,
        })
    }
}

impl std::fmt::Debug for GuestFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestFactory")
            .field("content_hash", &self.module.content_hash())
            .finish_non_exhaustive()
    }
}

/// One runnable guest instantiation.
///
/// Never shared across concurrent invocations; the pool lends it to one
/// caller at a time, so no internal synchronization is needed.
pub struct GuestInstance {
    store: Store<GuestContext>,
    guest_call: TypedFunc<(i32, i32), i32>,
    id: usize,
    fuel: Option<u64>,
}

impl GuestInstance {
    /// Stable identifier of this instance within its pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Execute the named operation against the given payload.
    ///
    /// Seeds the call scratch, re-arms the fuel budget when metering is
    /// enabled, and enters the guest through `__guest_call`.
    ///
    /// # Errors
    ///
    /// Returns `Invocation` (carrying the operation name) if the guest
    /// traps, exhausts its fuel, or reports a failure, including the case
    /// of an operation unknown to the guest.
    pub async fn call(&mut self, operation: &str, payload: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let op_len = i32::try_from(operation.len())
            .map_err(|_| BridgeError::invocation(operation, "operation name too large"))?;
        let payload_len = i32::try_from(payload.len())
            .map_err(|_| BridgeError::invocation(operation, "payload too large"))?;

        self.store.data_mut().begin_call(operation, payload);

        if let Some(fuel) = self.fuel {
            self.store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::invocation(operation, format!("failed to arm fuel: {e}")))?;
        }

        debug!(instance_id = self.id, operation, payload_len, "invoking guest");

        let outcome = self
            .guest_call
            .call_async(&mut self.store, (op_len, payload_len))
            .await;

        let call = self.store.data_mut().finish_call();

        match outcome {
            Err(trap) if is_out_of_fuel(&trap) => Err(BridgeError::invocation(
                operation,
                "fuel exhausted: cpu limit exceeded",
            )),
            Err(trap) => Err(BridgeError::invocation(
                operation,
                format!("guest trapped: {trap}"),
            )),
            Ok(0) => {
                let reason = call
                    .guest_error
                    .unwrap_or_else(|| "guest reported failure".to_string());
                Err(BridgeError::invocation(operation, reason))
            }
            Ok(_) => Ok(call.response.unwrap_or_default()),
        }
    }
}

impl std::fmt::Debug for GuestInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestInstance")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Check if an error is due to fuel exhaustion.
fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}
