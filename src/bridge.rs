//! The public bridge over one loaded guest program.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use wasmtime::Linker;

use guest_bridge_common::{BridgeConfig, BridgeError};
use guest_bridge_core::{GuestEngine, GuestFactory, HostDispatcher, InstancePool, LoadedModule};
use guest_bridge_host::register_all;

/// Invokes named operations in a sandboxed guest module over a bounded
/// pool of pre-instantiated execution instances.
///
/// A bridge owns one compiled guest program and its pool for the lifetime
/// of that program. Concurrent [`invoke`](Self::invoke) calls are bounded
/// only by pool capacity; each call runs on its own instance.
pub struct GuestBridge {
    pool: InstancePool,
    acquire_timeout: Duration,
    content_hash: String,
}

impl GuestBridge {
    /// Build a bridge from guest bytecode and a host-callback dispatcher.
    ///
    /// Compiles the bytecode, registers the guest call protocol, and
    /// eagerly instantiates the whole pool.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a rejected configuration, `Load` if the
    /// bytecode is malformed or fails to compile, and `PoolInit` if any
    /// instance fails to instantiate; in that case nothing of the
    /// partially built pool remains allocated.
    pub async fn new(
        bytecode: &[u8],
        dispatcher: Arc<dyn HostDispatcher>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        config.validate()?;

        let engine = GuestEngine::new(&config.engine)?;
        let module = LoadedModule::from_bytes(engine.inner(), bytecode)?;
        let content_hash = module.content_hash().to_string();

        let mut linker = Linker::new(engine.inner());
        register_all(&mut linker)?;

        let factory = GuestFactory::new(engine, module, linker, dispatcher, config.sinks.clone());
        let pool = InstancePool::new(&factory, &config.pool).await?;

        info!(
            content_hash = %content_hash,
            capacity = config.pool.capacity,
            "guest bridge ready"
        );

        Ok(Self {
            pool,
            acquire_timeout: config.pool.acquire_timeout(),
            content_hash,
        })
    }

    /// Invoke `operation` with `payload` on one pooled instance.
    ///
    /// Acquisition is bounded by the configured timeout; the instance is
    /// returned to the pool on every exit path, whether the guest
    /// succeeded, failed, or trapped.
    ///
    /// # Errors
    ///
    /// Returns `PoolExhausted` if no instance frees up within the window,
    /// `Closed` after [`close`](Self::close), and `Invocation` (carrying
    /// the operation name) if the guest fails or does not know the
    /// operation.
    pub async fn invoke(&self, operation: &str, payload: &[u8]) -> Result<Vec<u8>, BridgeError> {
        debug!(operation, "acquiring pooled instance");
        let mut lease = self.pool.acquire(self.acquire_timeout).await?;

        let result = lease.call(operation, payload).await;
        if let Err(err) = &result {
            warn!(operation, error = %err, "guest invocation failed");
        }
        result
    }

    /// Shut the bridge down.
    ///
    /// Idempotent. Closes the pool first (idle instances are torn down
    /// immediately, checked-out ones as their invocations finish); the
    /// compiled module is released when the bridge value is dropped. Any
    /// later `invoke` fails deterministically with `Closed`.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Whether the bridge has been closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Content hash of the loaded guest bytecode.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

impl std::fmt::Debug for GuestBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestBridge")
            .field("content_hash", &self.content_hash)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
