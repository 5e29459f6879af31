//! Bounded pool of pre-instantiated guest instances.
//!
//! The pool eagerly creates all of its instances at construction, lends
//! them out one caller at a time under a fair semaphore with an acquisition
//! timeout, and reclaims them through an RAII [`Lease`] so that every
//! checkout is returned (or torn down) on every exit path.
//!
//! Invariant: while the pool is open, available permits plus outstanding
//! leases equal the capacity, and an instance is either idle in the pool or
//! checked out to exactly one lease. Instances are pushed back to the idle
//! set *before* their permit is released, so a granted permit always finds
//! an idle instance.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use guest_bridge_common::{BridgeError, PoolConfig};

use crate::instance::{GuestFactory, GuestInstance};

struct PoolState {
    idle: Vec<GuestInstance>,
    closed: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Fixed-capacity pool of guest instances.
///
/// Cloning the pool yields another handle to the same instances.
#[derive(Clone)]
pub struct InstancePool {
    shared: Arc<PoolShared>,
}

impl InstancePool {
    /// Build a pool by eagerly instantiating `capacity` instances.
    ///
    /// # Errors
    ///
    /// Returns `PoolInit` if any single instantiation fails; instances
    /// already created in this attempt are torn down and no partial pool
    /// is retained.
    pub async fn new(factory: &GuestFactory, config: &PoolConfig) -> Result<Self, BridgeError> {
        let mut idle = Vec::with_capacity(config.capacity);
        for instance_id in 0..config.capacity {
            match factory.instantiate(instance_id).await {
                Ok(instance) => idle.push(instance),
                Err(err) => {
                    debug!(created = idle.len(), "discarding partially built pool");
                    return Err(err);
                }
            }
        }

        info!(capacity = config.capacity, "instance pool ready");

        Ok(Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState { idle, closed: false }),
                permits: Arc::new(Semaphore::new(config.capacity)),
                capacity: config.capacity,
            }),
        })
    }

    /// Check out one instance, waiting at most `timeout`.
    ///
    /// This is the sole suspension point of an invocation. Waiters are
    /// served in FIFO order by the underlying semaphore, so none can be
    /// starved while instances are repeatedly freed to others.
    ///
    /// # Errors
    ///
    /// Returns `PoolExhausted` if no instance becomes available within
    /// `timeout`, or `Closed` (immediately, without waiting) once the pool
    /// has been closed.
    pub async fn acquire(&self, timeout: Duration) -> Result<Lease, BridgeError> {
        let wait = Arc::clone(&self.shared.permits).acquire_owned();
        let permit = match tokio::time::timeout(timeout, wait).await {
            Err(_elapsed) => {
                return Err(BridgeError::PoolExhausted {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            // The semaphore only errors once close() has shut it
            Ok(Err(_closed)) => return Err(BridgeError::Closed),
            Ok(Ok(permit)) => permit,
        };

        let instance = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(BridgeError::Closed);
            }
            state.idle.pop()
        };

        match instance {
            Some(instance) => {
                debug!(instance_id = instance.id(), "instance checked out");
                Ok(Lease {
                    instance: Some(instance),
                    shared: Arc::clone(&self.shared),
                    _permit: permit,
                })
            }
            None => {
                // unreachable while the push-before-permit ordering holds
                error!("pool bookkeeping out of sync: permit granted with no idle instance");
                Err(BridgeError::Closed)
            }
        }
    }

    /// Close the pool, tearing down all idle instances.
    ///
    /// Idempotent and non-blocking. Pending and future `acquire` calls fail
    /// immediately with `Closed`; instances currently checked out are torn
    /// down as their leases drop instead of being re-pooled.
    pub fn close(&self) {
        let drained = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.idle)
        };

        self.shared.permits.close();

        info!(torn_down = drained.len(), "instance pool closed");
    }

    /// The fixed capacity this pool was built with.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of instances currently idle in the pool.
    pub fn available(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Whether the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePool")
            .field("capacity", &self.shared.capacity)
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Checkout guard for one pooled instance.
///
/// Dropping the lease returns the instance to the pool, or tears it down
/// if the pool closed in the meantime. Exactly one return happens per
/// checkout, on every exit path out of the holder, which also makes double
/// release and release of a foreign instance unrepresentable.
pub struct Lease {
    instance: Option<GuestInstance>,
    shared: Arc<PoolShared>,
    // declared last: released only after the instance is back in the pool
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    /// Execute an operation on the leased instance.
    pub async fn call(&mut self, operation: &str, payload: &[u8]) -> Result<Vec<u8>, BridgeError> {
        match self.instance.as_mut() {
            Some(instance) => instance.call(operation, payload).await,
            None => Err(BridgeError::Closed),
        }
    }

    /// Identifier of the leased instance.
    pub fn instance_id(&self) -> Option<usize> {
        self.instance.as_ref().map(GuestInstance::id)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(instance) = self.instance.take() else {
            return;
        };
        let instance_id = instance.id();

        let mut state = self.shared.state.lock();
        if state.closed {
            drop(state);
            debug!(instance_id, "pool closed, tearing down returned instance");
        } else if state.idle.len() >= self.shared.capacity {
            drop(state);
            let err = BridgeError::release("idle set already at capacity");
            warn!(instance_id, error = %err, "instance discarded instead of re-pooled");
        } else {
            state.idle.push(instance);
            return;
        }
        // teardown paths fall through here with the instance dropped;
        // `_permit` is released afterwards either way
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("instance_id", &self.instance_id())
            .finish_non_exhaustive()
    }
}
