//! Error types for the guest bridge.
//!
//! This module defines the bridge error taxonomy using `thiserror`:
//! - [`BridgeError`]: every failure the bridge and its pool can surface
//! - [`HostCallError`]: failures returned by host-callback dispatchers

use thiserror::Error;

/// Top-level guest bridge errors.
///
/// Construction failures (`Load`, `PoolInit`, `InvalidConfig`) are fatal to
/// the bridge being built. `PoolExhausted` is transient and may be retried.
/// `Release` is only ever reported through logging, never returned from an
/// invocation whose outcome was already determined.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Guest bytecode was malformed or failed to compile.
    #[error("guest load failed: {reason}")]
    Load {
        /// Description of the load failure.
        reason: String,
    },

    /// An instance could not be created while building the pool.
    #[error("pool initialization failed: {reason}")]
    PoolInit {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// No instance became available within the acquisition window.
    #[error("no pooled instance available within {timeout_ms}ms")]
    PoolExhausted {
        /// The acquisition timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The guest failed to execute the named operation.
    ///
    /// Covers both operations unknown to the guest and guest execution
    /// failures (traps, fuel exhaustion, guest-reported errors).
    #[error("operation '{operation}' failed: {reason}")]
    Invocation {
        /// The operation that was invoked.
        operation: String,
        /// The underlying cause.
        reason: String,
    },

    /// An instance could not be returned to the pool.
    #[error("instance release failed: {reason}")]
    Release {
        /// Description of the release failure.
        reason: String,
    },

    /// The bridge (or its pool) has been closed.
    #[error("bridge is closed")]
    Closed,

    /// Invalid configuration was provided.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A host-callback dispatcher returned an error.
    #[error("host call error: {0}")]
    HostCall(#[from] HostCallError),
}

/// Errors returned by host-callback dispatchers.
///
/// Dispatchers route calls originating from guest code back into the
/// embedding application; these are the failures they may report.
#[derive(Error, Debug)]
pub enum HostCallError {
    /// The dispatcher does not implement the requested operation.
    #[error("unknown host operation: {namespace}/{operation}")]
    UnknownOperation {
        /// The namespace the guest addressed.
        namespace: String,
        /// The operation the guest requested.
        operation: String,
    },

    /// The dispatcher failed while handling the call.
    #[error("host call failed: {reason}")]
    Failed {
        /// Description of the dispatch failure.
        reason: String,
    },
}

impl BridgeError {
    /// Create a new `Load` error.
    pub fn load(reason: impl Into<String>) -> Self {
        Self::Load {
            reason: reason.into(),
        }
    }

    /// Create a new `PoolInit` error.
    pub fn pool_init(reason: impl Into<String>) -> Self {
        Self::PoolInit {
            reason: reason.into(),
        }
    }

    /// Create a new `Invocation` error for the given operation.
    pub fn invocation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invocation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Release` error.
    pub fn release(reason: impl Into<String>) -> Self {
        Self::Release {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the caller may retry the operation later.
    ///
    /// Only pool exhaustion is transient; every other failure is either
    /// fatal to the bridge or specific to the invoked operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Returns `true` if this error indicates the bridge was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl HostCallError {
    /// Create a new `Failed` error.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::load("bad magic number");
        assert_eq!(err.to_string(), "guest load failed: bad magic number");

        let err = BridgeError::PoolExhausted { timeout_ms: 250 };
        assert_eq!(
            err.to_string(),
            "no pooled instance available within 250ms"
        );

        let err = BridgeError::invocation("echo", "guest trapped");
        assert_eq!(err.to_string(), "operation 'echo' failed: guest trapped");

        assert_eq!(BridgeError::Closed.to_string(), "bridge is closed");
    }

    #[test]
    fn test_error_from_host_call() {
        let host_err = HostCallError::UnknownOperation {
            namespace: "state".into(),
            operation: "get".into(),
        };
        let bridge_err: BridgeError = host_err.into();

        assert!(matches!(bridge_err, BridgeError::HostCall(_)));
        assert!(
            bridge_err
                .to_string()
                .contains("unknown host operation: state/get")
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(BridgeError::PoolExhausted { timeout_ms: 10 }.is_retryable());
        assert!(!BridgeError::Closed.is_retryable());
        assert!(!BridgeError::invocation("echo", "trap").is_retryable());
        assert!(!BridgeError::load("bad bytes").is_retryable());
    }

    #[test]
    fn test_is_closed() {
        assert!(BridgeError::Closed.is_closed());
        assert!(!BridgeError::PoolExhausted { timeout_ms: 10 }.is_closed());
    }
}
