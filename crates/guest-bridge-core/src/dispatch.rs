//! Host-callback dispatch seam.
//!
//! Guest code may call back into the host while executing an operation.
//! The embedding application supplies a [`HostDispatcher`] at bridge
//! construction; it is the only route from guest code into host
//! functionality.

use guest_bridge_common::HostCallError;

/// One guest-originated call back into the host.
///
/// Names are UTF-8 identifiers chosen by the guest; the payload is opaque
/// to the bridge.
#[derive(Debug, Clone, Copy)]
pub struct HostCall<'a> {
    /// Target binding, typically empty for the default host.
    pub binding: &'a str,
    /// Namespace of the requested functionality.
    pub namespace: &'a str,
    /// Operation within the namespace.
    pub operation: &'a str,
    /// Opaque request payload.
    pub payload: &'a [u8],
}

/// Routes guest host-calls into embedder functionality.
///
/// The dispatcher is a capability injected per bridge, never a global, so
/// independent bridges (for example in tests) cannot interfere with each
/// other. Implementations must be thread-safe; up to pool-capacity guest
/// calls may dispatch concurrently.
pub trait HostDispatcher: Send + Sync {
    /// Handle one call from the guest, returning the response bytes.
    fn dispatch(&self, call: HostCall<'_>) -> Result<Vec<u8>, HostCallError>;
}

impl<F> HostDispatcher for F
where
    F: Fn(HostCall<'_>) -> Result<Vec<u8>, HostCallError> + Send + Sync,
{
    fn dispatch(&self, call: HostCall<'_>) -> Result<Vec<u8>, HostCallError> {
        self(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_dispatcher() {
        let dispatcher = |call: HostCall<'_>| {
            if call.operation == "ping" {
                Ok(b"pong".to_vec())
            } else {
                Err(HostCallError::UnknownOperation {
                    namespace: call.namespace.into(),
                    operation: call.operation.into(),
                })
            }
        };

        let call = HostCall {
            binding: "",
            namespace: "test",
            operation: "ping",
            payload: b"",
        };
        assert_eq!(dispatcher.dispatch(call).unwrap(), b"pong");

        let call = HostCall {
            binding: "",
            namespace: "test",
            operation: "nope",
            payload: b"",
        };
        let err = dispatcher.dispatch(call).unwrap_err();
        assert!(err.to_string().contains("test/nope"));
    }
}
