//! Pooled WebAssembly guest bridge.
//!
//! `guest-bridge` lets a host process invoke named operations implemented
//! by a sandboxed WebAssembly guest. A fixed-size pool of pre-instantiated
//! guest instances amortizes instantiation cost and bounds concurrency;
//! guests can call back into the host through a dispatcher injected at
//! construction.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use guest_bridge::{BridgeConfig, GuestBridge, HostCall};
//!
//! let dispatcher = Arc::new(|call: HostCall<'_>| {
//!     Ok(format!("handled {}/{}", call.namespace, call.operation).into_bytes())
//! });
//!
//! let bridge = GuestBridge::new(&bytecode, dispatcher, BridgeConfig::default()).await?;
//! let result = bridge.invoke("echo", b"ping").await?;
//! bridge.close();
//! ```

mod bridge;

pub use bridge::GuestBridge;
pub use guest_bridge_common::{
    BridgeConfig, BridgeError, EngineConfig, HostCallError, PoolConfig, SinkConfig, SinkTarget,
};
pub use guest_bridge_core::{HostCall, HostDispatcher};
