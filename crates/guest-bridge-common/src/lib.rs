//! Common types, errors, and configuration for guest-bridge.
//!
//! This crate provides shared functionality used across the guest-bridge
//! workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for the engine, pool, and output sinks

pub mod config;
pub mod error;

pub use config::{BridgeConfig, EngineConfig, PoolConfig, SinkConfig, SinkTarget};
pub use error::{BridgeError, HostCallError};
