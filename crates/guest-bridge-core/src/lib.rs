//! Core execution machinery for guest-bridge.
//!
//! This crate provides the building blocks the bridge facade assembles:
//! - [`GuestEngine`]: configured Wasmtime engine
//! - [`LoadedModule`]: compiled guest module wrapper
//! - [`GuestContext`]: per-instance store data
//! - [`GuestFactory`] / [`GuestInstance`]: instance creation and invocation
//! - [`InstancePool`]: bounded checkout/return of instances
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     GuestEngine                         │
//! │  (Shared across all instances, thread-safe)             │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    LoadedModule                         │
//! │  (Compiled once, shared across instances)               │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           InstancePool ── C × GuestInstance             │
//! │  (Checked out one caller at a time via Lease)           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod dispatch;
pub mod engine;
pub mod instance;
pub mod module;
pub mod pool;

pub use context::{CallScratch, GuestContext};
pub use dispatch::{HostCall, HostDispatcher};
pub use engine::GuestEngine;
pub use instance::{GuestFactory, GuestInstance};
pub use module::LoadedModule;
pub use pool::{InstancePool, Lease};
