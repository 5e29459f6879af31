//! Host side of the guest call protocol for guest-bridge.
//!
//! This crate wires the functions a guest imports to exchange invocations
//! with the host onto a Wasmtime [`wasmtime::Linker`]. Calls originating
//! from the guest are routed to the [`guest_bridge_core::HostDispatcher`]
//! injected into each instance context, so the embedding application,
//! not this crate, decides what host functionality guests can reach.

pub mod linker;

pub use linker::{PROTOCOL_MODULE, register_all};
