//! Guest module compilation.
//!
//! This module provides [`LoadedModule`], a wrapper around Wasmtime's
//! [`Module`] holding the compiled representation of one guest program.
//! A loaded module is immutable; all pooled instances are derived from it.

use std::hash::{DefaultHasher, Hash, Hasher};

use tracing::{info, instrument};
use wasmtime::{Engine, Module};

use guest_bridge_common::BridgeError;

/// A compiled guest module.
///
/// Thread-safe and shared by every instance the pool derives from it.
/// Engine-side resources are released when the last handle is dropped,
/// which the bridge arranges to happen after the pool is torn down.
#[derive(Clone)]
pub struct LoadedModule {
    module: Module,

    /// Hash of the original bytecode, for logging and diagnostics.
    content_hash: String,
}

impl LoadedModule {
    /// Compile a guest module from raw WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns `Load` if the bytes are not a WebAssembly module or
    /// compilation fails.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, BridgeError> {
        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes)
            .map_err(|e| BridgeError::load(format!("compilation failed: {e}")))?;

        let content_hash = compute_hash(bytes);

        info!(content_hash = %content_hash, "guest module compiled");

        Ok(Self {
            module,
            content_hash,
        })
    }

    /// Compile a guest module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    ///
    /// # Errors
    ///
    /// Returns `Load` if compilation fails.
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, BridgeError> {
        let module = Module::new(engine, wat)
            .map_err(|e| BridgeError::load(format!("wat compilation failed: {e}")))?;

        Ok(Self {
            module,
            content_hash: compute_hash(wat.as_bytes()),
        })
    }

    /// Get the content hash of the original bytecode.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.module
    }

    /// Validate the WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() < 8 {
            return Err(BridgeError::load("invalid wasm: file too small"));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(BridgeError::load("invalid wasm: bad magic number"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
