//! Per-instance execution context.
//!
//! This module provides:
//! - [`GuestContext`]: store data for one pooled instance, holding the
//!   injected host-callback dispatcher and the WASI stdio wiring
//! - [`CallScratch`]: per-call exchange state for the guest call protocol

use std::sync::Arc;

use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;

use guest_bridge_common::{SinkConfig, SinkTarget};

use crate::dispatch::HostDispatcher;

/// Store data for one pooled guest instance.
///
/// The context lives as long as the instance and is reused across calls;
/// only the [`CallScratch`] portion is per-call and is reset at the start
/// of each invocation. Host functions reach it through the
/// [`wasmtime::Caller`] API.
pub struct GuestContext {
    /// WASI context wiring guest stdio to the configured sinks.
    wasi: WasiP1Ctx,

    /// Host-callback dispatcher injected at bridge construction.
    dispatcher: Arc<dyn HostDispatcher>,

    /// Exchange state for the call currently executing on this instance.
    call: CallScratch,

    /// Stable identifier of the owning instance, for tracing.
    instance_id: usize,
}

/// Per-call exchange state for the guest call protocol.
///
/// The host seeds `operation` and `payload` before entering the guest;
/// the guest fills `response` or `guest_error` before returning. The
/// `host_response`/`host_error` pair holds the outcome of the most recent
/// host call until the guest collects it.
#[derive(Debug, Default)]
pub struct CallScratch {
    /// Operation name bytes the guest will request.
    pub operation: Vec<u8>,
    /// Request payload bytes the guest will request.
    pub payload: Vec<u8>,
    /// Result bytes delivered by the guest.
    pub response: Option<Vec<u8>>,
    /// Failure message delivered by the guest.
    pub guest_error: Option<String>,
    /// Response of the most recent host call.
    pub host_response: Option<Vec<u8>>,
    /// Error of the most recent host call.
    pub host_error: Option<String>,
}

impl GuestContext {
    /// Create a context for one instance.
    pub fn new(
        dispatcher: Arc<dyn HostDispatcher>,
        sinks: &SinkConfig,
        instance_id: usize,
    ) -> Self {
        let mut builder = WasiCtxBuilder::new();
        // WasiCtxBuilder discards output unless told to inherit
        if sinks.stdout == SinkTarget::Inherit {
            builder.inherit_stdout();
        }
        if sinks.stderr == SinkTarget::Inherit {
            builder.inherit_stderr();
        }

        Self {
            wasi: builder.build_p1(),
            dispatcher,
            call: CallScratch::default(),
            instance_id,
        }
    }

    /// Seed the scratch state for a new call, clearing any prior state.
    pub fn begin_call(&mut self, operation: &str, payload: &[u8]) {
        self.call = CallScratch {
            operation: operation.as_bytes().to_vec(),
            payload: payload.to_vec(),
            ..CallScratch::default()
        };
    }

    /// Take the scratch state of the finished call.
    pub fn finish_call(&mut self) -> CallScratch {
        std::mem::take(&mut self.call)
    }

    /// Borrow the scratch state of the call in progress.
    pub fn call(&self) -> &CallScratch {
        &self.call
    }

    /// Mutably borrow the scratch state of the call in progress.
    pub fn call_mut(&mut self) -> &mut CallScratch {
        &mut self.call
    }

    /// The dispatcher guest host-calls are routed to.
    pub fn dispatcher(&self) -> &dyn HostDispatcher {
        self.dispatcher.as_ref()
    }

    /// Identifier of the owning instance.
    pub fn instance_id(&self) -> usize {
        self.instance_id
    }

    /// Mutable access to the WASI context, for linker wiring.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }
}
