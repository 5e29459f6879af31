//! Host function registration for the guest call protocol.
//!
//! This module registers, under the `wapc` import module, the functions a
//! guest uses to receive an invocation, deliver its result, and call back
//! into the host:
//!
//! - `__guest_request(op_ptr, payload_ptr)`: host writes the operation
//!   name and payload into guest memory
//! - `__guest_response(ptr, len)` / `__guest_error(ptr, len)`: guest
//!   delivers its result or failure
//! - `__host_call(bd_ptr, bd_len, ns_ptr, ns_len, op_ptr, op_len, ptr, len)`:
//!   guest calls back into the host, routed to the injected dispatcher
//! - `__host_response*` / `__host_error*`: guest retrieves the outcome of
//!   its most recent host call
//! - `__console_log(ptr, len)`: guest log line, emitted through `tracing`
//!
//! Guest stdio additionally reaches the configured sinks through WASI.
//!
//! # Memory Protocol
//!
//! All pointers are guest-relative offsets into the exported `memory`.
//! Reads and writes are bounds-checked; a protocol violation (negative
//! pointer, out-of-bounds range, missing memory export) traps the guest
//! call rather than corrupting state.

use anyhow::{Context as _, bail};
use tracing::{debug, info, warn};
use wasmtime::{Caller, Extern, Linker, Memory};

use guest_bridge_common::BridgeError;
use guest_bridge_core::{GuestContext, HostCall};

/// Import module name the guest call protocol lives under.
pub const PROTOCOL_MODULE: &str = "wapc";

/// Register the full host side of the guest call protocol, plus WASI
/// stdio wiring.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<GuestContext>) -> Result<(), BridgeError> {
    register_guest_exchange(linker)?;
    register_host_calls(linker)?;
    register_console_log(linker)?;

    wasmtime_wasi::preview1::add_to_linker_async(linker, GuestContext::wasi_mut)
        .map_err(|e| wiring_error("wasi", &e))?;

    Ok(())
}

/// Register the invocation exchange: request delivery and result return.
pub fn register_guest_exchange(linker: &mut Linker<GuestContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__guest_request",
            |mut caller: Caller<'_, GuestContext>,
             op_ptr: i32,
             payload_ptr: i32|
             -> anyhow::Result<()> {
                let memory = exported_memory(&mut caller)?;
                let (operation, payload) = {
                    let call = caller.data().call();
                    (call.operation.clone(), call.payload.clone())
                };
                write_bytes(&mut caller, &memory, op_ptr, &operation)?;
                write_bytes(&mut caller, &memory, payload_ptr, &payload)?;
                Ok(())
            },
        )
        .map_err(|e| wiring_error("__guest_request", &e))?;

    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__guest_response",
            |mut caller: Caller<'_, GuestContext>, ptr: i32, len: i32| -> anyhow::Result<()> {
                let memory = exported_memory(&mut caller)?;
                let bytes = read_bytes(&mut caller, &memory, ptr, len)?;
                caller.data_mut().call_mut().response = Some(bytes);
                Ok(())
            },
        )
        .map_err(|e| wiring_error("__guest_response", &e))?;

    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__guest_error",
            |mut caller: Caller<'_, GuestContext>, ptr: i32, len: i32| -> anyhow::Result<()> {
                let memory = exported_memory(&mut caller)?;
                let bytes = read_bytes(&mut caller, &memory, ptr, len)?;
                caller.data_mut().call_mut().guest_error =
                    Some(String::from_utf8_lossy(&bytes).into_owned());
                Ok(())
            },
        )
        .map_err(|e| wiring_error("__guest_error", &e))?;

    Ok(())
}

/// Register the host-call channel routed to the injected dispatcher.
#[allow(clippy::too_many_lines)]
pub fn register_host_calls(linker: &mut Linker<GuestContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__host_call",
            |mut caller: Caller<'_, GuestContext>,
             bd_ptr: i32,
             bd_len: i32,
             ns_ptr: i32,
             ns_len: i32,
             op_ptr: i32,
             op_len: i32,
             ptr: i32,
             len: i32|
             -> anyhow::Result<i32> {
                let memory = exported_memory(&mut caller)?;
                let binding = read_string(&mut caller, &memory, bd_ptr, bd_len)?;
                let namespace = read_string(&mut caller, &memory, ns_ptr, ns_len)?;
                let operation = read_string(&mut caller, &memory, op_ptr, op_len)?;
                let payload = read_bytes(&mut caller, &memory, ptr, len)?;

                debug!(
                    binding = %binding,
                    namespace = %namespace,
                    operation = %operation,
                    payload_len = payload.len(),
                    "guest host call"
                );

                let outcome = caller.data().dispatcher().dispatch(HostCall {
                    binding: &binding,
                    namespace: &namespace,
                    operation: &operation,
                    payload: &payload,
                });

                let call = caller.data_mut().call_mut();
                match outcome {
                    Ok(response) if i32::try_from(response.len()).is_err() => {
                        call.host_response = None;
                        call.host_error = Some("host response too large".into());
                        Ok(0)
                    }
                    Ok(response) => {
                        call.host_response = Some(response);
                        call.host_error = None;
                        Ok(1)
                    }
                    Err(err) => {
                        warn!(namespace = %namespace, operation = %operation, error = %err, "host call failed");
                        call.host_response = None;
                        call.host_error = Some(err.to_string());
                        Ok(0)
                    }
                }
            },
        )
        .map_err(|e| wiring_error("__host_call", &e))?;

    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__host_response_len",
            |caller: Caller<'_, GuestContext>| -> i32 {
                caller
                    .data()
                    .call()
                    .host_response
                    .as_ref()
                    .map_or(0, |r| i32::try_from(r.len()).unwrap_or(i32::MAX))
            },
        )
        .map_err(|e| wiring_error("__host_response_len", &e))?;

    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__host_response",
            |mut caller: Caller<'_, GuestContext>, ptr: i32| -> anyhow::Result<()> {
                let memory = exported_memory(&mut caller)?;
                let Some(bytes) = caller.data().call().host_response.clone() else {
                    bail!("no host response pending");
                };
                write_bytes(&mut caller, &memory, ptr, &bytes)
            },
        )
        .map_err(|e| wiring_error("__host_response", &e))?;

    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__host_error_len",
            |caller: Caller<'_, GuestContext>| -> i32 {
                caller
                    .data()
                    .call()
                    .host_error
                    .as_ref()
                    .map_or(0, |e| i32::try_from(e.len()).unwrap_or(i32::MAX))
            },
        )
        .map_err(|e| wiring_error("__host_error_len", &e))?;

    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__host_error",
            |mut caller: Caller<'_, GuestContext>, ptr: i32| -> anyhow::Result<()> {
                let memory = exported_memory(&mut caller)?;
                let Some(message) = caller.data().call().host_error.clone() else {
                    bail!("no host error pending");
                };
                write_bytes(&mut caller, &memory, ptr, message.as_bytes())
            },
        )
        .map_err(|e| wiring_error("__host_error", &e))?;

    Ok(())
}

/// Register the guest log channel.
pub fn register_console_log(linker: &mut Linker<GuestContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            PROTOCOL_MODULE,
            "__console_log",
            |mut caller: Caller<'_, GuestContext>, ptr: i32, len: i32| -> anyhow::Result<()> {
                let memory = exported_memory(&mut caller)?;
                let bytes = read_bytes(&mut caller, &memory, ptr, len)?;
                let message = String::from_utf8_lossy(&bytes);
                let instance_id = caller.data().instance_id();
                info!(target: "guest", instance_id, "{message}");
                Ok(())
            },
        )
        .map_err(|e| wiring_error("__console_log", &e))?;

    Ok(())
}

fn wiring_error(name: &str, err: &anyhow::Error) -> BridgeError {
    BridgeError::invalid_config(format!("failed to register {name}: {err}"))
}

/// Resolve the guest's exported linear memory.
fn exported_memory(caller: &mut Caller<'_, GuestContext>) -> anyhow::Result<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .context("guest module does not export its memory")
}

/// Read a byte range out of guest memory with bounds checking.
fn read_bytes(
    caller: &mut Caller<'_, GuestContext>,
    memory: &Memory,
    ptr: i32,
    len: i32,
) -> anyhow::Result<Vec<u8>> {
    if ptr < 0 || len < 0 {
        bail!("negative pointer or length in guest call");
    }

    #[allow(clippy::cast_sign_loss)]
    let (start, len) = (ptr as usize, len as usize);
    let end = start
        .checked_add(len)
        .context("pointer + length overflow")?;

    let data = memory.data(&*caller);
    if end > data.len() {
        bail!(
            "guest memory read out of bounds: {start}..{end} of {}",
            data.len()
        );
    }

    Ok(data[start..end].to_vec())
}

/// Read a UTF-8 name out of guest memory.
fn read_string(
    caller: &mut Caller<'_, GuestContext>,
    memory: &Memory,
    ptr: i32,
    len: i32,
) -> anyhow::Result<String> {
    let bytes = read_bytes(caller, memory, ptr, len)?;
    String::from_utf8(bytes).context("invalid utf-8 in host call name")
}

/// Write bytes into guest memory with bounds checking.
fn write_bytes(
    caller: &mut Caller<'_, GuestContext>,
    memory: &Memory,
    ptr: i32,
    bytes: &[u8],
) -> anyhow::Result<()> {
    if ptr < 0 {
        bail!("negative pointer in guest call");
    }

    #[allow(clippy::cast_sign_loss)]
    let start = ptr as usize;
    memory
        .write(&mut *caller, start, bytes)
        .context("guest memory write out of bounds")
}
