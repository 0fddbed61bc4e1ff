//! Reference lifecycle primitives
//!
//! Raw AddRef/Release/QueryInterface on bare handles. Prefer `ComPtr`, which
//! pairs every acquire with exactly one release.

use super::guid::Guid;
use crate::interop::{invoke, marshal, Arg, MarshaledArgs, NativeHandle, OutHandle, VTableSlot};
use crate::outcome::{decode_factory, FactoryOutcome, ResultCode};
use tracing::trace;

/// Increment the foreign reference count. Returns the new count as reported
/// by the object (informational only); 0 for a null handle.
///
/// # Safety
/// `handle` must be null or a live object.
pub unsafe fn acquire(handle: NativeHandle) -> u32 {
    let count = invoke(handle, VTableSlot::ADD_REF, &MarshaledArgs::empty()) as u32;
    trace!(target: "lifecycle", handle = ?handle, count, "acquire");
    count
}

/// Decrement the foreign reference count; the object may be destroyed.
/// Returns the remaining count; 0 for a null handle.
///
/// # Safety
/// `handle` must be null or a live object, and the caller must own one of
/// its references. The handle must not be used after its last release.
pub unsafe fn release(handle: NativeHandle) -> u32 {
    let count = invoke(handle, VTableSlot::RELEASE, &MarshaledArgs::empty()) as u32;
    trace!(target: "lifecycle", handle = ?handle, count, "release");
    count
}

/// Ask an object for another of its interfaces.
///
/// A produced handle carries one new reference owned by the caller.
///
/// # Safety
/// `handle` must be null or a live object.
pub unsafe fn query_raw(handle: NativeHandle, iid: &Guid) -> FactoryOutcome<NativeHandle> {
    if handle.is_null() {
        return FactoryOutcome::Failure(ResultCode::E_POINTER);
    }

    let mut out = OutHandle::new();
    let args = [Arg::by_ref(iid), Arg::out(&mut out)];
    let code = match marshal(&args) {
        Ok(words) => ResultCode::from_word(invoke(handle, VTableSlot::QUERY_INTERFACE, &words)),
        // two pointer words always fit a frame
        Err(_) => ResultCode::E_UNEXPECTED,
    };
    trace!(target: "lifecycle", handle = ?handle, %iid, %code, "query interface");
    decode_factory(code, out.take())
}
