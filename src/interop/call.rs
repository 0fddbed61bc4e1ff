//! VTable dispatch - the one place foreign memory is read
//!
//! `invoke` resolves a slot in an object's function-pointer table and calls
//! it with the `extern "system"` convention. Every other component goes
//! through this function.

use super::types::{AbiWord, CallFrame, MarshaledArgs, NativeHandle, VTableSlot, MAX_FRAME_WORDS};
use core::ffi::c_void;
use tracing::trace;

/// Value returned by `invoke` on a null handle
pub const SENTINEL: AbiWord = 0;

/// Call method `slot` on `handle` with `args` after the implicit receiver.
///
/// A null handle returns [`SENTINEL`] without touching memory.
///
/// # Safety
/// - `handle` must be null or a live object with a vtable pointer in its
///   first word
/// - `slot` must be within that vtable
/// - `args` must match what the method at `slot` expects
pub unsafe fn invoke(handle: NativeHandle, slot: VTableSlot, args: &MarshaledArgs<'_>) -> AbiWord {
    if handle.is_null() {
        trace!(target: "dispatch", slot = slot.index(), "invoke on null handle");
        return SENTINEL;
    }

    let vtable = *(handle.as_raw() as *const *const *const c_void);
    let target = *vtable.add(slot.index());

    let frame = CallFrame::method(handle, args);
    trace!(
        target: "dispatch",
        handle = ?handle,
        slot = slot.index(),
        words = frame.len(),
        "invoke"
    );
    call_frame(target, &frame)
}

/// Call a plain exported function (no receiver)
///
/// # Safety
/// `target` must be a function whose parameters are `args`, word for word.
pub(crate) unsafe fn call_export(target: *const c_void, args: &MarshaledArgs<'_>) -> AbiWord {
    let frame = CallFrame::function(args);
    trace!(target: "dispatch", address = ?target, words = frame.len(), "call export");
    call_frame(target, &frame)
}

macro_rules! dispatch_arity {
    (@word $idx:tt) => { AbiWord };
    ($target:ident, $frame:ident; $($n:literal => ($($idx:tt),*)),* $(,)?) => {
        match $frame.len() {
            $(
                $n => {
                    let f: unsafe extern "system" fn($(dispatch_arity!(@word $idx)),*) -> AbiWord =
                        core::mem::transmute($target);
                    f($($frame[$idx]),*)
                }
            )*
            n => unreachable!("frame of {} words exceeds {}", n, MAX_FRAME_WORDS),
        }
    };
}

/// Issue the native call for a fully built frame
unsafe fn call_frame(target: *const c_void, frame: &CallFrame) -> AbiWord {
    let words = frame.words();
    dispatch_arity!(target, words;
        0 => (),
        1 => (0),
        2 => (0, 1),
        3 => (0, 1, 2),
        4 => (0, 1, 2, 3),
        5 => (0, 1, 2, 3, 4),
        6 => (0, 1, 2, 3, 4, 5),
        7 => (0, 1, 2, 3, 4, 5, 6),
        8 => (0, 1, 2, 3, 4, 5, 6, 7),
        9 => (0, 1, 2, 3, 4, 5, 6, 7, 8),
        10 => (0, 1, 2, 3, 4, 5, 6, 7, 8, 9),
        11 => (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10),
        12 => (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11),
        13 => (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12),
        14 => (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13),
        15 => (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14),
        16 => (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15),
    )
}
