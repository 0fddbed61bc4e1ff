//! Owning interface pointer
//!
//! `ComPtr<I>` owns exactly one foreign reference:
//! - clone acquires a new reference
//! - drop releases it, exactly once
//! - moving transfers it without touching the count
//!
//! Methods are called by name through `I`'s method table.

use super::guid::Guid;
use super::interfaces::Unknown;
use super::lifecycle::{acquire, query_raw, release};
use super::table::{Interface, MethodEntry, MethodTable};
use crate::error::DispatchError;
use crate::interop::{
    check_float_slots, check_shape, invoke, marshal, AbiWord, Arg, CallingConvention,
    MarshaledArgs, NativeHandle, OutHandle, VTableSlot,
};
use crate::outcome::{decode_factory, FactoryOutcome, ResultCode};
use core::ffi::c_void;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;
use tracing::{debug, trace};

/// Owned reference to a foreign object seen through interface `I`
pub struct ComPtr<I: Interface> {
    ptr: NonNull<c_void>,
    // raw pointer marker keeps the owner on the thread that created it
    _marker: PhantomData<*const I>,
}

impl<I: Interface> ComPtr<I> {
    /// Adopt one reference the caller already owns. `None` for a null handle.
    ///
    /// # Safety
    /// `handle` must be null or a live object implementing `I`, and the caller
    /// must own the reference being adopted.
    #[inline]
    pub unsafe fn from_raw(handle: NativeHandle) -> Option<Self> {
        NonNull::new(handle.as_raw()).map(|ptr| {
            trace!(target: "lifecycle", interface = I::NAME, handle = ?handle, "adopt");
            Self {
                ptr,
                _marker: PhantomData,
            }
        })
    }

    /// Borrow a handle, taking a new reference of our own.
    ///
    /// # Safety
    /// Same as [`from_raw`](Self::from_raw), except the caller keeps its own
    /// reference.
    pub unsafe fn from_borrowed(handle: NativeHandle) -> Option<Self> {
        if handle.is_null() {
            return None;
        }
        acquire(handle);
        Self::from_raw(handle)
    }

    /// Non-owning view of the handle
    #[inline]
    pub fn as_handle(&self) -> NativeHandle {
        // SAFETY: the pointer came from a live object handle
        unsafe { NativeHandle::from_raw(self.ptr.as_ptr()) }
    }

    /// Give up ownership without releasing
    #[inline]
    pub fn into_raw(self) -> NativeHandle {
        let handle = self.as_handle();
        core::mem::forget(self);
        handle
    }

    #[inline]
    pub fn methods() -> &'static MethodTable {
        I::methods()
    }

    /// Slot a method occupies in `I`'s table
    pub fn slot_of(method: &str) -> Result<VTableSlot, DispatchError> {
        I::methods().lookup(method).map(|entry| entry.slot)
    }

    /// Call a method by name and return its raw result word
    pub fn call(&self, method: &str, args: &[Arg<'_>]) -> Result<AbiWord, DispatchError> {
        // SAFETY: we own a reference, and `I`'s table describes the vtable
        unsafe { dispatch_method(self.as_handle(), I::methods(), method, args) }
    }

    /// Call a method that returns a status word; failures become errors
    pub fn call_hr(&self, method: &str, args: &[Arg<'_>]) -> Result<ResultCode, DispatchError> {
        let entry = I::methods().callable(method)?;
        // SAFETY: as in `call`
        let word = unsafe { dispatch_entry(self.as_handle(), I::methods(), entry, args)? };
        let code = ResultCode::from_word(word);
        if code.is_failure() {
            crate::logging::log_foreign_failure(I::NAME, entry.name, code);
        }
        code.check(I::NAME, entry.name)
    }

    /// Call a method whose last parameter receives a new object.
    ///
    /// The out-slot is appended to `args`. The produced handle is adopted
    /// only on success.
    ///
    /// # Safety
    /// The method must produce an object implementing `J` with one reference
    /// transferred to the caller.
    pub unsafe fn create<J: Interface>(
        &self,
        method: &str,
        args: &[Arg<'_>],
    ) -> Result<FactoryOutcome<ComPtr<J>>, DispatchError> {
        let entry = I::methods().callable(method)?;
        let mut out = OutHandle::new();
        let word = {
            let mut full: Vec<Arg<'_>> = Vec::with_capacity(args.len() + 1);
            full.extend_from_slice(args);
            full.push(Arg::out(&mut out));
            dispatch_entry(self.as_handle(), I::methods(), entry, &full)?
        };
        let outcome = decode_factory(ResultCode::from_word(word), out.take());
        match outcome {
            FactoryOutcome::PartialSuccess(code) => {
                crate::logging::log_partial_success(I::NAME, entry.name, code)
            }
            FactoryOutcome::Failure(code) => {
                crate::logging::log_foreign_failure(I::NAME, entry.name, code)
            }
            FactoryOutcome::Success(..) => {}
        }
        Ok(adopt_outcome(outcome))
    }

    /// Call a method ending in `(REFIID, void**)`, passing `J`'s IID.
    ///
    /// The IID and out-slot are appended to `args`.
    pub fn create_iid<J: Interface>(
        &self,
        method: &str,
        args: &[Arg<'_>],
    ) -> Result<FactoryOutcome<ComPtr<J>>, DispatchError> {
        let iid: Guid = J::IID;
        let mut full: Vec<Arg<'_>> = Vec::with_capacity(args.len() + 1);
        full.extend_from_slice(args);
        full.push(Arg::by_ref(&iid));
        // SAFETY: the object is asked for `J` by IID, so whatever it hands
        // back implements `J`.
        unsafe { self.create::<J>(method, &full) }
    }

    /// Probe for another interface on the same object
    pub fn query<J: Interface>(&self) -> FactoryOutcome<ComPtr<J>> {
        // SAFETY: live handle; the produced handle answers `J::IID`
        unsafe { adopt_outcome(query_raw(self.as_handle(), &J::IID)) }
    }

    /// Whether the object implements `J`
    pub fn supports<J: Interface>(&self) -> bool {
        let supported = self.query::<J>().is_success();
        debug!(
            target: "lifecycle",
            from = I::NAME,
            to = J::NAME,
            supported,
            "capability probe"
        );
        supported
    }

    /// `query` as a `Result`
    pub fn cast<J: Interface>(&self) -> Result<ComPtr<J>, DispatchError> {
        self.query::<J>().into_result(J::NAME, "QueryInterface")
    }

    /// Same object seen through its base `IUnknown`
    pub fn to_unknown(&self) -> ComPtr<Unknown> {
        // SAFETY: every interface begins with the IUnknown slots
        unsafe { acquire(self.as_handle()) };
        ComPtr {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<I: Interface> Clone for ComPtr<I> {
    #[inline]
    fn clone(&self) -> Self {
        // SAFETY: we own a reference, so the object is live
        unsafe { acquire(self.as_handle()) };
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<I: Interface> Drop for ComPtr<I> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: the reference we own is given up exactly once
        unsafe { release(self.as_handle()) };
    }
}

impl<I: Interface> PartialEq for ComPtr<I> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<I: Interface> Eq for ComPtr<I> {}

impl<I: Interface> fmt::Debug for ComPtr<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComPtr")
            .field("interface", &I::NAME)
            .field("handle", &self.as_handle())
            .finish()
    }
}

/// Turn a decoded handle outcome into owned pointers
///
/// # Safety
/// A successful handle must implement `I` and carry a reference for the caller.
pub(crate) unsafe fn adopt_outcome<I: Interface>(
    outcome: FactoryOutcome<NativeHandle>,
) -> FactoryOutcome<ComPtr<I>> {
    match outcome {
        FactoryOutcome::Success(handle, code) => match ComPtr::from_raw(handle) {
            Some(ptr) => FactoryOutcome::Success(ptr, code),
            None => FactoryOutcome::PartialSuccess(code),
        },
        FactoryOutcome::PartialSuccess(code) => FactoryOutcome::PartialSuccess(code),
        FactoryOutcome::Failure(code) => FactoryOutcome::Failure(code),
    }
}

/// Resolve `method` in `table` and call it on `handle`
///
/// # Safety
/// `handle` must be null or a live object whose vtable `table` describes.
pub(crate) unsafe fn dispatch_method(
    handle: NativeHandle,
    table: &'static MethodTable,
    method: &str,
    args: &[Arg<'_>],
) -> Result<AbiWord, DispatchError> {
    let entry = table.callable(method)?;
    dispatch_entry(handle, table, entry, args)
}

unsafe fn dispatch_entry(
    handle: NativeHandle,
    table: &'static MethodTable,
    entry: &MethodEntry,
    args: &[Arg<'_>],
) -> Result<AbiWord, DispatchError> {
    let words = prepare(table, entry, args)?;
    Ok(invoke(handle, entry.slot, &words))
}

/// Check arity and shape, then marshal
fn prepare<'a>(
    table: &MethodTable,
    entry: &MethodEntry,
    args: &[Arg<'a>],
) -> Result<MarshaledArgs<'a>, DispatchError> {
    if args.len() != entry.shape.len() {
        return Err(DispatchError::ArgCount {
            interface: table.interface(),
            method: entry.name,
            expected: entry.shape.len(),
            found: args.len(),
        });
    }
    let wrap = |source| DispatchError::Marshal {
        interface: table.interface(),
        method: entry.name,
        source,
    };
    check_shape(entry.shape, args).map_err(wrap)?;
    check_float_slots(CallingConvention::native(), entry.shape).map_err(wrap)?;
    marshal(args).map_err(wrap)
}
