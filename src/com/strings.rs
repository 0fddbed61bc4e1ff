//! Foreign string types
//!
//! - `WideCString`: NUL-terminated UTF-16, borrowed by callees
//! - `Bstr`: length-prefixed automation string, owned by whoever holds it
//! - `Hstring`: immutable runtime-class string handle

use super::call_system;
use crate::error::DispatchError;
use crate::interop::{Arg, OutHandle};
use crate::outcome::ResultCode;
use core::ffi::c_void;
use core::fmt;
use core::ptr::NonNull;
use tracing::warn;

/// NUL-terminated UTF-16 string
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WideCString {
    units: Vec<u16>,
}

impl WideCString {
    /// Encode `s`; an embedded NUL would silently cut the string short, so it
    /// is rejected
    pub fn new(s: &str) -> Result<Self, DispatchError> {
        let mut units: Vec<u16> = s.encode_utf16().collect();
        if let Some(position) = units.iter().position(|&u| u == 0) {
            return Err(DispatchError::InteriorNul { position });
        }
        units.push(0);
        Ok(Self { units })
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u16 {
        self.units.as_ptr()
    }

    /// Code units without the terminator
    #[inline]
    pub fn as_wide(&self) -> &[u16] {
        &self.units[..self.units.len() - 1]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.units.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer argument for a call
    #[inline]
    pub fn as_arg(&self) -> Arg<'_> {
        Arg::slice(&self.units)
    }
}

impl fmt::Debug for WideCString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf16_lossy(self.as_wide()))
    }
}

/// Owned automation string: a 32-bit byte length, the UTF-16 text and a
/// terminating NUL, addressed by its first code unit
pub struct Bstr {
    ptr: NonNull<u16>,
}

impl Bstr {
    pub fn new(s: &str) -> Result<Self, DispatchError> {
        let units: Vec<u16> = s.encode_utf16().collect();
        Self::from_wide(&units)
    }

    pub fn from_wide(units: &[u16]) -> Result<Self, DispatchError> {
        let ptr = sys::alloc(units)?;
        Ok(Self { ptr })
    }

    /// Adopt a string allocated by the system allocator. `None` for null.
    ///
    /// # Safety
    /// `ptr` must be null or a live BSTR nobody else frees.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut u16) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    /// Give up ownership; the caller must free the string
    #[inline]
    pub fn into_raw(self) -> *mut u16 {
        let ptr = self.ptr.as_ptr();
        core::mem::forget(self);
        ptr
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u16 {
        self.ptr.as_ptr()
    }

    /// Length in code units, from the prefix
    #[inline]
    pub fn len(&self) -> usize {
        // SAFETY: every BSTR is preceded by its 4-byte byte length
        unsafe { sys::byte_len(self.ptr.as_ptr()) as usize / 2 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_wide(&self) -> &[u16] {
        // SAFETY: the prefix covers exactly `len` code units
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.as_wide())
    }

    /// Pointer argument for a call; the callee only borrows it
    #[inline]
    pub fn as_arg(&self) -> Arg<'_> {
        // SAFETY: the string outlives the returned argument
        unsafe { Arg::raw_ptr(self.ptr.as_ptr() as *const c_void) }
    }
}

impl Drop for Bstr {
    fn drop(&mut self) {
        // SAFETY: we own the allocation
        unsafe { sys::free(self.ptr.as_ptr()) }
    }
}

impl fmt::Display for Bstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Bstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bstr({:?})", self.to_string_lossy())
    }
}

impl PartialEq for Bstr {
    fn eq(&self, other: &Self) -> bool {
        self.as_wide() == other.as_wide()
    }
}

#[cfg(windows)]
mod sys {
    use super::{call_system, DispatchError, NonNull};
    use crate::interop::Arg;
    use crate::outcome::ResultCode;
    use tracing::warn;

    pub(super) fn alloc(units: &[u16]) -> Result<NonNull<u16>, DispatchError> {
        let len = u32::try_from(units.len()).map_err(|_| DispatchError::Foreign {
            interface: "oleaut32.dll",
            method: "SysAllocStringLen",
            code: ResultCode::E_INVALIDARG,
        })?;
        // SAFETY: SysAllocStringLen(const OLECHAR*, UINT) copies `len` units
        let word = unsafe {
            call_system(
                "oleaut32.dll",
                "SysAllocStringLen",
                &[Arg::slice(units), Arg::from(len)],
            )?
        };
        NonNull::new(word as *mut u16).ok_or(DispatchError::Foreign {
            interface: "oleaut32.dll",
            method: "SysAllocStringLen",
            code: ResultCode::E_OUTOFMEMORY,
        })
    }

    pub(super) unsafe fn free(ptr: *mut u16) {
        let arg = Arg::raw_ptr(ptr as *const core::ffi::c_void);
        if let Err(err) = call_system("oleaut32.dll", "SysFreeString", &[arg]) {
            warn!(target: "lifecycle", error = %err, "BSTR leaked");
        }
    }

    pub(super) unsafe fn byte_len(ptr: *const u16) -> u32 {
        *(ptr as *const u32).sub(1)
    }
}

#[cfg(not(windows))]
mod sys {
    //! Same layout as the system allocator, on the global heap
    use super::{DispatchError, NonNull};
    use crate::outcome::ResultCode;
    use std::alloc::{dealloc, Layout};

    const PREFIX: usize = core::mem::size_of::<u32>();

    fn layout(units: usize) -> Option<Layout> {
        Layout::from_size_align(PREFIX + (units + 1) * 2, PREFIX).ok()
    }

    pub(super) fn alloc(units: &[u16]) -> Result<NonNull<u16>, DispatchError> {
        let too_large = DispatchError::Foreign {
            interface: "bstr",
            method: "alloc",
            code: ResultCode::E_INVALIDARG,
        };
        let bytes = u32::try_from(units.len() * 2).map_err(|_| too_large.clone())?;
        let layout = layout(units.len()).ok_or(too_large)?;

        // SAFETY: the layout is non-zero sized; every byte is written below
        unsafe {
            let base = std::alloc::alloc(layout);
            if base.is_null() {
                return Err(DispatchError::Foreign {
                    interface: "bstr",
                    method: "alloc",
                    code: ResultCode::E_OUTOFMEMORY,
                });
            }
            (base as *mut u32).write(bytes);
            let text = base.add(PREFIX) as *mut u16;
            core::ptr::copy_nonoverlapping(units.as_ptr(), text, units.len());
            text.add(units.len()).write(0);
            Ok(NonNull::new_unchecked(text))
        }
    }

    pub(super) unsafe fn free(ptr: *mut u16) {
        let units = byte_len(ptr) as usize / 2;
        if let Some(layout) = layout(units) {
            dealloc((ptr as *mut u8).sub(PREFIX), layout);
        }
    }

    pub(super) unsafe fn byte_len(ptr: *const u16) -> u32 {
        *(ptr as *const u32).sub(1)
    }
}

/// Immutable runtime-class string. The null handle is the empty string.
pub struct Hstring {
    handle: *mut c_void,
}

impl Hstring {
    pub fn new(s: &str) -> Result<Self, DispatchError> {
        let units: Vec<u16> = s.encode_utf16().collect();
        let len = u32::try_from(units.len()).map_err(|_| DispatchError::Foreign {
            interface: "combase.dll",
            method: "WindowsCreateString",
            code: ResultCode::E_INVALIDARG,
        })?;

        let mut out = OutHandle::new();
        // SAFETY: WindowsCreateString(PCNZWCH, UINT32, HSTRING*) copies the text
        let word = unsafe {
            call_system(
                "combase.dll",
                "WindowsCreateString",
                &[Arg::slice(&units), Arg::from(len), Arg::out(&mut out)],
            )?
        };
        ResultCode::from_word(word).check("combase.dll", "WindowsCreateString")?;
        Ok(Self {
            handle: out.take().as_raw(),
        })
    }

    /// The empty string, which needs no allocation
    #[inline]
    pub const fn empty() -> Self {
        Self {
            handle: core::ptr::null_mut(),
        }
    }

    #[inline]
    pub fn as_raw(&self) -> *mut c_void {
        self.handle
    }

    /// Handle argument for a call; the callee only borrows it
    #[inline]
    pub fn as_arg(&self) -> Arg<'_> {
        // SAFETY: the string outlives the returned argument
        unsafe { Arg::raw_ptr(self.handle) }
    }

    pub fn to_string_lossy(&self) -> Result<String, DispatchError> {
        if self.handle.is_null() {
            return Ok(String::new());
        }
        let mut len: u32 = 0;
        // SAFETY: WindowsGetStringRawBuffer(HSTRING, UINT32*) returns a
        // buffer owned by the handle
        unsafe {
            let word = call_system(
                "combase.dll",
                "WindowsGetStringRawBuffer",
                &[self.as_arg(), Arg::out_value(&mut len)],
            )?;
            if word == 0 {
                return Ok(String::new());
            }
            let units = core::slice::from_raw_parts(word as *const u16, len as usize);
            Ok(String::from_utf16_lossy(units))
        }
    }
}

impl Drop for Hstring {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        // SAFETY: we own the handle
        let result = unsafe { call_system("combase.dll", "WindowsDeleteString", &[self.as_arg()]) };
        if let Err(err) = result {
            warn!(target: "lifecycle", error = %err, "HSTRING leaked");
        }
    }
}

impl fmt::Debug for Hstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hstring({:p})", self.handle)
    }
}
