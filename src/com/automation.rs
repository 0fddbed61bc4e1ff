//! Late-bound automation over IDispatch
//!
//! Methods are resolved by name at run time (GetIDsOfNames) and called with
//! a reversed array of `Variant`s (Invoke).

use super::guid::Guid;
use super::interfaces::{Dispatch, Unknown};
use super::ptr::ComPtr;
use super::strings::{Bstr, WideCString};
use crate::error::DispatchError;
use crate::interop::{Arg, NativeHandle};
use core::ffi::c_void;
use core::fmt;
use tracing::debug;

/// Variant type tags
pub mod vt {
    pub const EMPTY: u16 = 0;
    pub const NULL: u16 = 1;
    pub const I4: u16 = 3;
    pub const R8: u16 = 5;
    pub const BSTR: u16 = 8;
    pub const DISPATCH: u16 = 9;
    pub const BOOL: u16 = 11;
    pub const UNKNOWN: u16 = 13;
}

pub const DISPATCH_METHOD: u16 = 1;
pub const DISPATCH_PROPERTYGET: u16 = 2;
pub const DISPATCH_PROPERTYPUT: u16 = 4;
pub const DISPID_PROPERTYPUT: i32 = -3;
pub const LOCALE_USER_DEFAULT: u32 = 0x0400;

const VARIANT_TRUE: i16 = -1;

#[derive(Clone, Copy)]
#[repr(C)]
union VariantData {
    i4: i32,
    r8: f64,
    boolean: i16,
    ptr: *mut c_void,
    _words: [usize; 2],
}

/// Tagged automation value; owns any string or object it holds
#[repr(C)]
pub struct Variant {
    vt: u16,
    _reserved: [u16; 3],
    data: VariantData,
}

impl Variant {
    #[inline]
    pub const fn empty() -> Self {
        Self::with(vt::EMPTY, VariantData { _words: [0; 2] })
    }

    #[inline]
    const fn with(vt: u16, data: VariantData) -> Self {
        Self {
            vt,
            _reserved: [0; 3],
            data,
        }
    }

    #[inline]
    pub fn i4(value: i32) -> Self {
        let mut v = Self::empty();
        v.vt = vt::I4;
        v.data.i4 = value;
        v
    }

    #[inline]
    pub fn r8(value: f64) -> Self {
        let mut v = Self::empty();
        v.vt = vt::R8;
        v.data.r8 = value;
        v
    }

    #[inline]
    pub fn boolean(value: bool) -> Self {
        let mut v = Self::empty();
        v.vt = vt::BOOL;
        v.data.boolean = if value { VARIANT_TRUE } else { 0 };
        v
    }

    pub fn bstr(value: Bstr) -> Self {
        let mut v = Self::empty();
        v.vt = vt::BSTR;
        v.data.ptr = value.into_raw() as *mut c_void;
        v
    }

    pub fn string(value: &str) -> Result<Self, DispatchError> {
        Bstr::new(value).map(Self::bstr)
    }

    pub fn dispatch(value: ComPtr<Dispatch>) -> Self {
        let mut v = Self::empty();
        v.vt = vt::DISPATCH;
        v.data.ptr = value.into_raw().as_raw();
        v
    }

    pub fn unknown(value: ComPtr<Unknown>) -> Self {
        let mut v = Self::empty();
        v.vt = vt::UNKNOWN;
        v.data.ptr = value.into_raw().as_raw();
        v
    }

    #[inline]
    pub fn var_type(&self) -> u16 {
        self.vt
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vt == vt::EMPTY
    }

    pub fn as_i4(&self) -> Option<i32> {
        // SAFETY: the tag says which field is live
        (self.vt == vt::I4).then(|| unsafe { self.data.i4 })
    }

    pub fn as_r8(&self) -> Option<f64> {
        // SAFETY: as above
        (self.vt == vt::R8).then(|| unsafe { self.data.r8 })
    }

    pub fn as_bool(&self) -> Option<bool> {
        // SAFETY: as above
        (self.vt == vt::BOOL).then(|| unsafe { self.data.boolean != 0 })
    }

    /// Text of a string variant
    pub fn as_string(&self) -> Option<String> {
        if self.vt != vt::BSTR {
            return None;
        }
        // SAFETY: a BSTR variant owns a live string (or null, the empty one)
        let ptr = unsafe { self.data.ptr } as *const u16;
        if ptr.is_null() {
            return Some(String::new());
        }
        // borrowed view; ownership stays with the variant
        let borrowed = core::mem::ManuallyDrop::new(unsafe { Bstr::from_raw(ptr as *mut u16) });
        Some(
            borrowed
                .as_ref()
                .map(|s| s.to_string_lossy())
                .unwrap_or_default(),
        )
    }

    /// New reference to a dispatch variant's object
    pub fn as_dispatch(&self) -> Option<ComPtr<Dispatch>> {
        if self.vt != vt::DISPATCH {
            return None;
        }
        // SAFETY: the variant holds a reference, so the object is live
        unsafe { ComPtr::from_borrowed(NativeHandle::from_raw(self.data.ptr)) }
    }

    /// Take a dispatch variant's object, leaving the variant empty
    pub fn into_dispatch(mut self) -> Option<ComPtr<Dispatch>> {
        if self.vt != vt::DISPATCH {
            return None;
        }
        self.vt = vt::EMPTY;
        // SAFETY: the variant's reference moves into the pointer
        unsafe { ComPtr::from_raw(NativeHandle::from_raw(self.data.ptr)) }
    }

    fn clear(&mut self) {
        let tag = core::mem::replace(&mut self.vt, vt::EMPTY);
        // SAFETY: the tag says which field is live and that it is owned
        unsafe {
            match tag {
                vt::BSTR => drop(Bstr::from_raw(self.data.ptr as *mut u16)),
                vt::DISPATCH | vt::UNKNOWN => {
                    drop(ComPtr::<Unknown>::from_raw(NativeHandle::from_raw(
                        self.data.ptr,
                    )))
                }
                _ => {}
            }
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for Variant {
    fn drop(&mut self) {
        self.clear();
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Self::i4(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Self::r8(value)
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Self::boolean(value)
    }
}

impl From<Bstr> for Variant {
    fn from(value: Bstr) -> Self {
        Self::bstr(value)
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vt {
            vt::EMPTY => write!(f, "Variant::Empty"),
            vt::I4 => write!(f, "Variant::I4({})", self.as_i4().unwrap_or_default()),
            vt::R8 => write!(f, "Variant::R8({})", self.as_r8().unwrap_or_default()),
            vt::BOOL => write!(f, "Variant::Bool({})", self.as_bool().unwrap_or_default()),
            vt::BSTR => write!(f, "Variant::Bstr({:?})", self.as_string().unwrap_or_default()),
            // SAFETY: pointer-tagged variants hold `ptr`
            other => write!(f, "Variant({}, {:p})", other, unsafe { self.data.ptr }),
        }
    }
}

/// Argument block for `IDispatch::Invoke`
#[repr(C)]
struct DispParams {
    args: *mut Variant,
    named_args: *mut i32,
    arg_count: u32,
    named_count: u32,
}

impl ComPtr<Dispatch> {
    /// Dispatch id of a member name
    pub fn id_of_name(&self, name: &str) -> Result<i32, DispatchError> {
        let wide = WideCString::new(name)?;
        let names = [wide.as_ptr()];
        let iid_null = Guid::zeroed();
        let mut id: i32 = -1;

        self.call_hr(
            "GetIDsOfNames",
            &[
                Arg::by_ref(&iid_null),
                Arg::slice(&names),
                Arg::from(1u32),
                Arg::from(LOCALE_USER_DEFAULT),
                Arg::out_value(&mut id),
            ],
        )?;
        debug!(target: "dispatch", name, id, "resolved member");
        Ok(id)
    }

    /// Call a method by name. `args` are in natural order.
    pub fn invoke_method(&self, name: &str, args: Vec<Variant>) -> Result<Variant, DispatchError> {
        let id = self.id_of_name(name)?;
        self.invoke_id(id, DISPATCH_METHOD, args, &mut [])
    }

    /// Read a property by name
    pub fn get_property(&self, name: &str) -> Result<Variant, DispatchError> {
        let id = self.id_of_name(name)?;
        self.invoke_id(id, DISPATCH_PROPERTYGET, Vec::new(), &mut [])
    }

    /// Assign a property by name
    pub fn put_property(&self, name: &str, value: Variant) -> Result<(), DispatchError> {
        let id = self.id_of_name(name)?;
        let mut named = [DISPID_PROPERTYPUT];
        self.invoke_id(id, DISPATCH_PROPERTYPUT, vec![value], &mut named)
            .map(drop)
    }

    /// Call a member by dispatch id
    pub fn invoke_id(
        &self,
        id: i32,
        flags: u16,
        mut args: Vec<Variant>,
        named: &mut [i32],
    ) -> Result<Variant, DispatchError> {
        // Invoke takes arguments last to first
        args.reverse();
        let params = DispParams {
            args: if args.is_empty() {
                core::ptr::null_mut()
            } else {
                args.as_mut_ptr()
            },
            named_args: if named.is_empty() {
                core::ptr::null_mut()
            } else {
                named.as_mut_ptr()
            },
            arg_count: args.len() as u32,
            named_count: named.len() as u32,
        };
        let iid_null = Guid::zeroed();
        let mut result = Variant::empty();

        self.call_hr(
            "Invoke",
            &[
                Arg::from(id),
                Arg::by_ref(&iid_null),
                Arg::from(LOCALE_USER_DEFAULT),
                Arg::from(flags),
                Arg::by_ref(&params),
                Arg::out_value(&mut result),
                Arg::null(),
                Arg::null(),
            ],
        )?;
        debug!(target: "dispatch", id, flags, args = args.len(), "invoked member");
        Ok(result)
    }
}
