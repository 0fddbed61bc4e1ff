//! Value types crossing the foreign boundary
//!
//! Everything the dispatcher consumes is pointer-sized: object handles, vtable
//! slots and marshaled argument words. `Arg` is the typed form a call site
//! builds; it borrows any Rust storage it points at for the duration of the call.

use core::ffi::c_void;
use core::fmt;
use core::marker::PhantomData;
use smallvec::SmallVec;

/// One native ABI word (a register or a stack slot)
pub type AbiWord = usize;

/// Size of an ABI word in bytes
pub const WORD_SIZE: usize = core::mem::size_of::<AbiWord>();

/// Largest frame the dispatcher can issue, receiver included
pub const MAX_FRAME_WORDS: usize = 16;

/// Largest number of argument words after the receiver
pub const MAX_ARG_WORDS: usize = MAX_FRAME_WORDS - 1;

/// Address of a foreign object. Zero means "no object".
///
/// A handle is a non-owning view; ownership lives in `com::ComPtr`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NativeHandle(*mut c_void);

impl NativeHandle {
    /// The "no object" handle
    #[inline]
    pub const fn null() -> Self {
        Self(core::ptr::null_mut())
    }

    /// Wrap a raw object address
    ///
    /// # Safety
    /// `ptr` must be null or point at a live object whose first word is a
    /// pointer to its vtable, and that vtable must begin with the
    /// QueryInterface/AddRef/Release triple.
    #[inline]
    pub const unsafe fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    #[inline]
    pub const fn as_raw(self) -> *mut c_void {
        self.0
    }

    /// Handle as an argument word
    #[inline]
    pub fn addr(self) -> AbiWord {
        self.0 as AbiWord
    }
}

impl Default for NativeHandle {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NativeHandle(null)")
        } else {
            write!(f, "NativeHandle({:#x})", self.addr())
        }
    }
}

/// Index into an object's function-pointer table.
///
/// Never validated against the real table length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VTableSlot(usize);

impl VTableSlot {
    pub const QUERY_INTERFACE: Self = Self(0);
    pub const ADD_REF: Self = Self(1);
    pub const RELEASE: Self = Self(2);

    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Offset of the slot from the vtable base
    #[inline]
    pub const fn byte_offset(self) -> usize {
        self.0 * WORD_SIZE
    }
}

impl fmt::Display for VTableSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered ABI words of one call, receiver first
#[derive(Debug, Clone)]
pub struct CallFrame {
    words: SmallVec<[AbiWord; MAX_FRAME_WORDS]>,
}

impl CallFrame {
    /// Frame for a method call: `[receiver] ++ args`
    pub fn method(receiver: NativeHandle, args: &MarshaledArgs<'_>) -> Self {
        let mut words = SmallVec::new();
        words.push(receiver.addr());
        words.extend_from_slice(args.words());
        Self { words }
    }

    /// Frame for a plain exported function (no receiver)
    pub fn function(args: &MarshaledArgs<'_>) -> Self {
        Self {
            words: SmallVec::from_slice(args.words()),
        }
    }

    #[inline]
    pub fn words(&self) -> &[AbiWord] {
        &self.words
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Argument words ready for dispatch.
///
/// The lifetime ties by-reference words to the storage they point at, so the
/// storage cannot be dropped or moved while the words exist.
#[derive(Debug, Clone, Default)]
pub struct MarshaledArgs<'a> {
    words: SmallVec<[AbiWord; MAX_ARG_WORDS]>,
    spilled: usize,
    _borrow: PhantomData<&'a ()>,
}

impl<'a> MarshaledArgs<'a> {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build directly from words that reference no borrowed storage
    pub fn from_words(words: &[AbiWord]) -> Result<Self, super::MarshalError> {
        let mut out = Self::empty();
        for &word in words {
            out.push(word)?;
        }
        Ok(out)
    }

    pub(crate) fn push(&mut self, word: AbiWord) -> Result<(), super::MarshalError> {
        if self.words.len() == MAX_ARG_WORDS {
            return Err(super::MarshalError::FrameTooLarge {
                max: MAX_ARG_WORDS,
            });
        }
        self.words.push(word);
        Ok(())
    }

    pub(crate) fn set_spilled(&mut self, spilled: usize) {
        self.spilled = spilled;
    }

    #[inline]
    pub fn words(&self) -> &[AbiWord] {
        &self.words
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words the convention places on the stack rather than in registers
    #[inline]
    pub fn spilled(&self) -> usize {
        self.spilled
    }
}

/// Declared or actual shape of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    /// Input pointer to caller storage
    Ptr,
    /// Pointer to a slot the callee writes
    OutPtr,
    /// Foreign object handle
    Handle,
    /// Structure passed by value or by reference depending on its size
    Aggregate,
}

impl ArgKind {
    /// Width of scalar kinds in bytes; zero for aggregates
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Isize | Self::Usize | Self::Ptr | Self::OutPtr | Self::Handle => WORD_SIZE,
            Self::Aggregate => 0,
        }
    }

    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::Isize
                | Self::U8
                | Self::U16
                | Self::U32
                | Self::U64
                | Self::Usize
        )
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::Isize)
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    #[inline]
    pub const fn is_pointer(self) -> bool {
        matches!(self, Self::Ptr | Self::OutPtr | Self::Handle)
    }

    /// Whether an argument of kind `actual` may fill a slot declared as `self`
    /// without losing bits
    pub const fn accepts(self, actual: ArgKind) -> bool {
        if self as u8 == actual as u8 {
            return true;
        }
        if self.is_integral() && actual.is_integral() {
            if actual.size() > self.size() {
                return false;
            }
            // unsigned fits a wider signed slot; signed never fits unsigned
            return actual.is_signed() == self.is_signed()
                || (!actual.is_signed() && actual.size() < self.size());
        }
        match self {
            Self::Ptr => actual.is_pointer(),
            Self::OutPtr | Self::Handle => matches!(actual, Self::Ptr),
            _ => false,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Isize => "isize",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Usize => "usize",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Ptr => "ptr",
            Self::OutPtr => "out-ptr",
            Self::Handle => "handle",
            Self::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Slot a foreign method writes an object handle into
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct OutHandle(*mut c_void);

impl OutHandle {
    #[inline]
    pub fn new() -> Self {
        Self(core::ptr::null_mut())
    }

    /// Handle written by the callee; null if none was produced
    #[inline]
    pub fn get(&self) -> NativeHandle {
        // SAFETY: the slot only ever holds null or what a foreign method wrote
        // into it, which by the out-parameter contract is an object pointer.
        unsafe { NativeHandle::from_raw(self.0) }
    }

    /// Take the handle out, leaving null behind
    #[inline]
    pub fn take(&mut self) -> NativeHandle {
        let handle = self.get();
        self.0 = core::ptr::null_mut();
        handle
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Payload {
    Signed(i64),
    Unsigned(u64),
    F32(f32),
    F64(f64),
    Addr(AbiWord),
    Aggregate { addr: AbiWord, size: usize },
}

/// Typed call argument
#[derive(Debug, Clone, Copy)]
pub struct Arg<'a> {
    kind: ArgKind,
    payload: Payload,
    _borrow: PhantomData<&'a ()>,
}

impl<'a> Arg<'a> {
    #[inline]
    const fn new(kind: ArgKind, payload: Payload) -> Self {
        Self {
            kind,
            payload,
            _borrow: PhantomData,
        }
    }

    #[inline]
    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    #[inline]
    pub(crate) fn payload(&self) -> Payload {
        self.payload
    }

    #[inline]
    pub const fn usize(value: usize) -> Self {
        Self::new(ArgKind::Usize, Payload::Unsigned(value as u64))
    }

    #[inline]
    pub const fn isize(value: isize) -> Self {
        Self::new(ArgKind::Isize, Payload::Signed(value as i64))
    }

    /// Null input pointer
    #[inline]
    pub const fn null() -> Self {
        Self::new(ArgKind::Ptr, Payload::Addr(0))
    }

    /// Foreign object handle (may be null)
    #[inline]
    pub fn handle(handle: NativeHandle) -> Self {
        Self::new(ArgKind::Handle, Payload::Addr(handle.addr()))
    }

    /// Pointer to caller storage, always passed as one word
    #[inline]
    pub fn by_ref<T>(value: &'a T) -> Self {
        Self::new(ArgKind::Ptr, Payload::Addr(value as *const T as AbiWord))
    }

    /// Pointer to the first element of a slice
    #[inline]
    pub fn slice<T>(values: &'a [T]) -> Self {
        if values.is_empty() {
            return Self::null();
        }
        Self::new(ArgKind::Ptr, Payload::Addr(values.as_ptr() as AbiWord))
    }

    /// Pointer to a value the callee fills in
    #[inline]
    pub fn out_value<T>(value: &'a mut T) -> Self {
        Self::new(ArgKind::OutPtr, Payload::Addr(value as *mut T as AbiWord))
    }

    /// Pointer to a handle slot the callee fills in
    #[inline]
    pub fn out(slot: &'a mut OutHandle) -> Self {
        Self::new(ArgKind::OutPtr, Payload::Addr(slot as *mut OutHandle as AbiWord))
    }

    /// Structure argument; the marshaler decides between value and reference
    #[inline]
    pub fn aggregate<T: Copy>(value: &'a T) -> Self {
        Self::new(
            ArgKind::Aggregate,
            Payload::Aggregate {
                addr: value as *const T as AbiWord,
                size: core::mem::size_of::<T>(),
            },
        )
    }

    /// Structure argument given as its raw bytes
    #[inline]
    pub fn aggregate_bytes(bytes: &'a [u8]) -> Self {
        Self::new(
            ArgKind::Aggregate,
            Payload::Aggregate {
                addr: bytes.as_ptr() as AbiWord,
                size: bytes.len(),
            },
        )
    }

    /// Arbitrary address
    ///
    /// # Safety
    /// The address must stay valid for whatever the callee does with it.
    #[inline]
    pub unsafe fn raw_ptr(ptr: *const c_void) -> Self {
        Self::new(ArgKind::Ptr, Payload::Addr(ptr as AbiWord))
    }
}

macro_rules! arg_from_signed {
    ($($ty:ty => $kind:ident),*) => {
        $(impl From<$ty> for Arg<'_> {
            #[inline]
            fn from(value: $ty) -> Self {
                Arg::new(ArgKind::$kind, Payload::Signed(value as i64))
            }
        })*
    };
}

macro_rules! arg_from_unsigned {
    ($($ty:ty => $kind:ident),*) => {
        $(impl From<$ty> for Arg<'_> {
            #[inline]
            fn from(value: $ty) -> Self {
                Arg::new(ArgKind::$kind, Payload::Unsigned(value as u64))
            }
        })*
    };
}

arg_from_signed!(i8 => I8, i16 => I16, i32 => I32, isize => Isize);
arg_from_unsigned!(u8 => U8, u16 => U16, u32 => U32, usize => Usize);

// A 64-bit integer does not fit a 32-bit word, so the conversion only exists
// where it cannot truncate.
#[cfg(target_pointer_width = "64")]
arg_from_signed!(i64 => I64);
#[cfg(target_pointer_width = "64")]
arg_from_unsigned!(u64 => U64);

impl From<bool> for Arg<'_> {
    #[inline]
    fn from(value: bool) -> Self {
        Arg::new(ArgKind::Bool, Payload::Unsigned(value as u64))
    }
}

impl From<f32> for Arg<'_> {
    #[inline]
    fn from(value: f32) -> Self {
        Arg::new(ArgKind::F32, Payload::F32(value))
    }
}

impl From<f64> for Arg<'_> {
    #[inline]
    fn from(value: f64) -> Self {
        Arg::new(ArgKind::F64, Payload::F64(value))
    }
}

impl From<NativeHandle> for Arg<'_> {
    #[inline]
    fn from(handle: NativeHandle) -> Self {
        Arg::handle(handle)
    }
}
