//! In-process objects with real vtables
//!
//! Every object lives in a [`FakeHeap`] and keeps its memory until the heap
//! is dropped, so calls on released objects are recorded as violations
//! instead of touching freed memory. Declare the heap before anything that
//! owns its objects.
//!
//! Object kinds:
//! - echo: records argument words, can spawn child objects
//! - blob: a byte buffer behind `ID3DBlob`'s slots
//! - dispatch: a name table behind `IDispatch`'s slots

use crate::com::{Blob, ComPtr, Dispatch, Guid, Interface, Unknown, Variant};
use crate::interop::{AbiWord, NativeHandle};
use crate::outcome::ResultCode;
use core::ffi::c_void;
use core::ptr::NonNull;
use std::cell::{Cell, RefCell};
use tracing::trace;

crate::com_interface! {
    /// Test interface whose methods record the words they receive
    pub Echo("IVtcallEcho", 0x5f0e3c1a_8d2b_4c7e_9a61_3b7d2e4f8a90): Unknown {
        Echo1(Usize),
        Echo2(Usize, Usize),
        Echo3(Usize, Usize, Usize),
        Echo8(Usize, Usize, Usize, Usize, Usize, Usize, Usize, Usize),
        Spawn(I32, U32, OutPtr),
    }
}

/// `Spawn` writes nothing
pub const SPAWN_NONE: u32 = 0;
/// `Spawn` produces a child when the code is a success
pub const SPAWN_CHILD: u32 = 1;
/// `Spawn` writes a child even alongside a failure code
pub const SPAWN_STRAY: u32 = 2;

/// Identity of a fake object, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FakeId(pub usize);

/// Lifecycle rule broken by the code under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Destroyed while an object created from it was still live
    ReleasedBeforeDependent { released: FakeId, dependent: FakeId },
    /// Method called after the last release
    UseAfterRelease { object: FakeId, slot: usize },
    /// Release with a count already at zero
    OverRelease { object: FakeId },
}

/// Words received by a non-lifecycle slot, receiver excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub object: FakeId,
    pub slot: usize,
    pub words: Vec<AbiWord>,
}

/// One argument seen by a fake `IDispatch::Invoke`
#[derive(Debug, Clone, PartialEq)]
pub struct InvokedArg {
    pub var_type: u16,
    pub i4: Option<i32>,
    pub r8: Option<f64>,
    pub text: Option<String>,
}

/// One fake `IDispatch::Invoke`
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub object: FakeId,
    pub dispid: i32,
    pub flags: u16,
    /// Arguments as passed, last argument first
    pub args: Vec<InvokedArg>,
    pub named: Vec<i32>,
}

enum Kind {
    Echo,
    Blob(Vec<u8>),
    Dispatch(Vec<(String, i32)>),
}

#[repr(C)]
struct FakeObject {
    // read through the handle by the dispatcher
    #[allow(dead_code)]
    vtbl: *const c_void,
    heap: *const HeapState,
    id: FakeId,
    refs: Cell<u32>,
    parent: Option<FakeId>,
    interfaces: Vec<Guid>,
    kind: Kind,
}

#[derive(Default)]
struct HeapState {
    objects: RefCell<Vec<NonNull<FakeObject>>>,
    destroyed: RefCell<Vec<FakeId>>,
    violations: RefCell<Vec<Violation>>,
    calls: RefCell<Vec<RecordedCall>>,
    invocations: RefCell<Vec<Invocation>>,
}

impl HeapState {
    fn alloc(&self, vtbl: *const c_void, kind: Kind, iid: Guid, parent: Option<FakeId>) -> NativeHandle {
        let mut objects = self.objects.borrow_mut();
        let id = FakeId(objects.len());
        let object = Box::new(FakeObject {
            vtbl,
            heap: self as *const HeapState,
            id,
            refs: Cell::new(1),
            parent,
            interfaces: vec![iid],
            kind,
        });
        let ptr = NonNull::from(Box::leak(object));
        objects.push(ptr);
        trace!(target: "lifecycle", id = id.0, ?parent, "fake object created");
        // SAFETY: the object starts with its vtable pointer and stays
        // allocated until the heap is dropped
        unsafe { NativeHandle::from_raw(ptr.as_ptr() as *mut c_void) }
    }

    fn find(&self, handle: NativeHandle) -> Option<&FakeObject> {
        self.objects
            .borrow()
            .iter()
            .find(|ptr| ptr.as_ptr() as *mut c_void == handle.as_raw())
            // SAFETY: objects live as long as the heap
            .map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    fn destroy(&self, object: &FakeObject) {
        self.destroyed.borrow_mut().push(object.id);
        trace!(target: "lifecycle", id = object.id.0, "fake object destroyed");

        let objects = self.objects.borrow();
        let mut violations = self.violations.borrow_mut();
        for ptr in objects.iter() {
            // SAFETY: as in `find`
            let other = unsafe { ptr.as_ref() };
            if other.parent == Some(object.id) && other.refs.get() > 0 {
                violations.push(Violation::ReleasedBeforeDependent {
                    released: object.id,
                    dependent: other.id,
                });
            }
        }
    }
}

impl Drop for HeapState {
    fn drop(&mut self) {
        for ptr in self.objects.get_mut().drain(..) {
            // SAFETY: allocated by `Box::leak` in `alloc`, freed once here
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
    }
}

impl FakeObject {
    fn heap(&self) -> &HeapState {
        // SAFETY: the heap outlives its objects
        unsafe { &*self.heap }
    }

    /// Record a call; false if the object is already destroyed
    fn enter(&self, slot: usize, words: &[AbiWord]) -> bool {
        let heap = self.heap();
        heap.calls.borrow_mut().push(RecordedCall {
            object: self.id,
            slot,
            words: words.to_vec(),
        });
        self.check_live(slot)
    }

    fn check_live(&self, slot: usize) -> bool {
        if self.refs.get() > 0 {
            return true;
        }
        self.heap()
            .violations
            .borrow_mut()
            .push(Violation::UseAfterRelease {
                object: self.id,
                slot,
            });
        false
    }
}

#[inline]
fn code_word(code: ResultCode) -> AbiWord {
    code.bits() as AbiWord
}

type LifecycleFn = unsafe extern "system" fn(*mut FakeObject) -> AbiWord;

// slots are read by the dispatcher, never by name
#[allow(dead_code)]
#[repr(C)]
struct UnknownSlots {
    query_interface: unsafe extern "system" fn(*mut FakeObject, *const Guid, *mut *mut c_void) -> AbiWord,
    add_ref: LifecycleFn,
    release: LifecycleFn,
}

const UNKNOWN_SLOTS: UnknownSlots = UnknownSlots {
    query_interface: fake_query_interface,
    add_ref: fake_add_ref,
    release: fake_release,
};

// slots are read by the dispatcher, never by name
#[allow(dead_code)]
#[repr(C)]
struct EchoVtbl {
    base: UnknownSlots,
    echo1: unsafe extern "system" fn(*mut FakeObject, AbiWord) -> AbiWord,
    echo2: unsafe extern "system" fn(*mut FakeObject, AbiWord, AbiWord) -> AbiWord,
    echo3: unsafe extern "system" fn(*mut FakeObject, AbiWord, AbiWord, AbiWord) -> AbiWord,
    #[allow(clippy::type_complexity)]
    echo8: unsafe extern "system" fn(
        *mut FakeObject,
        AbiWord,
        AbiWord,
        AbiWord,
        AbiWord,
        AbiWord,
        AbiWord,
        AbiWord,
        AbiWord,
    ) -> AbiWord,
    spawn: unsafe extern "system" fn(*mut FakeObject, AbiWord, AbiWord, *mut *mut c_void) -> AbiWord,
}

static ECHO_VTBL: EchoVtbl = EchoVtbl {
    base: UNKNOWN_SLOTS,
    echo1: fake_echo1,
    echo2: fake_echo2,
    echo3: fake_echo3,
    echo8: fake_echo8,
    spawn: fake_spawn,
};

// slots are read by the dispatcher, never by name
#[allow(dead_code)]
#[repr(C)]
struct BlobVtbl {
    base: UnknownSlots,
    get_buffer_pointer: LifecycleFn,
    get_buffer_size: LifecycleFn,
}

static BLOB_VTBL: BlobVtbl = BlobVtbl {
    base: UNKNOWN_SLOTS,
    get_buffer_pointer: fake_buffer_pointer,
    get_buffer_size: fake_buffer_size,
};

#[repr(C)]
struct DispParamsView {
    args: *const Variant,
    named: *const i32,
    arg_count: u32,
    named_count: u32,
}

// slots are read by the dispatcher, never by name
#[allow(dead_code)]
#[repr(C)]
struct DispatchVtbl {
    base: UnknownSlots,
    get_type_info_count: unsafe extern "system" fn(*mut FakeObject, *mut u32) -> AbiWord,
    get_type_info: unsafe extern "system" fn(*mut FakeObject, AbiWord, AbiWord, *mut *mut c_void) -> AbiWord,
    get_ids_of_names: unsafe extern "system" fn(
        *mut FakeObject,
        *const Guid,
        *const *const u16,
        AbiWord,
        AbiWord,
        *mut i32,
    ) -> AbiWord,
    #[allow(clippy::type_complexity)]
    invoke: unsafe extern "system" fn(
        *mut FakeObject,
        AbiWord,
        *const Guid,
        AbiWord,
        AbiWord,
        *const DispParamsView,
        *mut Variant,
        *mut c_void,
        *mut c_void,
    ) -> AbiWord,
}

static DISPATCH_VTBL: DispatchVtbl = DispatchVtbl {
    base: UNKNOWN_SLOTS,
    get_type_info_count: fake_type_info_count,
    get_type_info: fake_type_info,
    get_ids_of_names: fake_ids_of_names,
    invoke: fake_invoke,
};

unsafe extern "system" fn fake_query_interface(
    this: *mut FakeObject,
    iid: *const Guid,
    out: *mut *mut c_void,
) -> AbiWord {
    let object = &*this;
    if out.is_null() || iid.is_null() {
        return code_word(ResultCode::E_POINTER);
    }
    *out = core::ptr::null_mut();
    if !object.check_live(0) {
        return code_word(ResultCode::E_UNEXPECTED);
    }
    if *iid == Unknown::IID || object.interfaces.contains(&*iid) {
        object.refs.set(object.refs.get() + 1);
        *out = this as *mut c_void;
        code_word(ResultCode::S_OK)
    } else {
        code_word(ResultCode::E_NOINTERFACE)
    }
}

unsafe extern "system" fn fake_add_ref(this: *mut FakeObject) -> AbiWord {
    let object = &*this;
    if !object.check_live(1) {
        return 0;
    }
    let refs = object.refs.get() + 1;
    object.refs.set(refs);
    refs as AbiWord
}

unsafe extern "system" fn fake_release(this: *mut FakeObject) -> AbiWord {
    let object = &*this;
    let refs = object.refs.get();
    if refs == 0 {
        object
            .heap()
            .violations
            .borrow_mut()
            .push(Violation::OverRelease { object: object.id });
        return 0;
    }
    object.refs.set(refs - 1);
    if refs == 1 {
        object.heap().destroy(object);
    }
    (refs - 1) as AbiWord
}

unsafe extern "system" fn fake_echo1(this: *mut FakeObject, a: AbiWord) -> AbiWord {
    (*this).enter(3, &[a]);
    a
}

unsafe extern "system" fn fake_echo2(this: *mut FakeObject, a: AbiWord, b: AbiWord) -> AbiWord {
    (*this).enter(4, &[a, b]);
    a.wrapping_add(b)
}

unsafe extern "system" fn fake_echo3(
    this: *mut FakeObject,
    a: AbiWord,
    b: AbiWord,
    c: AbiWord,
) -> AbiWord {
    (*this).enter(5, &[a, b, c]);
    a.wrapping_add(b).wrapping_add(c)
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn fake_echo8(
    this: *mut FakeObject,
    a: AbiWord,
    b: AbiWord,
    c: AbiWord,
    d: AbiWord,
    e: AbiWord,
    f: AbiWord,
    g: AbiWord,
    h: AbiWord,
) -> AbiWord {
    let words = [a, b, c, d, e, f, g, h];
    (*this).enter(6, &words);
    words.iter().fold(0, |acc: AbiWord, w| acc.wrapping_add(*w))
}

unsafe extern "system" fn fake_spawn(
    this: *mut FakeObject,
    code: AbiWord,
    mode: AbiWord,
    out: *mut *mut c_void,
) -> AbiWord {
    let object = &*this;
    if !object.enter(7, &[code, mode, out as AbiWord]) {
        return code_word(ResultCode::E_UNEXPECTED);
    }
    if out.is_null() {
        return code_word(ResultCode::E_POINTER);
    }
    *out = core::ptr::null_mut();

    let code = ResultCode::from_word(code);
    let produce = match mode as u32 {
        SPAWN_CHILD => code.is_success(),
        SPAWN_STRAY => true,
        _ => false,
    };
    if produce {
        let child = object.heap().alloc(
            &ECHO_VTBL as *const EchoVtbl as *const c_void,
            Kind::Echo,
            Echo::IID,
            Some(object.id),
        );
        *out = child.as_raw();
    }
    code_word(code)
}

unsafe extern "system" fn fake_buffer_pointer(this: *mut FakeObject) -> AbiWord {
    let object = &*this;
    if !object.enter(3, &[]) {
        return 0;
    }
    match &object.kind {
        Kind::Blob(bytes) if !bytes.is_empty() => bytes.as_ptr() as AbiWord,
        _ => 0,
    }
}

unsafe extern "system" fn fake_buffer_size(this: *mut FakeObject) -> AbiWord {
    let object = &*this;
    if !object.enter(4, &[]) {
        return 0;
    }
    match &object.kind {
        Kind::Blob(bytes) => bytes.len(),
        _ => 0,
    }
}

unsafe extern "system" fn fake_type_info_count(this: *mut FakeObject, out: *mut u32) -> AbiWord {
    if !(*this).enter(3, &[out as AbiWord]) {
        return code_word(ResultCode::E_UNEXPECTED);
    }
    if out.is_null() {
        return code_word(ResultCode::E_POINTER);
    }
    *out = 0;
    code_word(ResultCode::S_OK)
}

unsafe extern "system" fn fake_type_info(
    this: *mut FakeObject,
    index: AbiWord,
    lcid: AbiWord,
    _out: *mut *mut c_void,
) -> AbiWord {
    (*this).enter(4, &[index, lcid]);
    code_word(ResultCode::E_NOTIMPL)
}

unsafe fn read_wide(mut ptr: *const u16) -> String {
    let mut units = Vec::new();
    while *ptr != 0 {
        units.push(*ptr);
        ptr = ptr.add(1);
    }
    String::from_utf16_lossy(&units)
}

unsafe extern "system" fn fake_ids_of_names(
    this: *mut FakeObject,
    _iid: *const Guid,
    names: *const *const u16,
    count: AbiWord,
    lcid: AbiWord,
    ids: *mut i32,
) -> AbiWord {
    let object = &*this;
    if !object.enter(5, &[names as AbiWord, count, lcid, ids as AbiWord]) {
        return code_word(ResultCode::E_UNEXPECTED);
    }
    let Kind::Dispatch(members) = &object.kind else {
        return code_word(ResultCode::E_NOTIMPL);
    };
    if names.is_null() || ids.is_null() {
        return code_word(ResultCode::E_POINTER);
    }

    let mut code = ResultCode::S_OK;
    for i in 0..count as u32 as usize {
        let name = read_wide(*names.add(i));
        let id = members
            .iter()
            .find(|(member, _)| member.eq_ignore_ascii_case(&name))
            .map(|(_, id)| *id);
        *ids.add(i) = id.unwrap_or(-1);
        if id.is_none() {
            code = ResultCode::DISP_E_UNKNOWNNAME;
        }
    }
    code_word(code)
}

#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn fake_invoke(
    this: *mut FakeObject,
    dispid: AbiWord,
    _iid: *const Guid,
    lcid: AbiWord,
    flags: AbiWord,
    params: *const DispParamsView,
    result: *mut Variant,
    _excep: *mut c_void,
    _arg_err: *mut c_void,
) -> AbiWord {
    let object = &*this;
    if !object.enter(6, &[dispid, lcid, flags, params as AbiWord]) {
        return code_word(ResultCode::E_UNEXPECTED);
    }
    let Kind::Dispatch(members) = &object.kind else {
        return code_word(ResultCode::E_NOTIMPL);
    };
    let dispid = dispid as u32 as i32;
    if !members.iter().any(|(_, id)| *id == dispid) {
        return code_word(ResultCode::DISP_E_MEMBERNOTFOUND);
    }
    if params.is_null() {
        return code_word(ResultCode::E_POINTER);
    }

    let params = &*params;
    let mut args = Vec::with_capacity(params.arg_count as usize);
    for i in 0..params.arg_count as usize {
        let arg = &*params.args.add(i);
        args.push(InvokedArg {
            var_type: arg.var_type(),
            i4: arg.as_i4(),
            r8: arg.as_r8(),
            text: arg.as_string(),
        });
    }
    let named = (0..params.named_count as usize)
        .map(|i| *params.named.add(i))
        .collect();

    let sum = args
        .iter()
        .filter_map(|a| a.i4)
        .fold(0i32, |acc, v| acc.wrapping_add(v));
    object.heap().invocations.borrow_mut().push(Invocation {
        object: object.id,
        dispid,
        flags: flags as u16,
        args,
        named,
    });

    if !result.is_null() {
        *result = Variant::i4(sum);
    }
    code_word(ResultCode::S_OK)
}

/// Owner of fake objects and of everything they record
pub struct FakeHeap {
    state: Box<HeapState>,
}

impl FakeHeap {
    pub fn new() -> Self {
        Self {
            state: Box::default(),
        }
    }

    /// New echo object; the caller owns its single reference
    pub fn echo(&self) -> NativeHandle {
        self.state.alloc(
            &ECHO_VTBL as *const EchoVtbl as *const c_void,
            Kind::Echo,
            Echo::IID,
            None,
        )
    }

    /// New echo object recorded as depending on `parent`
    pub fn child_of(&self, parent: NativeHandle) -> NativeHandle {
        let parent = self.state.find(parent).map(|p| p.id);
        self.state.alloc(
            &ECHO_VTBL as *const EchoVtbl as *const c_void,
            Kind::Echo,
            Echo::IID,
            parent,
        )
    }

    /// New blob holding a copy of `bytes`
    pub fn blob(&self, bytes: &[u8]) -> NativeHandle {
        self.state.alloc(
            &BLOB_VTBL as *const BlobVtbl as *const c_void,
            Kind::Blob(bytes.to_vec()),
            Blob::IID,
            None,
        )
    }

    /// New dispatch object answering the given member names
    pub fn dispatch(&self, members: &[(&str, i32)]) -> NativeHandle {
        let members = members
            .iter()
            .map(|(name, id)| (name.to_string(), *id))
            .collect();
        self.state.alloc(
            &DISPATCH_VTBL as *const DispatchVtbl as *const c_void,
            Kind::Dispatch(members),
            Dispatch::IID,
            None,
        )
    }

    /// Adopt the caller's reference to one of this heap's objects as `I`.
    /// `None` if the handle is foreign or the object does not implement `I`.
    pub fn adopt<I: Interface>(&self, handle: NativeHandle) -> Option<ComPtr<I>> {
        let object = self.state.find(handle)?;
        if I::IID != Unknown::IID && !object.interfaces.contains(&I::IID) {
            return None;
        }
        // SAFETY: the object is live in this heap and its vtable was built
        // for `I`
        unsafe { ComPtr::from_raw(handle) }
    }

    /// Current count; 0 for handles this heap does not know
    pub fn refcount(&self, handle: NativeHandle) -> u32 {
        self.state.find(handle).map_or(0, |o| o.refs.get())
    }

    pub fn id(&self, handle: NativeHandle) -> Option<FakeId> {
        self.state.find(handle).map(|o| o.id)
    }

    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.refcount(handle) > 0
    }

    /// Destroyed objects, in destruction order
    pub fn destroyed(&self) -> Vec<FakeId> {
        self.state.destroyed.borrow().clone()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.state.violations.borrow().clone()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.borrow().clone()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.invocations.borrow().clone()
    }

    /// Objects with a non-zero count
    pub fn live_count(&self) -> usize {
        self.state
            .objects
            .borrow()
            .iter()
            // SAFETY: as in `HeapState::find`
            .filter(|ptr| unsafe { ptr.as_ref() }.refs.get() > 0)
            .count()
    }
}

impl Default for FakeHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for FakeHeap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FakeHeap")
            .field("objects", &self.state.objects.borrow().len())
            .field("live", &self.live_count())
            .field("violations", &self.state.violations.borrow().len())
            .finish()
    }
}
