//! Per-frame call sequences as data
//!
//! A `FrameScript` is an ordered list of method calls on objects held by a
//! [`ReleaseStack`]. Names and argument shapes are checked when a call is
//! added, so a script that builds is a script that can run.

use super::HarnessError;
use crate::com::{ErasedSlot, Interface, ReleaseStack, Slot};
use crate::error::DispatchError;
use crate::interop::{
    check_float_slots, check_kinds, Arg, ArgKind, CallingConvention, MarshalError, NativeHandle,
};
use crate::outcome::ResultCode;
use tracing::trace;

/// Owned argument of a scripted call
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    I32(i32),
    U32(u32),
    Usize(usize),
    F32(f32),
    F64(f64),
    Bool(bool),
    /// Null pointer or handle
    Null,
    /// Object held by the release stack
    Object(ErasedSlot),
    /// Pointer to an array of object handles
    ObjectArray(Vec<ErasedSlot>),
    /// Pointer to an array of floats (colors, viewports)
    Floats(Vec<f32>),
    /// Structure passed the way the calling convention passes its size
    Aggregate(Vec<u8>),
}

impl ScriptArg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::I32(_) => ArgKind::I32,
            Self::U32(_) => ArgKind::U32,
            Self::Usize(_) => ArgKind::Usize,
            Self::F32(_) => ArgKind::F32,
            Self::F64(_) => ArgKind::F64,
            Self::Bool(_) => ArgKind::Bool,
            Self::Null | Self::ObjectArray(_) | Self::Floats(_) => ArgKind::Ptr,
            Self::Object(_) => ArgKind::Handle,
            Self::Aggregate(_) => ArgKind::Aggregate,
        }
    }

    /// Object this argument points at, if any
    pub fn object<I: Interface>(slot: Slot<I>) -> Self {
        Self::Object(slot.erase())
    }
}

impl From<i32> for ScriptArg {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<u32> for ScriptArg {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<f32> for ScriptArg {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<bool> for ScriptArg {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<I: Interface> From<Slot<I>> for ScriptArg {
    fn from(slot: Slot<I>) -> Self {
        Self::object(slot)
    }
}

#[derive(Debug, Clone)]
struct Step {
    target: ErasedSlot,
    method: &'static str,
    args: Vec<ScriptArg>,
    /// Treat the result word as a status code
    checked: bool,
}

/// Ordered calls issued once per frame
#[derive(Debug, Clone, Default)]
pub struct FrameScript {
    steps: Vec<Step>,
}

impl FrameScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call whose result word is ignored (void methods)
    pub fn push<I: Interface>(
        &mut self,
        target: Slot<I>,
        method: &str,
        args: Vec<ScriptArg>,
    ) -> Result<&mut Self, DispatchError> {
        self.add(target, method, args, false)
    }

    /// Append a call whose result word is a status code; failures stop the frame
    pub fn push_checked<I: Interface>(
        &mut self,
        target: Slot<I>,
        method: &str,
        args: Vec<ScriptArg>,
    ) -> Result<&mut Self, DispatchError> {
        self.add(target, method, args, true)
    }

    fn add<I: Interface>(
        &mut self,
        target: Slot<I>,
        method: &str,
        args: Vec<ScriptArg>,
        checked: bool,
    ) -> Result<&mut Self, DispatchError> {
        let entry = I::methods().callable(method)?;
        if args.len() != entry.shape.len() {
            return Err(DispatchError::ArgCount {
                interface: I::NAME,
                method: entry.name,
                expected: entry.shape.len(),
                found: args.len(),
            });
        }
        let wrap = |source| DispatchError::Marshal {
            interface: I::NAME,
            method: entry.name,
            source,
        };
        check_kinds(entry.shape, args.iter().map(ScriptArg::kind)).map_err(wrap)?;
        check_float_slots(CallingConvention::native(), entry.shape).map_err(wrap)?;
        // an empty array would reach the callee as a null pointer
        if let Some(index) = args
            .iter()
            .position(|arg| matches!(arg, ScriptArg::Floats(values) if values.is_empty()))
        {
            return Err(wrap(MarshalError::EmptyArray { index }));
        }
        self.steps.push(Step {
            target: target.erase(),
            method: entry.name,
            args,
            checked,
        });
        Ok(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every call in order against `objects`
    pub fn execute(&self, objects: &ReleaseStack) -> Result<(), HarnessError> {
        for step in &self.steps {
            // handle arrays must outlive the argument list pointing into them
            let arrays = step
                .args
                .iter()
                .filter_map(|arg| match arg {
                    ScriptArg::ObjectArray(slots) => Some(resolve_all(objects, slots)),
                    _ => None,
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut next_array = arrays.iter();
            let mut args = Vec::with_capacity(step.args.len());
            for arg in &step.args {
                args.push(match arg {
                    ScriptArg::I32(v) => Arg::from(*v),
                    ScriptArg::U32(v) => Arg::from(*v),
                    ScriptArg::Usize(v) => Arg::usize(*v),
                    ScriptArg::F32(v) => Arg::from(*v),
                    ScriptArg::F64(v) => Arg::from(*v),
                    ScriptArg::Bool(v) => Arg::from(*v),
                    ScriptArg::Null => Arg::null(),
                    ScriptArg::Object(slot) => Arg::handle(resolve(objects, *slot)?),
                    ScriptArg::ObjectArray(_) => match next_array.next() {
                        Some(handles) => Arg::slice(handles),
                        None => Arg::null(),
                    },
                    ScriptArg::Floats(values) => Arg::slice(values),
                    ScriptArg::Aggregate(bytes) => Arg::aggregate_bytes(bytes),
                });
            }

            let word = objects.call(step.target, step.method, &args)?;
            trace!(
                target: "harness",
                interface = step.target.interface(),
                method = step.method,
                result = word,
                "scripted call"
            );
            if step.checked {
                ResultCode::from_word(word).check(step.target.interface(), step.method)?;
            }
        }
        Ok(())
    }
}

fn resolve(objects: &ReleaseStack, slot: ErasedSlot) -> Result<NativeHandle, DispatchError> {
    objects.handle(slot).ok_or(DispatchError::StaleSlot {
        interface: slot.interface(),
        index: slot.index(),
    })
}

fn resolve_all(
    objects: &ReleaseStack,
    slots: &[ErasedSlot],
) -> Result<Vec<NativeHandle>, DispatchError> {
    slots.iter().map(|slot| resolve(objects, *slot)).collect()
}
