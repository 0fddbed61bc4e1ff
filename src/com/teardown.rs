//! Ordered teardown of owned objects
//!
//! Objects are pushed in creation order and released in exact reverse
//! order, so dependents always go before what they depend on.

use super::ptr::{dispatch_method, ComPtr};
use super::table::{Interface, MethodTable};
use crate::error::DispatchError;
use crate::interop::{AbiWord, Arg, NativeHandle};
use core::fmt;
use core::marker::PhantomData;
use std::any::Any;
use tracing::debug;

struct Entry {
    interface: &'static str,
    table: &'static MethodTable,
    handle: NativeHandle,
    generation: u64,
    owner: Box<dyn Any>,
}

/// Typed position of an object in a [`ReleaseStack`].
///
/// A slot names one push; it goes stale once that object is popped, even if
/// another object later takes the same index.
pub struct Slot<I> {
    index: usize,
    generation: u64,
    _marker: PhantomData<fn() -> I>,
}

impl<I> Slot<I> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<I> Clone for Slot<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I> Copy for Slot<I> {}

impl<I> PartialEq for Slot<I> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<I> Eq for Slot<I> {}

impl<I> fmt::Debug for Slot<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({}#{})", self.index, self.generation)
    }
}

impl<I: Interface> Slot<I> {
    /// Forget the interface type; the stack still checks it at call time
    #[inline]
    pub fn erase(self) -> ErasedSlot {
        ErasedSlot {
            index: self.index,
            generation: self.generation,
            interface: I::NAME,
        }
    }
}

/// Untyped slot, for heterogeneous call lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErasedSlot {
    index: usize,
    generation: u64,
    interface: &'static str,
}

impl ErasedSlot {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn interface(&self) -> &'static str {
        self.interface
    }
}

/// Owned objects released in reverse creation order
#[derive(Default)]
pub struct ReleaseStack {
    entries: Vec<Entry>,
    pushes: u64,
}

impl ReleaseStack {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `ptr`; it is released when the stack is cleared
    pub fn push<I: Interface>(&mut self, ptr: ComPtr<I>) -> Slot<I> {
        let index = self.entries.len();
        let generation = self.pushes;
        self.pushes += 1;
        debug!(
            target: "lifecycle",
            interface = I::NAME,
            handle = ?ptr.as_handle(),
            index,
            "owned by release stack"
        );
        self.entries.push(Entry {
            interface: I::NAME,
            table: I::methods(),
            handle: ptr.as_handle(),
            generation,
            owner: Box::new(ptr),
        });
        Slot {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Object at `slot`, if it is still held
    pub fn get<I: Interface>(&self, slot: Slot<I>) -> Option<&ComPtr<I>> {
        self.entries
            .get(slot.index)
            .filter(|entry| entry.generation == slot.generation)
            .and_then(|entry| entry.owner.downcast_ref::<ComPtr<I>>())
    }

    /// Handle at an untyped slot, checked against the interface it was pushed as
    pub fn handle(&self, slot: ErasedSlot) -> Option<NativeHandle> {
        self.entry(slot).map(|entry| entry.handle)
    }

    /// Call a method by name on the object at an untyped slot
    pub fn call(
        &self,
        slot: ErasedSlot,
        method: &str,
        args: &[Arg<'_>],
    ) -> Result<AbiWord, DispatchError> {
        let entry = self.entry(slot).ok_or(DispatchError::StaleSlot {
            interface: slot.interface,
            index: slot.index,
        })?;
        // SAFETY: the stack owns a reference, and the table came from the
        // interface the object was pushed as
        unsafe { dispatch_method(entry.handle, entry.table, method, args) }
    }

    fn entry(&self, slot: ErasedSlot) -> Option<&Entry> {
        self.entries
            .get(slot.index)
            .filter(|entry| {
                entry.generation == slot.generation && entry.interface == slot.interface
            })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles in creation order
    pub fn handles(&self) -> impl Iterator<Item = NativeHandle> + '_ {
        self.entries.iter().map(|entry| entry.handle)
    }

    /// Release the most recently pushed object
    pub fn pop(&mut self) -> bool {
        match self.entries.pop() {
            Some(entry) => {
                debug!(
                    target: "lifecycle",
                    interface = entry.interface,
                    handle = ?entry.handle,
                    index = self.entries.len(),
                    "teardown release"
                );
                drop(entry.owner);
                true
            }
            None => false,
        }
    }

    /// Release everything, newest first
    pub fn clear(&mut self) {
        let count = self.entries.len();
        while self.pop() {}
        if count > 0 {
            debug!(target: "lifecycle", count, "release stack cleared");
        }
    }
}

impl Drop for ReleaseStack {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for ReleaseStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.interface, entry.handle)),
            )
            .finish()
    }
}
