//! Declarative method tables: method name → vtable slot
//!
//! A table is built once per interface from its base table plus its own
//! methods in declaration order, so slot numbers follow the native layout
//! without being written out by hand.

use super::guid::Guid;
use crate::error::DispatchError;
use crate::interop::{ArgKind, VTableSlot};
use std::collections::HashMap;

/// One declared method: its name and argument shape
#[derive(Debug, Clone, Copy)]
pub struct MethodSpec {
    pub name: &'static str,
    pub shape: &'static [ArgKind],
}

impl MethodSpec {
    #[inline]
    pub const fn new(name: &'static str, shape: &'static [ArgKind]) -> Self {
        Self { name, shape }
    }
}

/// Resolved method: name, slot and argument shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodEntry {
    pub name: &'static str,
    pub slot: VTableSlot,
    pub shape: &'static [ArgKind],
}

impl MethodEntry {
    /// `AddRef` or `Release`: owned by `ComPtr`, never called by name
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        self.slot == VTableSlot::ADD_REF || self.slot == VTableSlot::RELEASE
    }
}

/// Name → slot mapping for one interface, including inherited methods
#[derive(Debug)]
pub struct MethodTable {
    interface: &'static str,
    entries: Vec<MethodEntry>,
    index: HashMap<&'static str, usize>,
}

impl MethodTable {
    /// Extend `base` with `own` methods, numbered after the base's last slot
    pub fn build(
        interface: &'static str,
        base: Option<&'static MethodTable>,
        own: &[MethodSpec],
    ) -> Self {
        let mut entries = base.map(|b| b.entries.clone()).unwrap_or_default();
        entries.reserve(own.len());
        for spec in own {
            entries.push(MethodEntry {
                name: spec.name,
                slot: VTableSlot::new(entries.len()),
                shape: spec.shape,
            });
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            // a redeclared name resolves to the most derived slot
            index.insert(entry.name, position);
        }

        Self {
            interface,
            entries,
            index,
        }
    }

    #[inline]
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Resolve a method by name
    pub fn lookup(&self, method: &str) -> Result<&MethodEntry, DispatchError> {
        self.index
            .get(method)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| DispatchError::NoSuchMethod {
                interface: self.interface,
                method: method.to_string(),
            })
    }

    /// Resolve a method that may be called by name.
    ///
    /// Reference counting stays with the owning pointer, so `AddRef` and
    /// `Release` are refused.
    pub fn callable(&self, method: &str) -> Result<&MethodEntry, DispatchError> {
        let entry = self.lookup(method)?;
        if entry.is_lifecycle() {
            return Err(DispatchError::LifecycleSlot {
                interface: self.interface,
                method: entry.name,
            });
        }
        Ok(entry)
    }

    /// Method occupying a slot
    #[inline]
    pub fn entry(&self, slot: VTableSlot) -> Option<&MethodEntry> {
        self.entries.get(slot.index())
    }

    /// Number of slots, inherited ones included
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = &MethodEntry> {
        self.entries.iter()
    }

    /// Whether this table begins with every slot of `base`
    pub fn extends(&self, base: &MethodTable) -> bool {
        base.entries.len() <= self.entries.len()
            && base
                .entries
                .iter()
                .zip(&self.entries)
                .all(|(b, e)| b.name == e.name && b.slot == e.slot)
    }
}

/// A foreign interface: identity plus method table.
///
/// # Safety
/// `methods()` must describe the real vtable layout of objects obtained
/// through `IID`; a wrong slot number calls the wrong function.
pub unsafe trait Interface: 'static {
    /// Native interface name, used in diagnostics
    const NAME: &'static str;
    const IID: Guid;
    fn methods() -> &'static MethodTable;
}

/// Declare interface markers together with their method tables.
///
/// ```ignore
/// com_interface! {
///     /// IDispatch
///     pub Dispatch("IDispatch", 0x00020400_0000_0000_C000_000000000046): Unknown {
///         GetTypeInfoCount(OutPtr),
///         GetTypeInfo(U32, U32, OutPtr),
///     }
/// }
/// ```
///
/// Each method lists the `ArgKind`s after the implicit receiver. Methods take
/// slots after the base interface's last slot, in declaration order.
#[macro_export]
macro_rules! com_interface {
    (@base) => { None };
    (@base $base:path) => {
        Some(<$base as $crate::com::Interface>::methods())
    };
    ($(
        $(#[$meta:meta])*
        $vis:vis $ty:ident ($name:literal, $iid:literal) $(: $base:path)? {
            $( $method:ident ( $($kind:ident),* $(,)? ) ),* $(,)?
        }
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $ty {}

        unsafe impl $crate::com::Interface for $ty {
            const NAME: &'static str = $name;
            const IID: $crate::com::Guid = $crate::com::Guid::from_u128($iid);

            fn methods() -> &'static $crate::com::MethodTable {
                static TABLE: $crate::__private::Lazy<$crate::com::MethodTable> =
                    $crate::__private::Lazy::new(|| {
                        $crate::com::MethodTable::build(
                            $name,
                            $crate::com_interface!(@base $($base)?),
                            &[$(
                                $crate::com::MethodSpec::new(
                                    stringify!($method),
                                    &[$($crate::interop::ArgKind::$kind),*],
                                )
                            ),*],
                        )
                    });
                &TABLE
            }
        }
    )*};
}
