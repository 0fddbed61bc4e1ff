//! Interoperability - calling into foreign binary objects
//!
//! Design: one unsafe dispatch primitive, everything else typed
//!
//! Architecture:
//! - `types.rs` - handles, slots, frames and typed arguments
//! - `marshal.rs` - typed arguments → ABI words
//! - `call.rs` - vtable dispatch (`invoke`) and exported-function calls
//! - `abi.rs` - calling convention rules (registers, aggregate size limits)
//! - `library.rs` - dynamic library loading (dlopen/LoadLibrary)

mod abi;
mod call;
mod library;
mod marshal;
mod types;

pub use abi::{CallingConvention, Placement, RegisterAllocator};
pub use call::{invoke, SENTINEL};
pub use library::{Export, Library, LoadError, SymbolError};
pub use marshal::{
    check_float_slots, check_kinds, check_shape, f32_to_word, f64_to_words, marshal, marshal_arg,
    marshal_with, word_to_f32, words_to_f64, MarshalError,
};
pub use types::{
    AbiWord, Arg, ArgKind, CallFrame, MarshaledArgs, NativeHandle, OutHandle, VTableSlot,
    MAX_ARG_WORDS, MAX_FRAME_WORDS, WORD_SIZE,
};

#[cfg(test)]
mod tests;
