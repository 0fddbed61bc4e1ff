//! vtcall - dynamic dispatch onto vtable-based foreign objects
//!
//! Calls methods on COM, WinRT and Direct3D objects by name, without
//! generated bindings. Layers, leaf first:
//!
//! - [`interop`] - typed arguments, marshaling, the `invoke` primitive
//! - [`outcome`] - result codes and factory outcomes
//! - [`com`] - owning pointers, method tables, teardown, activation
//! - [`harness`] - message loop, per-frame scripts, shader compiler
//!
//! ```no_run
//! use vtcall::com::{ComPtr, D3D11DeviceContext};
//!
//! fn clear(context: &ComPtr<D3D11DeviceContext>) -> vtcall::Result<()> {
//!     context.call("ClearState", &[])?;
//!     context.call("Flush", &[])?;
//!     Ok(())
//! }
//! ```

pub mod com;
pub mod config;
pub mod error;
pub mod fake;
pub mod harness;
pub mod interop;
pub mod logging;
pub mod outcome;

pub use com::{ComPtr, Interface, ReleaseStack};
pub use config::Config;
pub use error::{DispatchError, Error, Result};
pub use interop::{invoke, Arg, NativeHandle, VTableSlot};
pub use outcome::{decode, decode_factory, FactoryOutcome, ResultCode, Status};

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}
