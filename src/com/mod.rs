//! Component objects - ownership, method tables and activation
//!
//! Architecture:
//! - `guid.rs` - interface and class identifiers
//! - `table.rs` - declarative name → slot tables, `Interface`, `com_interface!`
//! - `interfaces.rs` - built-in interface tables
//! - `lifecycle.rs` - raw acquire/release/query on handles
//! - `ptr.rs` - `ComPtr<I>`, the move-only owner
//! - `teardown.rs` - reverse-order release of everything a session created
//! - `strings.rs` - UTF-16, BSTR and HSTRING
//! - `automation.rs` - late binding through IDispatch
//! - `activation.rs` - apartments and object factories

mod activation;
mod automation;
mod guid;
mod interfaces;
mod lifecycle;
mod ptr;
mod strings;
mod table;
mod teardown;

pub use activation::{
    activation_factory, clsid_from_prog_id, create_instance, Apartment, ApartmentKind,
    CLSCTX_INPROC_SERVER,
};
pub use automation::{
    vt, Variant, DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPID_PROPERTYPUT,
    LOCALE_USER_DEFAULT,
};
pub use guid::{Guid, ParseGuidError};
pub use interfaces::{
    Blob, D3D11Buffer, D3D11Device, D3D11DeviceChild, D3D11DeviceContext, D3D11InputLayout,
    D3D11PixelShader, D3D11RenderTargetView, D3D11Resource, D3D11Texture2D, D3D11VertexShader,
    D3D11View, Dispatch, DxgiDeviceSubObject, DxgiObject, DxgiSwapChain, Inspectable, Unknown,
};
pub use lifecycle::{acquire, query_raw, release};
pub use ptr::ComPtr;
pub use strings::{Bstr, Hstring, WideCString};
pub use table::{Interface, MethodEntry, MethodSpec, MethodTable};
pub use teardown::{ErasedSlot, ReleaseStack, Slot};

use crate::error::DispatchError;
use crate::interop::{marshal, AbiWord, Arg, Library};

/// Call an export of a shared system library
///
/// # Safety
/// `args` must match the export's native signature.
pub(crate) unsafe fn call_system(
    library: &'static str,
    symbol: &'static str,
    args: &[Arg<'_>],
) -> Result<AbiWord, DispatchError> {
    let lib = Library::shared(library)?;
    let export = lib.export(symbol)?;
    let words = marshal(args).map_err(|source| DispatchError::Marshal {
        interface: library,
        method: symbol,
        source,
    })?;
    Ok(export.call(&words))
}

#[cfg(test)]
mod tests;
