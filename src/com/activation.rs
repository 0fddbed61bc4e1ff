//! Object activation: apartments, class lookup and factories
//!
//! All entry points are exports of ole32/combase resolved at run time; on
//! hosts without them every call fails with a load error.

use super::call_system;
use super::guid::Guid;
use super::ptr::{adopt_outcome, ComPtr};
use super::strings::{Hstring, WideCString};
use super::table::Interface;
use crate::error::DispatchError;
use crate::interop::{Arg, OutHandle};
use crate::outcome::{decode_factory, FactoryOutcome, ResultCode};
use core::marker::PhantomData;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const OLE32: &str = "ole32.dll";
const COMBASE: &str = "combase.dll";

/// In-process servers only
pub const CLSCTX_INPROC_SERVER: u32 = 0x1;

/// Threading model of the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApartmentKind {
    /// Single-threaded
    Sta,
    /// Multi-threaded
    #[default]
    Mta,
}

impl ApartmentKind {
    /// COINIT flags for CoInitializeEx
    #[inline]
    pub const fn coinit(self) -> u32 {
        match self {
            Self::Sta => 0x2,
            Self::Mta => 0x0,
        }
    }

    /// RO_INIT_TYPE for RoInitialize
    #[inline]
    pub const fn ro_init(self) -> u32 {
        match self {
            Self::Sta => 0,
            Self::Mta => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Runtime {
    Classic,
    WinRt,
}

/// Per-thread apartment membership, left on drop
#[derive(Debug)]
pub struct Apartment {
    kind: ApartmentKind,
    runtime: Runtime,
    owned: bool,
    // membership belongs to the initializing thread
    _thread: PhantomData<*const ()>,
}

impl Apartment {
    /// Join an apartment for classic objects (CoInitializeEx)
    pub fn initialize(kind: ApartmentKind) -> Result<Self, DispatchError> {
        // SAFETY: CoInitializeEx(LPVOID reserved, DWORD coinit)
        let word = unsafe {
            call_system(OLE32, "CoInitializeEx", &[Arg::null(), Arg::from(kind.coinit())])?
        };
        Self::joined(kind, Runtime::Classic, ResultCode::from_word(word), OLE32, "CoInitializeEx")
    }

    /// Join an apartment for runtime classes (RoInitialize)
    pub fn initialize_runtime(kind: ApartmentKind) -> Result<Self, DispatchError> {
        // SAFETY: RoInitialize(RO_INIT_TYPE)
        let word = unsafe { call_system(COMBASE, "RoInitialize", &[Arg::from(kind.ro_init())])? };
        Self::joined(kind, Runtime::WinRt, ResultCode::from_word(word), COMBASE, "RoInitialize")
    }

    fn joined(
        kind: ApartmentKind,
        runtime: Runtime,
        code: ResultCode,
        library: &'static str,
        method: &'static str,
    ) -> Result<Self, DispatchError> {
        let owned = if code == ResultCode::RPC_E_CHANGED_MODE {
            // the thread already belongs to the other model; use it as is
            warn!(target: "activation", ?kind, %code, "apartment already initialized");
            false
        } else {
            code.check(library, method)?;
            true
        };
        info!(target: "activation", ?kind, ?runtime, %code, "apartment joined");
        Ok(Self {
            kind,
            runtime,
            owned,
            _thread: PhantomData,
        })
    }

    #[inline]
    pub fn kind(&self) -> ApartmentKind {
        self.kind
    }

    /// Whether dropping this value leaves the apartment
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for Apartment {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        let (library, symbol) = match self.runtime {
            Runtime::Classic => (OLE32, "CoUninitialize"),
            Runtime::WinRt => (COMBASE, "RoUninitialize"),
        };
        // SAFETY: balances the successful initialize above
        match unsafe { call_system(library, symbol, &[]) } {
            Ok(_) => debug!(target: "activation", kind = ?self.kind, "apartment left"),
            Err(err) => warn!(target: "activation", error = %err, "failed to leave apartment"),
        }
    }
}

/// Class id registered for a programmatic id such as `"Shell.Application"`
pub fn clsid_from_prog_id(prog_id: &str) -> Result<Guid, DispatchError> {
    let wide = WideCString::new(prog_id)?;
    let mut clsid = Guid::zeroed();
    // SAFETY: CLSIDFromProgID(LPCOLESTR, LPCLSID)
    let word = unsafe {
        call_system(
            OLE32,
            "CLSIDFromProgID",
            &[wide.as_arg(), Arg::out_value(&mut clsid)],
        )?
    };
    ResultCode::from_word(word).check(OLE32, "CLSIDFromProgID")?;
    debug!(target: "activation", prog_id, %clsid, "class resolved");
    Ok(clsid)
}

/// Create an in-process object of class `clsid`, asking for `I`
pub fn create_instance<I: Interface>(
    clsid: &Guid,
) -> Result<FactoryOutcome<ComPtr<I>>, DispatchError> {
    let iid = I::IID;
    let mut out = OutHandle::new();
    // SAFETY: CoCreateInstance(REFCLSID, LPUNKNOWN, DWORD, REFIID, LPVOID*)
    let word = unsafe {
        call_system(
            OLE32,
            "CoCreateInstance",
            &[
                Arg::by_ref(clsid),
                Arg::null(),
                Arg::from(CLSCTX_INPROC_SERVER),
                Arg::by_ref(&iid),
                Arg::out(&mut out),
            ],
        )?
    };
    let outcome = decode_factory(ResultCode::from_word(word), out.take());
    debug!(target: "activation", %clsid, interface = I::NAME, code = %outcome.code(), "create instance");
    // SAFETY: the object was asked for `I` by IID
    Ok(unsafe { adopt_outcome(outcome) })
}

/// Activation factory of a runtime class, asking for `I`
pub fn activation_factory<I: Interface>(
    class_name: &str,
) -> Result<FactoryOutcome<ComPtr<I>>, DispatchError> {
    let name = Hstring::new(class_name)?;
    let iid = I::IID;
    let mut out = OutHandle::new();
    // SAFETY: RoGetActivationFactory(HSTRING, REFIID, void**)
    let word = unsafe {
        call_system(
            COMBASE,
            "RoGetActivationFactory",
            &[name.as_arg(), Arg::by_ref(&iid), Arg::out(&mut out)],
        )?
    };
    let outcome = decode_factory(ResultCode::from_word(word), out.take());
    debug!(target: "activation", class_name, interface = I::NAME, code = %outcome.code(), "activation factory");
    // SAFETY: the factory was asked for `I` by IID
    Ok(unsafe { adopt_outcome(outcome) })
}
