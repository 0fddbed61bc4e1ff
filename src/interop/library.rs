//! Dynamic library loading and exported-function calls
//!
//! Platform-agnostic wrapper around dlopen/LoadLibrary. Factory entry points
//! (CoCreateInstance, D3DCompile, RoGetActivationFactory, ...) are plain
//! exports; they are resolved here and called through the same word-frame
//! primitive as vtable methods.

use super::call::call_export;
use super::types::{AbiWord, MarshaledArgs};
use core::ffi::c_void;
use core::marker::PhantomData;
use core::ptr::NonNull;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CString;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Handle to a dynamically loaded library
pub struct Library {
    name: String,
    handle: NonNull<c_void>,
}

impl Library {
    /// Load library by name, searching the platform's standard paths
    pub fn load(name: &str) -> Result<Self, LoadError> {
        let handle = Self::load_impl(name)?;
        debug!(target: "activation", library = name, "library loaded");
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    /// Shared, process-wide instance of a library, loaded on first use
    pub fn shared(name: &str) -> Result<Arc<Self>, LoadError> {
        static LOADED: Lazy<Mutex<HashMap<String, Arc<Library>>>> =
            Lazy::new(|| Mutex::new(HashMap::new()));

        let mut loaded = LOADED.lock();
        if let Some(lib) = loaded.get(name) {
            return Ok(Arc::clone(lib));
        }
        let lib = Arc::new(Self::load(name)?);
        loaded.insert(name.to_string(), Arc::clone(&lib));
        Ok(lib)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(unix)]
    fn load_impl(name: &str) -> Result<NonNull<c_void>, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;

        unsafe {
            let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW);
            NonNull::new(handle).ok_or_else(|| {
                let err = libc::dlerror();
                let msg = if !err.is_null() {
                    std::ffi::CStr::from_ptr(err).to_string_lossy().into_owned()
                } else {
                    "unknown error".into()
                };
                LoadError::LoadFailed {
                    name: name.to_string(),
                    reason: msg,
                }
            })
        }
    }

    #[cfg(windows)]
    fn load_impl(name: &str) -> Result<NonNull<c_void>, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::LoadLibraryW;

        if name.contains('\0') {
            return Err(LoadError::InvalidName);
        }
        let wide: Vec<u16> = OsStr::new(name).encode_wide().chain(Some(0)).collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr());
            NonNull::new(handle as *mut c_void).ok_or_else(|| LoadError::LoadFailed {
                name: name.to_string(),
                reason: format!("error code {}", GetLastError()),
            })
        }
    }

    /// Resolve an exported function
    pub fn export(&self, symbol: &str) -> Result<Export<'_>, SymbolError> {
        let cname = CString::new(symbol).map_err(|_| SymbolError::InvalidName)?;
        let ptr = self.symbol_impl(&cname);
        if ptr.is_null() {
            return Err(SymbolError::NotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
            });
        }
        Ok(Export {
            name: symbol.to_string(),
            ptr,
            _library: PhantomData,
        })
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &CString) -> *const c_void {
        unsafe { libc::dlsym(self.handle.as_ptr(), name.as_ptr()) as *const c_void }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &CString) -> *const c_void {
        use winapi::um::libloaderapi::GetProcAddress;

        unsafe { GetProcAddress(self.handle.as_ptr() as _, name.as_ptr()) as *const c_void }
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        let rc = unsafe { libc::dlclose(self.handle.as_ptr()) };
        if rc != 0 {
            warn!(target: "activation", library = %self.name, "dlclose failed");
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        use winapi::um::libloaderapi::FreeLibrary;

        let ok = unsafe { FreeLibrary(self.handle.as_ptr() as _) };
        if ok == 0 {
            warn!(target: "activation", library = %self.name, "FreeLibrary failed");
        }
    }
}

// Module handles are process-wide and valid from any thread.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl core::fmt::Debug for Library {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Library").field("name", &self.name).finish()
    }
}

/// Exported function, valid while its library is loaded
#[derive(Debug)]
pub struct Export<'lib> {
    name: String,
    ptr: *const c_void,
    _library: PhantomData<&'lib Library>,
}

impl Export<'_> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn address(&self) -> *const c_void {
        self.ptr
    }

    /// Call the export with marshaled arguments
    ///
    /// # Safety
    /// `args` must match the export's native signature word for word, and any
    /// pointers in it must satisfy the function's contract.
    #[inline]
    pub unsafe fn call(&self, args: &MarshaledArgs<'_>) -> AbiWord {
        call_export(self.ptr, args)
    }
}

/// Library loading errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("invalid library name")]
    InvalidName,

    #[error("failed to load library {name}: {reason}")]
    LoadFailed { name: String, reason: String },
}

/// Symbol lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("invalid symbol name")]
    InvalidName,

    #[error("symbol {symbol} not found in {library}")]
    NotFound { library: String, symbol: String },
}
