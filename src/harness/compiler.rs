//! Shader compilation boundary
//!
//! The compiler is a collaborator: it takes source text, an entry point and
//! a target profile and hands back blobs. What the bytecode means is not our
//! concern; only moving it to the device is.

use super::HarnessError;
use crate::com::{Blob, ComPtr};
use crate::error::DispatchError;
use crate::interop::{marshal, Arg, Library, OutHandle};
use crate::outcome::ResultCode;
use std::ffi::CString;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a compile call produced
#[derive(Debug)]
pub struct CompileOutput {
    pub code: ResultCode,
    /// Compiled bytecode
    pub blob: Option<ComPtr<Blob>>,
    /// Diagnostics; may be present on success too (warnings)
    pub errors: Option<ComPtr<Blob>>,
}

impl CompileOutput {
    /// Diagnostic text, if the compiler produced any
    pub fn diagnostics(&self) -> Option<String> {
        self.errors
            .as_ref()
            .and_then(|blob| blob.text().ok())
            .filter(|text| !text.is_empty())
    }

    /// The bytecode, or an error carrying the diagnostics
    pub fn into_result(self, entry: &str, profile: &str) -> Result<ComPtr<Blob>, HarnessError> {
        let message = self.diagnostics();
        match self.blob {
            Some(blob) if self.code.is_success() => {
                if let Some(warnings) = message {
                    warn!(target: "harness", entry, profile, %warnings, "shader compiled with warnings");
                }
                Ok(blob)
            }
            _ => Err(HarnessError::Compile {
                entry: entry.to_string(),
                profile: profile.to_string(),
                message: message.unwrap_or_else(|| self.code.to_string()),
            }),
        }
    }
}

/// Source to bytecode
pub trait ShaderCompiler {
    fn compile(&self, source: &str, entry: &str, profile: &str)
        -> Result<CompileOutput, HarnessError>;
}

/// `D3DCompile` from the system shader compiler library
#[derive(Debug, Clone)]
pub struct D3DCompiler {
    library: Arc<Library>,
    flags: u32,
}

impl D3DCompiler {
    pub const LIBRARY: &'static str = "d3dcompiler_47.dll";

    /// D3DCOMPILE_DEBUG
    pub const DEBUG: u32 = 1 << 0;
    /// D3DCOMPILE_ENABLE_STRICTNESS
    pub const STRICT: u32 = 1 << 11;

    pub fn load() -> Result<Self, DispatchError> {
        Ok(Self {
            library: Library::shared(Self::LIBRARY)?,
            flags: Self::STRICT,
        })
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

impl ShaderCompiler for D3DCompiler {
    fn compile(
        &self,
        source: &str,
        entry: &str,
        profile: &str,
    ) -> Result<CompileOutput, HarnessError> {
        let entry_c = c_string(entry)?;
        let profile_c = c_string(profile)?;
        let export = self.library.export("D3DCompile").map_err(DispatchError::from)?;

        let mut code_out = OutHandle::new();
        let mut errors_out = OutHandle::new();
        let word = {
            let args = [
                Arg::slice(source.as_bytes()),
                Arg::usize(source.len()),
                Arg::null(),
                Arg::null(),
                Arg::null(),
                Arg::slice(entry_c.as_bytes_with_nul()),
                Arg::slice(profile_c.as_bytes_with_nul()),
                Arg::from(self.flags),
                Arg::from(0u32),
                Arg::out(&mut code_out),
                Arg::out(&mut errors_out),
            ];
            let words = marshal(&args).map_err(|source| DispatchError::Marshal {
                interface: Self::LIBRARY,
                method: "D3DCompile",
                source,
            })?;
            // SAFETY: D3DCompile(LPCVOID, SIZE_T, LPCSTR, const D3D_SHADER_MACRO*,
            // ID3DInclude*, LPCSTR, LPCSTR, UINT, UINT, ID3DBlob**, ID3DBlob**)
            unsafe { export.call(&words) }
        };

        let code = ResultCode::from_word(word);
        // SAFETY: both out-params are blobs whose reference passes to us
        let (blob, errors) = unsafe {
            (
                ComPtr::<Blob>::from_raw(code_out.take()),
                ComPtr::<Blob>::from_raw(errors_out.take()),
            )
        };
        debug!(
            target: "harness",
            entry,
            profile,
            %code,
            bytecode = blob.is_some(),
            diagnostics = errors.is_some(),
            "shader compile"
        );
        Ok(CompileOutput { code, blob, errors })
    }
}

fn c_string(s: &str) -> Result<CString, DispatchError> {
    CString::new(s).map_err(|e| DispatchError::InteriorNul {
        position: e.nul_position(),
    })
}

impl ComPtr<Blob> {
    /// Contents of the blob, borrowed for as long as the reference is held
    pub fn as_bytes(&self) -> Result<&[u8], DispatchError> {
        let ptr = self.call("GetBufferPointer", &[])?;
        let len = self.call("GetBufferSize", &[])?;
        if ptr == 0 || len == 0 {
            return Ok(&[]);
        }
        // SAFETY: the blob owns `len` bytes at `ptr` for as long as we hold
        // our reference, which `&self` keeps alive
        Ok(unsafe { core::slice::from_raw_parts(ptr as *const u8, len) })
    }

    /// Contents as text, trailing NULs dropped
    pub fn text(&self) -> Result<String, DispatchError> {
        let bytes = self.as_bytes()?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}
