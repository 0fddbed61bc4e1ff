//! Result decoding - classifying foreign status words
//!
//! The sign bit is the only failure test. Non-negative codes other than zero
//! (`S_FALSE` and friends) are successes carrying information.

use crate::error::DispatchError;
use crate::interop::{AbiWord, NativeHandle};
use std::fmt;

/// Signed 32-bit status word returned by foreign methods
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const S_OK: Self = Self(0);
    pub const S_FALSE: Self = Self(1);
    pub const E_NOTIMPL: Self = Self::from_bits(0x8000_4001);
    pub const E_NOINTERFACE: Self = Self::from_bits(0x8000_4002);
    pub const E_POINTER: Self = Self::from_bits(0x8000_4003);
    pub const E_ABORT: Self = Self::from_bits(0x8000_4004);
    pub const E_FAIL: Self = Self::from_bits(0x8000_4005);
    pub const E_UNEXPECTED: Self = Self::from_bits(0x8000_FFFF);
    pub const E_ACCESSDENIED: Self = Self::from_bits(0x8007_0005);
    pub const E_OUTOFMEMORY: Self = Self::from_bits(0x8007_000E);
    pub const E_INVALIDARG: Self = Self::from_bits(0x8007_0057);
    pub const DISP_E_MEMBERNOTFOUND: Self = Self::from_bits(0x8002_0003);
    pub const DISP_E_UNKNOWNNAME: Self = Self::from_bits(0x8002_0006);
    pub const DISP_E_EXCEPTION: Self = Self::from_bits(0x8002_0009);
    pub const RPC_E_CHANGED_MODE: Self = Self::from_bits(0x8001_0106);
    pub const CLASS_E_CLASSNOTAVAILABLE: Self = Self::from_bits(0x8004_0111);
    pub const REGDB_E_CLASSNOTREG: Self = Self::from_bits(0x8004_0154);
    pub const CO_E_CLASSSTRING: Self = Self::from_bits(0x8004_01F3);

    /// Code from its unsigned hex spelling
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits as i32)
    }

    /// Code from a returned word; only the low 32 bits are meaningful
    #[inline]
    pub const fn from_word(word: AbiWord) -> Self {
        Self(word as u32 as i32)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Facility field (bits 16..=26)
    #[inline]
    pub const fn facility(self) -> u16 {
        ((self.bits() >> 16) & 0x7FF) as u16
    }

    /// Propagate failures as typed errors for `?` at call sites
    pub fn check(self, interface: &'static str, method: &'static str) -> Result<Self, DispatchError> {
        if self.is_failure() {
            Err(DispatchError::Foreign {
                interface,
                method,
                code: self,
            })
        } else {
            Ok(self)
        }
    }

    /// Symbolic name for well-known codes
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::S_OK => "S_OK",
            Self::S_FALSE => "S_FALSE",
            Self::E_NOTIMPL => "E_NOTIMPL",
            Self::E_NOINTERFACE => "E_NOINTERFACE",
            Self::E_POINTER => "E_POINTER",
            Self::E_ABORT => "E_ABORT",
            Self::E_FAIL => "E_FAIL",
            Self::E_UNEXPECTED => "E_UNEXPECTED",
            Self::E_ACCESSDENIED => "E_ACCESSDENIED",
            Self::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::DISP_E_MEMBERNOTFOUND => "DISP_E_MEMBERNOTFOUND",
            Self::DISP_E_UNKNOWNNAME => "DISP_E_UNKNOWNNAME",
            Self::DISP_E_EXCEPTION => "DISP_E_EXCEPTION",
            Self::RPC_E_CHANGED_MODE => "RPC_E_CHANGED_MODE",
            Self::CLASS_E_CLASSNOTAVAILABLE => "CLASS_E_CLASSNOTAVAILABLE",
            Self::REGDB_E_CLASSNOTREG => "REGDB_E_CLASSNOTREG",
            Self::CO_E_CLASSSTRING => "CO_E_CLASSSTRING",
            _ => return None,
        })
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{:#010x} ({})", self.bits(), name),
            None => write!(f, "{:#010x}", self.bits()),
        }
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultCode({})", self)
    }
}

impl From<i32> for ResultCode {
    #[inline]
    fn from(code: i32) -> Self {
        Self(code)
    }
}

/// Classification of a plain status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    SuccessWithInfo(ResultCode),
    Failure(ResultCode),
}

/// Classify a status word by its sign
#[inline]
pub fn decode(code: ResultCode) -> Status {
    match code.0 {
        0 => Status::Success,
        c if c > 0 => Status::SuccessWithInfo(code),
        _ => Status::Failure(code),
    }
}

/// Result of a call that is expected to produce an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryOutcome<T> {
    /// Object produced; the code may still carry information
    Success(T, ResultCode),
    /// Non-negative code but no object (cancelled, nothing to return)
    PartialSuccess(ResultCode),
    Failure(ResultCode),
}

impl<T> FactoryOutcome<T> {
    #[inline]
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Success(_, code) | Self::PartialSuccess(code) | Self::Failure(code) => *code,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(..))
    }

    #[inline]
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialSuccess(_))
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The produced object, if any
    #[inline]
    pub fn object(self) -> Option<T> {
        match self {
            Self::Success(value, _) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FactoryOutcome<U> {
        match self {
            Self::Success(value, code) => FactoryOutcome::Success(f(value), code),
            Self::PartialSuccess(code) => FactoryOutcome::PartialSuccess(code),
            Self::Failure(code) => FactoryOutcome::Failure(code),
        }
    }

    /// Collapse into a `Result`, treating "no object" as an error
    pub fn into_result(
        self,
        interface: &'static str,
        method: &'static str,
    ) -> Result<T, DispatchError> {
        match self {
            Self::Success(value, _) => Ok(value),
            Self::PartialSuccess(code) => Err(DispatchError::NoObject {
                interface,
                method,
                code,
            }),
            Self::Failure(code) => Err(DispatchError::Foreign {
                interface,
                method,
                code,
            }),
        }
    }
}

/// Classify a factory-style call by its code and its output handle.
///
/// A handle written alongside a failure code is not adopted.
pub fn decode_factory(code: ResultCode, out: NativeHandle) -> FactoryOutcome<NativeHandle> {
    if code.is_failure() {
        if !out.is_null() {
            tracing::warn!(
                target: "dispatch",
                %code,
                handle = ?out,
                "failure reported with a non-null output; not adopting it"
            );
        }
        return FactoryOutcome::Failure(code);
    }
    if out.is_null() {
        FactoryOutcome::PartialSuccess(code)
    } else {
        FactoryOutcome::Success(out, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_handle() -> NativeHandle {
        // never dereferenced
        unsafe { NativeHandle::from_raw(0x1000 as *mut core::ffi::c_void) }
    }

    #[test]
    fn test_sign_rule() {
        assert_eq!(decode(ResultCode(-1)), Status::Failure(ResultCode(-1)));
        assert_eq!(decode(ResultCode::S_OK), Status::Success);
        assert_eq!(
            decode(ResultCode::S_FALSE),
            Status::SuccessWithInfo(ResultCode::S_FALSE)
        );
        assert!(ResultCode::E_FAIL.is_failure());
        assert!(ResultCode(0x7FFF_FFFF).is_success());
    }

    #[test]
    fn test_from_word_uses_low_bits() {
        let word = 0xDEAD_0000_8000_4005u64 as AbiWord;
        #[cfg(target_pointer_width = "64")]
        assert_eq!(ResultCode::from_word(word), ResultCode::E_FAIL);
        assert_eq!(ResultCode::from_word(0), ResultCode::S_OK);
    }

    #[test]
    fn test_factory_outcomes_are_distinct() {
        let failed = decode_factory(ResultCode(-1), NativeHandle::null());
        let produced = decode_factory(ResultCode::S_OK, fake_handle());
        let nothing = decode_factory(ResultCode::S_OK, NativeHandle::null());

        assert!(failed.is_failure());
        assert!(produced.is_success());
        assert!(nothing.is_partial());
        assert_ne!(produced, nothing);
        assert_ne!(nothing, failed);
    }

    #[test]
    fn test_failure_ignores_stray_output() {
        let outcome = decode_factory(ResultCode::E_FAIL, fake_handle());
        assert_eq!(outcome, FactoryOutcome::Failure(ResultCode::E_FAIL));
    }

    #[test]
    fn test_info_code_with_object_is_success() {
        let outcome = decode_factory(ResultCode::S_FALSE, fake_handle());
        assert_eq!(outcome.code(), ResultCode::S_FALSE);
        assert!(outcome.object().is_some());
    }

    #[test]
    fn test_into_result() {
        let partial: FactoryOutcome<u32> = FactoryOutcome::PartialSuccess(ResultCode::S_FALSE);
        let err = partial.into_result("IShellDispatch", "BrowseForFolder").unwrap_err();
        assert!(matches!(err, DispatchError::NoObject { .. }));

        let ok = FactoryOutcome::Success(7u32, ResultCode::S_OK).map(|v| v * 2);
        assert_eq!(ok.into_result("I", "M").unwrap(), 14);
    }

    #[test]
    fn test_check_and_display() {
        assert!(ResultCode::S_FALSE.check("I", "M").is_ok());
        let err = ResultCode::E_NOINTERFACE.check("IUnknown", "QueryInterface").unwrap_err();
        assert!(err.to_string().contains("E_NOINTERFACE"));
        assert_eq!(ResultCode::E_FAIL.to_string(), "0x80004005 (E_FAIL)");
        assert_eq!(ResultCode::E_OUTOFMEMORY.facility(), 7);
    }
}
