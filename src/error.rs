//! Error types
//!
//! Foreign failures travel as data carrying the raw code; nothing here panics.

use crate::config::ConfigError;
use crate::harness::HarnessError;
use crate::interop::{LoadError, MarshalError, SymbolError};
use crate::outcome::ResultCode;
use thiserror::Error;

/// Errors raised on the way to, or reported back from, a foreign method
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{interface} has no method named {method}")]
    NoSuchMethod {
        interface: &'static str,
        method: String,
    },

    #[error("{interface}::{method} takes {expected} arguments, got {found}")]
    ArgCount {
        interface: &'static str,
        method: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{interface}::{method}: {source}")]
    Marshal {
        interface: &'static str,
        method: &'static str,
        #[source]
        source: MarshalError,
    },

    #[error("{interface}::{method} failed with {code}")]
    Foreign {
        interface: &'static str,
        method: &'static str,
        code: ResultCode,
    },

    #[error("{interface}::{method} returned {code} without producing an object")]
    NoObject {
        interface: &'static str,
        method: &'static str,
        code: ResultCode,
    },

    #[error("{interface}::{method} manages the reference count and is only reachable through ComPtr")]
    LifecycleSlot {
        interface: &'static str,
        method: &'static str,
    },

    #[error("no live {interface} at release-stack index {index}")]
    StaleSlot {
        interface: &'static str,
        index: usize,
    },

    #[error("string argument contains a NUL at position {position}")]
    InteriorNul { position: usize },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

impl DispatchError {
    /// Raw foreign code, when the error came from the foreign side
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            Self::Foreign { code, .. } | Self::NoObject { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
