//! Calling convention rules the marshaler depends on
//!
//! The dispatcher always calls through `extern "system"`; what varies by
//! platform is how many words travel in registers and which aggregates may be
//! passed by value.

use super::types::WORD_SIZE;

/// Calling convention specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallingConvention {
    /// C calling convention (platform default)
    C,
    /// System V AMD64 ABI (Unix x86-64)
    SysV,
    /// Microsoft x64 calling convention (Windows)
    Win64,
    /// ARM AAPCS (ARM 32-bit)
    Aapcs,
    /// ARM64 calling convention
    Aarch64,
}

impl CallingConvention {
    /// Convention used by `extern "system"` on this target
    #[inline]
    pub const fn native() -> Self {
        #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
        return Self::Win64;

        #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
        return Self::SysV;

        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;

        #[cfg(target_arch = "arm")]
        return Self::Aapcs;

        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "aarch64",
            target_arch = "arm"
        )))]
        return Self::C;
    }

    /// Maximum integer register arguments for this convention
    #[inline]
    pub const fn max_register_args(self) -> usize {
        match self {
            Self::C => 0,       // everything on the stack (x86 stdcall/cdecl)
            Self::SysV => 6,    // RDI, RSI, RDX, RCX, R8, R9
            Self::Win64 => 4,   // RCX, RDX, R8, R9
            Self::Aapcs => 4,   // R0-R3
            Self::Aarch64 => 8, // X0-X7
        }
    }

    /// Largest aggregate, in bytes, that may be passed inline
    #[inline]
    pub const fn max_by_value_aggregate(self) -> usize {
        match self {
            Self::Win64 => WORD_SIZE,
            _ => 2 * WORD_SIZE,
        }
    }

    /// Whether a float at frame `position` (receiver is 0) is read from the
    /// word the dispatcher fills.
    ///
    /// Win64 takes its first four floats from XMM registers; SysV and the ARM
    /// conventions take every float from vector registers. Only stack words
    /// carry float bits unchanged.
    #[inline]
    pub const fn float_in_word(self, position: usize) -> bool {
        match self {
            Self::C => true,
            Self::Win64 => position >= self.max_register_args(),
            Self::SysV | Self::Aapcs | Self::Aarch64 => false,
        }
    }

    /// Whether an aggregate of `size` bytes is passed by value.
    ///
    /// Anything over two words is always passed by reference. Win64 only
    /// inlines power-of-two sizes up to one word.
    #[inline]
    pub const fn passes_by_value(self, size: usize) -> bool {
        if size == 0 || size > self.max_by_value_aggregate() {
            return false;
        }
        match self {
            Self::Win64 => matches!(size, 1 | 2 | 4 | 8),
            _ => true,
        }
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::native()
    }
}

/// Where a word lands in the native call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Register(usize),
    Stack(usize),
}

/// Register accounting for one call frame.
///
/// Floating-point values are reinterpreted into integer words before they get
/// here, so every word consumes an integer register or a stack slot. Float
/// shapes that would need a vector register are refused earlier, by
/// `check_float_slots`.
pub struct RegisterAllocator {
    convention: CallingConvention,
    int_regs_used: usize,
    stack_words: usize,
}

impl RegisterAllocator {
    #[inline]
    pub const fn new(convention: CallingConvention) -> Self {
        Self {
            convention,
            int_regs_used: 0,
            stack_words: 0,
        }
    }

    /// Place the next word
    #[inline]
    pub fn assign(&mut self) -> Placement {
        if self.int_regs_used < self.convention.max_register_args() {
            self.int_regs_used += 1;
            Placement::Register(self.int_regs_used - 1)
        } else {
            self.stack_words += 1;
            Placement::Stack(self.stack_words - 1)
        }
    }

    #[inline]
    pub fn stack_words(&self) -> usize {
        self.stack_words
    }
}
