//! Argument marshaling - typed arguments to native ABI words
//!
//! Scalars are extended to a full word, floats are reinterpreted bit for bit,
//! and aggregates are either packed inline or replaced by their address
//! depending on the calling convention's size rule.

use super::abi::{CallingConvention, RegisterAllocator};
use super::types::{AbiWord, Arg, ArgKind, MarshaledArgs, Payload, WORD_SIZE};
use thiserror::Error;
use tracing::trace;

/// Marshaling failures, all detected before any foreign call is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("call frame exceeds {max} argument words")]
    FrameTooLarge { max: usize },

    #[error("zero-sized aggregate cannot be marshaled")]
    EmptyAggregate,

    #[error("argument {index}: {found} does not fit a {expected} slot")]
    Narrowing {
        index: usize,
        expected: ArgKind,
        found: ArgKind,
    },

    #[error("argument {index}: {kind} by value needs a floating-point register")]
    FloatRegister { index: usize, kind: ArgKind },

    #[error("argument {index}: empty array")]
    EmptyArray { index: usize },

    #[error("argument {index}: expected {expected}, found {found}")]
    KindMismatch {
        index: usize,
        expected: ArgKind,
        found: ArgKind,
    },
}

/// Marshal arguments with the native calling convention
#[inline]
pub fn marshal<'a>(args: &[Arg<'a>]) -> Result<MarshaledArgs<'a>, MarshalError> {
    marshal_with(CallingConvention::native(), args)
}

/// Marshal arguments for an explicit calling convention
pub fn marshal_with<'a>(
    convention: CallingConvention,
    args: &[Arg<'a>],
) -> Result<MarshaledArgs<'a>, MarshalError> {
    let mut out = MarshaledArgs::empty();
    for arg in args {
        marshal_arg(convention, arg, &mut out)?;
    }

    // receiver takes the first register
    let mut registers = RegisterAllocator::new(convention);
    registers.assign();
    for _ in 0..out.len() {
        registers.assign();
    }
    out.set_spilled(registers.stack_words());

    trace!(
        target: "marshal",
        args = args.len(),
        words = out.len(),
        stack_words = out.spilled(),
        "arguments marshaled"
    );
    Ok(out)
}

/// Append the words for one argument
pub fn marshal_arg<'a>(
    convention: CallingConvention,
    arg: &Arg<'a>,
    out: &mut MarshaledArgs<'a>,
) -> Result<(), MarshalError> {
    match arg.payload() {
        Payload::Signed(value) => out.push(value as isize as AbiWord),
        Payload::Unsigned(value) => out.push(value as AbiWord),
        Payload::Addr(addr) => out.push(addr),
        Payload::F32(value) => out.push(f32_to_word(value)),
        Payload::F64(value) => {
            for word in f64_to_words(value) {
                out.push(word)?;
            }
            Ok(())
        }
        Payload::Aggregate { addr, size } => {
            if size == 0 {
                return Err(MarshalError::EmptyAggregate);
            }
            if !convention.passes_by_value(size) {
                return out.push(addr);
            }
            // SAFETY: `addr` came from a `&T` of `size` bytes that the
            // argument's lifetime keeps alive.
            let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, size) };
            for chunk in bytes.chunks(WORD_SIZE) {
                out.push(pack_word(chunk))?;
            }
            Ok(())
        }
    }
}

/// Check arguments against a declared method shape, position by position
pub fn check_shape(shape: &[ArgKind], args: &[Arg<'_>]) -> Result<(), MarshalError> {
    check_kinds(shape, args.iter().map(Arg::kind))
}

/// `check_shape` for argument kinds known before the arguments exist
pub fn check_kinds(
    shape: &[ArgKind],
    kinds: impl IntoIterator<Item = ArgKind>,
) -> Result<(), MarshalError> {
    for (index, (declared, found)) in shape.iter().zip(kinds).enumerate() {
        if declared.accepts(found) {
            continue;
        }
        if declared.is_integral() && found.is_integral() && found.size() > declared.size() {
            return Err(MarshalError::Narrowing {
                index,
                expected: *declared,
                found,
            });
        }
        return Err(MarshalError::KindMismatch {
            index,
            expected: *declared,
            found,
        });
    }
    Ok(())
}

/// Refuse method shapes whose by-value floats the callee would read from a
/// vector register.
///
/// The dispatcher only fills integer registers and stack words. `shape`
/// excludes the receiver, which takes position 0.
pub fn check_float_slots(
    convention: CallingConvention,
    shape: &[ArgKind],
) -> Result<(), MarshalError> {
    for (index, kind) in shape.iter().enumerate() {
        if matches!(kind, ArgKind::F32 | ArgKind::F64) && !convention.float_in_word(index + 1) {
            return Err(MarshalError::FloatRegister { index, kind: *kind });
        }
    }
    Ok(())
}

/// Reinterpret an `f32` as an integer word (zero-extended)
#[inline]
pub fn f32_to_word(value: f32) -> AbiWord {
    value.to_bits() as AbiWord
}

/// Recover an `f32` from the low 32 bits of a word
#[inline]
pub fn word_to_f32(word: AbiWord) -> f32 {
    f32::from_bits(word as u32)
}

/// Reinterpret an `f64` as the words that carry it
#[cfg(target_pointer_width = "64")]
#[inline]
pub fn f64_to_words(value: f64) -> [AbiWord; 1] {
    [value.to_bits() as AbiWord]
}

/// Reinterpret an `f64` as the words that carry it (low half first)
#[cfg(target_pointer_width = "32")]
#[inline]
pub fn f64_to_words(value: f64) -> [AbiWord; 2] {
    let bits = value.to_bits();
    [bits as u32 as AbiWord, (bits >> 32) as u32 as AbiWord]
}

/// Recover an `f64` from the words produced by `f64_to_words`
pub fn words_to_f64(words: &[AbiWord]) -> Option<f64> {
    #[cfg(target_pointer_width = "64")]
    {
        words.first().map(|&w| f64::from_bits(w as u64))
    }
    #[cfg(target_pointer_width = "32")]
    {
        match words {
            [lo, hi, ..] => Some(f64::from_bits((*lo as u64) | ((*hi as u64) << 32))),
            _ => None,
        }
    }
}

/// Load up to one word of bytes as memory would, zero padded
#[inline]
fn pack_word(chunk: &[u8]) -> AbiWord {
    let mut buf = [0u8; WORD_SIZE];
    buf[..chunk.len()].copy_from_slice(chunk);
    AbiWord::from_ne_bytes(buf)
}
