use super::*;
use crate::com::Interface;
use crate::fake::{Echo, FakeHeap};
use proptest::prelude::*;

fn words(args: &[Arg<'_>]) -> Vec<AbiWord> {
    marshal(args).unwrap().words().to_vec()
}

#[test]
fn test_invoke_null_handle_returns_sentinel() {
    // far outside any table: a read would fault
    let slot = VTableSlot::new(9999);
    let args = MarshaledArgs::from_words(&[1, 2, 3]).unwrap();
    let result = unsafe { invoke(NativeHandle::null(), slot, &args) };
    assert_eq!(result, SENTINEL);
}

#[test]
fn test_invoke_fake_echo() {
    let heap = FakeHeap::new();
    let echo = heap.echo();

    let args = marshal(&[Arg::usize(40), Arg::usize(2)]).unwrap();
    let result = unsafe { invoke(echo, VTableSlot::new(4), &args) };
    assert_eq!(result, 42);

    let eight: Vec<Arg<'_>> = (1..=8).map(Arg::usize).collect();
    let args = marshal(&eight).unwrap();
    let result = unsafe { invoke(echo, VTableSlot::new(6), &args) };
    assert_eq!(result, 36);

    let calls = heap.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].slot, 4);
    assert_eq!(calls[0].words, vec![40, 2]);
    assert_eq!(calls[1].words, (1..=8).collect::<Vec<_>>());

    unsafe { invoke(echo, VTableSlot::RELEASE, &MarshaledArgs::empty()) };
    assert!(!heap.is_live(echo));
}

#[test]
fn test_invoke_echo_slots_match_table() {
    let table = Echo::methods();
    assert_eq!(table.lookup("Echo1").unwrap().slot, VTableSlot::new(3));
    assert_eq!(table.lookup("Spawn").unwrap().slot, VTableSlot::new(7));
}

#[test]
fn test_float_travels_as_bits() {
    let heap = FakeHeap::new();
    let echo = heap.echo();

    let args = marshal(&[Arg::from(1.5f32)]).unwrap();
    let result = unsafe { invoke(echo, VTableSlot::new(3), &args) };
    assert_eq!(word_to_f32(result), 1.5);
    assert_eq!(result, 1.5f32.to_bits() as AbiWord);
    unsafe { invoke(echo, VTableSlot::RELEASE, &MarshaledArgs::empty()) };
}

#[test]
fn test_scalar_extension() {
    assert_eq!(words(&[Arg::from(-1i32)]), vec![usize::MAX]);
    assert_eq!(words(&[Arg::from(-2i8)]), vec![(-2isize) as usize]);
    assert_eq!(words(&[Arg::from(255u8)]), vec![255]);
    assert_eq!(words(&[Arg::from(true), Arg::from(false)]), vec![1, 0]);
    assert_eq!(words(&[Arg::null()]), vec![0]);
}

#[test]
fn test_empty_slice_is_null() {
    let empty: [u32; 0] = [];
    let arg = Arg::slice(&empty);
    assert_eq!(arg.kind(), ArgKind::Ptr);
    assert_eq!(words(&[arg]), vec![0]);

    let values = [1u32, 2, 3];
    assert_eq!(words(&[Arg::slice(&values)]), vec![values.as_ptr() as AbiWord]);
}

#[test]
fn test_large_aggregate_by_address() {
    let value = [1u64, 2, 3, 4];
    let expected = &value as *const [u64; 4] as AbiWord;
    for convention in [
        CallingConvention::C,
        CallingConvention::SysV,
        CallingConvention::Win64,
        CallingConvention::Aapcs,
        CallingConvention::Aarch64,
    ] {
        let out = marshal_with(convention, &[Arg::aggregate(&value)]).unwrap();
        assert_eq!(out.words(), &[expected], "{:?}", convention);
    }
}

#[test]
fn test_empty_aggregate_rejected() {
    let err = marshal(&[Arg::aggregate_bytes(&[])]).unwrap_err();
    assert_eq!(err, MarshalError::EmptyAggregate);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_win64_aggregate_rules() {
    let eight = [7u32, 9u32];
    let out = marshal_with(CallingConvention::Win64, &[Arg::aggregate(&eight)]).unwrap();
    let mut packed = [0u8; 8];
    packed[..4].copy_from_slice(&7u32.to_ne_bytes());
    packed[4..].copy_from_slice(&9u32.to_ne_bytes());
    assert_eq!(out.words(), &[usize::from_ne_bytes(packed)]);

    // not a power of two: by reference
    let three = [1u8, 2, 3];
    let out = marshal_with(CallingConvention::Win64, &[Arg::aggregate(&three)]).unwrap();
    assert_eq!(out.words(), &[three.as_ptr() as AbiWord]);

    let sixteen = [1u64, 2];
    let out = marshal_with(CallingConvention::Win64, &[Arg::aggregate(&sixteen)]).unwrap();
    assert_eq!(out.words(), &[sixteen.as_ptr() as AbiWord]);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_sysv_aggregate_packs_two_words() {
    let value = [1u32, 2, 3];
    let out = marshal_with(CallingConvention::SysV, &[Arg::aggregate(&value)]).unwrap();

    let mut lo = [0u8; 8];
    lo[..4].copy_from_slice(&1u32.to_ne_bytes());
    lo[4..].copy_from_slice(&2u32.to_ne_bytes());
    let mut hi = [0u8; 8];
    hi[..4].copy_from_slice(&3u32.to_ne_bytes());
    assert_eq!(
        out.words(),
        &[usize::from_ne_bytes(lo), usize::from_ne_bytes(hi)]
    );
}

#[test]
fn test_frame_bound() {
    let max: Vec<Arg<'_>> = (0..MAX_ARG_WORDS).map(Arg::usize).collect();
    assert_eq!(marshal(&max).unwrap().len(), MAX_ARG_WORDS);

    let over: Vec<Arg<'_>> = (0..=MAX_ARG_WORDS).map(Arg::usize).collect();
    assert_eq!(
        marshal(&over).unwrap_err(),
        MarshalError::FrameTooLarge { max: MAX_ARG_WORDS }
    );

    let raw: Vec<AbiWord> = (0..=MAX_ARG_WORDS).collect();
    assert!(MarshaledArgs::from_words(&raw).is_err());
}

#[test]
fn test_call_frame_receiver_first() {
    let heap = FakeHeap::new();
    let echo = heap.echo();
    let args = MarshaledArgs::from_words(&[5, 6]).unwrap();

    let frame = CallFrame::method(echo, &args);
    assert_eq!(frame.words(), &[echo.addr(), 5, 6]);
    assert_eq!(CallFrame::function(&args).words(), &[5, 6]);
    unsafe { invoke(echo, VTableSlot::RELEASE, &MarshaledArgs::empty()) };
}

#[test]
fn test_shape_checks() {
    assert!(check_shape(&[ArgKind::I32], &[Arg::from(3u16)]).is_ok());
    assert!(check_shape(&[ArgKind::Handle], &[Arg::null()]).is_ok());
    assert!(check_shape(&[ArgKind::Ptr], &[Arg::handle(NativeHandle::null())]).is_ok());

    assert_eq!(
        check_shape(&[ArgKind::I16], &[Arg::from(5i32)]),
        Err(MarshalError::Narrowing {
            index: 0,
            expected: ArgKind::I16,
            found: ArgKind::I32,
        })
    );
    assert_eq!(
        check_shape(&[ArgKind::U32, ArgKind::U32], &[Arg::from(1u32), Arg::from(-1i32)]),
        Err(MarshalError::KindMismatch {
            index: 1,
            expected: ArgKind::U32,
            found: ArgKind::I32,
        })
    );
    assert!(matches!(
        check_shape(&[ArgKind::U32], &[Arg::from(1.0f32)]),
        Err(MarshalError::KindMismatch { .. })
    ));
    assert!(check_kinds(&[ArgKind::OutPtr], [ArgKind::Handle]).is_err());
}

#[test]
fn test_spilled_words() {
    let five: Vec<Arg<'_>> = (0..5).map(Arg::usize).collect();
    // receiver plus five words against four registers
    assert_eq!(marshal_with(CallingConvention::Win64, &five).unwrap().spilled(), 2);
    assert_eq!(marshal_with(CallingConvention::SysV, &five).unwrap().spilled(), 0);
    assert_eq!(marshal_with(CallingConvention::C, &five).unwrap().spilled(), 6);
}

#[test]
fn test_register_allocator() {
    let mut regs = RegisterAllocator::new(CallingConvention::Win64);
    let placements: Vec<Placement> = (0..6).map(|_| regs.assign()).collect();
    assert_eq!(
        placements,
        vec![
            Placement::Register(0),
            Placement::Register(1),
            Placement::Register(2),
            Placement::Register(3),
            Placement::Stack(0),
            Placement::Stack(1),
        ]
    );
    assert_eq!(regs.stack_words(), 2);
}

#[test]
fn test_float_slots_by_convention() {
    let depth = [ArgKind::Handle, ArgKind::U32, ArgKind::F32, ArgKind::U8];
    assert_eq!(
        check_float_slots(CallingConvention::Win64, &depth),
        Err(MarshalError::FloatRegister {
            index: 2,
            kind: ArgKind::F32
        })
    );
    assert!(check_float_slots(CallingConvention::SysV, &depth).is_err());
    assert!(check_float_slots(CallingConvention::Aarch64, &depth).is_err());
    assert!(check_float_slots(CallingConvention::C, &depth).is_ok());

    // past the fourth Win64 position a float is a plain stack word
    let late = [ArgKind::U32, ArgKind::U32, ArgKind::U32, ArgKind::F64];
    assert!(check_float_slots(CallingConvention::Win64, &late).is_ok());
    assert!(check_float_slots(CallingConvention::SysV, &late).is_err());

    // pointers to floats are fine everywhere
    let clear = [ArgKind::Handle, ArgKind::Ptr];
    assert!(check_float_slots(CallingConvention::SysV, &clear).is_ok());
    assert!(check_float_slots(CallingConvention::Win64, &clear).is_ok());

    assert!(!CallingConvention::Win64.float_in_word(3));
    assert!(CallingConvention::Win64.float_in_word(4));
}

#[test]
fn test_slot_offsets() {
    assert_eq!(VTableSlot::RELEASE.byte_offset(), 2 * WORD_SIZE);
    assert_eq!(VTableSlot::new(110).to_string(), "#110");
}

#[cfg(target_os = "linux")]
#[test]
fn test_library_export_call() {
    let lib = Library::load("libc.so.6").unwrap();
    let strlen = lib.export("strlen").unwrap();
    let text = b"vtcall\0";
    let args = marshal(&[Arg::slice(text)]).unwrap();
    assert_eq!(unsafe { strlen.call(&args) }, 6);

    assert!(matches!(
        lib.export("no_such_symbol_here"),
        Err(SymbolError::NotFound { .. })
    ));
}

#[test]
fn test_library_load_failure() {
    assert!(matches!(
        Library::load("vtcall-missing-library.so"),
        Err(LoadError::LoadFailed { .. })
    ));
    assert_eq!(Library::load("bad\0name").unwrap_err(), LoadError::InvalidName);
}

proptest! {
    #[test]
    fn prop_f32_bits_roundtrip(bits in any::<u32>()) {
        let value = f32::from_bits(bits);
        prop_assert_eq!(word_to_f32(f32_to_word(value)).to_bits(), bits);
        let out = marshal(&[Arg::from(value)]).unwrap();
        prop_assert_eq!(out.words(), &[bits as AbiWord]);
    }

    #[test]
    fn prop_f64_bits_roundtrip(bits in any::<u64>()) {
        let value = f64::from_bits(bits);
        let words = f64_to_words(value);
        prop_assert_eq!(words_to_f64(&words).map(f64::to_bits), Some(bits));
        let out = marshal(&[Arg::from(value)]).unwrap();
        prop_assert_eq!(words_to_f64(out.words()).map(f64::to_bits), Some(bits));
    }

    #[test]
    fn prop_nan_payload_survives(payload in 1u32..(1 << 22)) {
        // quiet NaN with an arbitrary payload
        let bits = 0x7FC0_0000 | payload;
        let value = f32::from_bits(bits);
        prop_assert!(value.is_nan());
        prop_assert_eq!(word_to_f32(f32_to_word(value)).to_bits(), bits);
    }

    #[test]
    fn prop_aggregate_over_two_words_by_address(len in (2 * WORD_SIZE + 1)..256usize) {
        let bytes = vec![0xA5u8; len];
        for convention in [CallingConvention::SysV, CallingConvention::Win64, CallingConvention::Aarch64] {
            let out = marshal_with(convention, &[Arg::aggregate_bytes(&bytes)]).unwrap();
            prop_assert_eq!(out.words(), &[bytes.as_ptr() as AbiWord]);
        }
    }

    #[test]
    fn prop_echo_receives_words(a in any::<usize>(), b in any::<usize>(), c in any::<usize>()) {
        let heap = FakeHeap::new();
        let echo = heap.echo();
        let args = marshal(&[Arg::usize(a), Arg::usize(b), Arg::usize(c)]).unwrap();
        let result = unsafe { invoke(echo, VTableSlot::new(5), &args) };
        prop_assert_eq!(result, a.wrapping_add(b).wrapping_add(c));
        prop_assert_eq!(heap.calls()[0].words.clone(), vec![a, b, c]);
        unsafe { invoke(echo, VTableSlot::RELEASE, &MarshaledArgs::empty()) };
    }
}
