use super::*;
use crate::fake::{Echo, FakeHeap, Violation, SPAWN_CHILD, SPAWN_NONE, SPAWN_STRAY};
use crate::interop::{ArgKind, MarshalError, NativeHandle, VTableSlot};
use crate::outcome::{FactoryOutcome, ResultCode};
use crate::DispatchError;
use proptest::prelude::*;

crate::com_interface! {
    Derived("IVtcallDerived", 0x0b9e42f1_77c3_4d05_8e21_6a4c9d1f3e57): Echo {
        Extra(U32, Handle),
    }
}

fn slot<I: Interface>(method: &str) -> usize {
    ComPtr::<I>::slot_of(method).unwrap().index()
}

#[test]
fn test_unknown_slots() {
    assert_eq!(slot::<Unknown>("QueryInterface"), 0);
    assert_eq!(slot::<Unknown>("AddRef"), 1);
    assert_eq!(slot::<Unknown>("Release"), 2);
    assert_eq!(slot::<Dispatch>("GetIDsOfNames"), 5);
    assert_eq!(slot::<Dispatch>("Invoke"), 6);
    assert_eq!(slot::<Blob>("GetBufferPointer"), 3);
    assert_eq!(slot::<Blob>("GetBufferSize"), 4);
}

#[test]
fn test_device_context_slots() {
    assert_eq!(slot::<D3D11DeviceContext>("Draw"), 13);
    assert_eq!(slot::<D3D11DeviceContext>("OMSetRenderTargets"), 33);
    assert_eq!(slot::<D3D11DeviceContext>("RSSetViewports"), 44);
    assert_eq!(slot::<D3D11DeviceContext>("ClearRenderTargetView"), 50);
    assert_eq!(slot::<D3D11DeviceContext>("ClearState"), 110);
    assert_eq!(slot::<D3D11DeviceContext>("Flush"), 111);
}

#[test]
fn test_device_and_swap_chain_slots() {
    assert_eq!(slot::<D3D11Device>("CreateBuffer"), 3);
    assert_eq!(slot::<D3D11Device>("CreateRenderTargetView"), 9);
    assert_eq!(slot::<D3D11Device>("CreateInputLayout"), 11);
    assert_eq!(slot::<D3D11Device>("CreateVertexShader"), 12);
    assert_eq!(slot::<D3D11Device>("CreatePixelShader"), 15);
    assert_eq!(slot::<DxgiSwapChain>("Present"), 8);
    assert_eq!(slot::<DxgiSwapChain>("GetBuffer"), 9);
}

#[test]
fn test_tables_extend_their_base() {
    assert!(D3D11DeviceContext::methods().extends(D3D11DeviceChild::methods()));
    assert!(D3D11Texture2D::methods().extends(D3D11Resource::methods()));
    assert!(DxgiSwapChain::methods().extends(DxgiObject::methods()));
    assert!(!Dispatch::methods().extends(Blob::methods()));

    let table = Derived::methods();
    assert!(table.extends(Echo::methods()));
    let extra = table.lookup("Extra").unwrap();
    assert_eq!(extra.slot, VTableSlot::new(8));
    assert_eq!(extra.shape, &[ArgKind::U32, ArgKind::Handle]);
    assert_eq!(table.entry(VTableSlot::new(3)).map(|e| e.name), Some("Echo1"));
    assert_eq!(table.len(), 9);
}

#[test]
fn test_unknown_method_and_arity() {
    let heap = FakeHeap::new();
    let echo = heap.adopt::<Echo>(heap.echo()).unwrap();

    assert!(matches!(
        echo.call("Echo4", &[]),
        Err(DispatchError::NoSuchMethod { interface: "IVtcallEcho", .. })
    ));
    assert!(matches!(
        echo.call("Echo2", &[Arg::usize(1)]),
        Err(DispatchError::ArgCount {
            expected: 2,
            found: 1,
            ..
        })
    ));
    assert!(matches!(
        echo.call("Echo1", &[Arg::from(1.0f32)]),
        Err(DispatchError::Marshal {
            source: MarshalError::KindMismatch { .. },
            ..
        })
    ));
    // nothing reached the object
    assert!(heap.calls().is_empty());
    assert_eq!(echo.call("Echo3", &[Arg::usize(1), Arg::usize(2), Arg::usize(3)]).unwrap(), 6);
}

#[test]
fn test_null_handle_lifecycle() {
    unsafe {
        assert_eq!(acquire(NativeHandle::null()), 0);
        assert_eq!(release(NativeHandle::null()), 0);
        assert_eq!(
            query_raw(NativeHandle::null(), &Unknown::IID),
            FactoryOutcome::Failure(ResultCode::E_POINTER)
        );
        assert!(ComPtr::<Unknown>::from_raw(NativeHandle::null()).is_none());
        assert!(ComPtr::<Unknown>::from_borrowed(NativeHandle::null()).is_none());
    }
}

#[test]
fn test_clone_and_drop_balance() {
    let heap = FakeHeap::new();
    let handle = heap.echo();
    let echo = heap.adopt::<Echo>(handle).unwrap();
    assert_eq!(heap.refcount(handle), 1);

    let second = echo.clone();
    assert_eq!(heap.refcount(handle), 2);
    assert_eq!(second, echo);
    drop(second);
    assert_eq!(heap.refcount(handle), 1);

    let raw = echo.into_raw();
    assert_eq!(heap.refcount(handle), 1);
    let echo = unsafe { ComPtr::<Echo>::from_raw(raw) }.unwrap();
    drop(echo);
    assert!(!heap.is_live(handle));
    assert!(heap.violations().is_empty());
}

#[test]
fn test_end_to_end_dependency_order() {
    let heap = FakeHeap::new();
    let a = heap.echo();
    let b = heap.child_of(a);
    let (a_id, b_id) = (heap.id(a).unwrap(), heap.id(b).unwrap());
    assert_eq!(heap.refcount(a), 1);

    unsafe {
        assert_eq!(release(b), 0);
        assert_eq!(release(a), 0);
    }
    assert_eq!(heap.refcount(a), 0);
    assert_eq!(heap.refcount(b), 0);
    assert_eq!(heap.destroyed(), vec![b_id, a_id]);
    assert!(heap.violations().is_empty());
}

#[test]
fn test_wrong_order_is_flagged() {
    let heap = FakeHeap::new();
    let a = heap.echo();
    let b = heap.child_of(a);

    unsafe {
        release(a);
        release(b);
    }
    assert_eq!(
        heap.violations(),
        vec![Violation::ReleasedBeforeDependent {
            released: heap.id(a).unwrap(),
            dependent: heap.id(b).unwrap(),
        }]
    );
}

#[test]
fn test_over_release_and_use_after_release_are_recorded() {
    let heap = FakeHeap::new();
    let h = heap.echo();
    let id = heap.id(h).unwrap();
    unsafe {
        release(h);
        release(h);
        acquire(h);
    }
    assert_eq!(
        heap.violations(),
        vec![
            Violation::OverRelease { object: id },
            Violation::UseAfterRelease { object: id, slot: 1 },
        ]
    );
}

#[test]
fn test_release_stack_reverse_order() {
    let heap = FakeHeap::new();
    let parent = heap.echo();
    let child = heap.child_of(parent);
    let grandchild = heap.child_of(child);

    let mut stack = ReleaseStack::new();
    let p = stack.push(heap.adopt::<Echo>(parent).unwrap());
    let c = stack.push(heap.adopt::<Echo>(child).unwrap());
    stack.push(heap.adopt::<Echo>(grandchild).unwrap());
    assert_eq!(stack.len(), 3);
    assert_eq!(
        stack.handles().collect::<Vec<_>>(),
        vec![parent, child, grandchild]
    );
    assert_eq!(stack.get(c).map(ComPtr::as_handle), Some(child));
    assert_eq!(stack.call(p.erase(), "Echo1", &[Arg::usize(11)]).unwrap(), 11);

    drop(stack);
    let ids: Vec<_> = [grandchild, child, parent]
        .iter()
        .map(|h| heap.id(*h).unwrap())
        .collect();
    assert_eq!(heap.destroyed(), ids);
    assert!(heap.violations().is_empty());
}

#[test]
fn test_release_stack_stale_slot() {
    let heap = FakeHeap::new();
    let mut stack = ReleaseStack::new();
    let s = stack.push(heap.adopt::<Echo>(heap.echo()).unwrap());
    assert!(stack.pop());
    assert!(!stack.pop());
    assert!(stack.get(s).is_none());
    assert_eq!(
        stack.call(s.erase(), "Echo1", &[Arg::usize(1)]),
        Err(DispatchError::StaleSlot {
            interface: "IVtcallEcho",
            index: 0
        })
    );

    // a later push reuses the index but not the slot
    let b = heap.echo();
    let t = stack.push(heap.adopt::<Echo>(b).unwrap());
    assert_eq!(t.index(), s.index());
    assert_ne!(t, s);
    assert!(stack.get(s).is_none());
    assert!(stack.handle(s.erase()).is_none());
    assert!(matches!(
        stack.call(s.erase(), "Echo1", &[Arg::usize(1)]),
        Err(DispatchError::StaleSlot { index: 0, .. })
    ));
    assert_eq!(stack.get(t).map(|p| p.as_handle()), Some(b));
    assert_eq!(stack.call(t.erase(), "Echo1", &[Arg::usize(5)]).unwrap(), 5);
    assert_eq!(heap.calls().len(), 1);
}

#[test]
fn test_lifecycle_methods_not_callable_by_name() {
    let heap = FakeHeap::new();
    let handle = heap.echo();
    let echo = heap.adopt::<Echo>(handle).unwrap();

    for method in ["AddRef", "Release"] {
        assert!(matches!(
            echo.call(method, &[]),
            Err(DispatchError::LifecycleSlot { interface: "IVtcallEcho", .. })
        ));
        assert!(matches!(
            echo.call_hr(method, &[]),
            Err(DispatchError::LifecycleSlot { .. })
        ));
    }
    assert_eq!(heap.refcount(handle), 1);

    let mut stack = ReleaseStack::new();
    let s = stack.push(echo);
    assert!(matches!(
        stack.call(s.erase(), "Release", &[]),
        Err(DispatchError::LifecycleSlot { .. })
    ));
    assert_eq!(stack.call(s.erase(), "Echo1", &[Arg::usize(2)]).unwrap(), 2);

    // the slots themselves still resolve
    assert_eq!(slot::<Echo>("Release"), 2);
    assert!(Echo::methods().callable("QueryInterface").is_ok());

    drop(stack);
    assert!(heap.violations().is_empty());
    assert_eq!(heap.live_count(), 0);
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[test]
fn test_register_float_shapes_rejected_before_the_call() {
    let heap = FakeHeap::new();
    // SAFETY: the call below is refused before reaching the vtable; only the
    // lifecycle slots, which every fake has, are ever invoked
    let context = unsafe { ComPtr::<D3D11DeviceContext>::from_raw(heap.echo()) }.unwrap();

    let err = context
        .call("SetResourceMinLOD", &[Arg::null(), Arg::from(1.0f32)])
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Marshal {
            method: "SetResourceMinLOD",
            source: MarshalError::FloatRegister {
                index: 1,
                kind: ArgKind::F32
            },
            ..
        }
    ));
    assert!(heap.calls().is_empty());

    drop(context);
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn test_query_and_supports() {
    let heap = FakeHeap::new();
    let handle = heap.echo();
    let echo = heap.adopt::<Echo>(handle).unwrap();

    assert!(echo.supports::<Unknown>());
    assert!(echo.supports::<Echo>());
    assert!(!echo.supports::<Dispatch>());
    // probes leave no reference behind
    assert_eq!(heap.refcount(handle), 1);

    match echo.query::<Dispatch>() {
        FactoryOutcome::Failure(code) => assert_eq!(code, ResultCode::E_NOINTERFACE),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let unknown = echo.cast::<Unknown>().unwrap();
    assert_eq!(unknown.as_handle(), handle);
    assert_eq!(heap.refcount(handle), 2);
    let again = echo.to_unknown();
    assert_eq!(heap.refcount(handle), 3);
    drop((unknown, again));
    assert_eq!(heap.refcount(handle), 1);

    assert!(matches!(
        echo.cast::<Blob>(),
        Err(DispatchError::Foreign { code, .. }) if code == ResultCode::E_NOINTERFACE
    ));
}

#[test]
fn test_factory_outcomes() {
    let heap = FakeHeap::new();
    let echo = heap.adopt::<Echo>(heap.echo()).unwrap();
    let spawn = |code: i32, mode: u32| unsafe {
        echo.create::<Echo>("Spawn", &[Arg::from(code), Arg::from(mode)])
            .unwrap()
    };

    let child = spawn(0, SPAWN_CHILD);
    assert!(child.is_success());
    assert_eq!(child.code(), ResultCode::S_OK);
    let child = child.object().unwrap();
    assert_eq!(heap.refcount(child.as_handle()), 1);

    let info = spawn(1, SPAWN_CHILD);
    assert!(matches!(info, FactoryOutcome::Success(_, ResultCode::S_FALSE)));

    let partial = spawn(0, SPAWN_NONE);
    assert_eq!(partial.code(), ResultCode::S_OK);
    assert!(partial.is_partial());
    assert!(matches!(
        partial.into_result("IVtcallEcho", "Spawn"),
        Err(DispatchError::NoObject { .. })
    ));

    let failed = spawn(ResultCode::E_FAIL.0, SPAWN_CHILD);
    assert_eq!(failed, FactoryOutcome::Failure(ResultCode::E_FAIL));

    // a handle written next to a failure code is not adopted
    let live_before = heap.live_count();
    let stray = spawn(ResultCode::E_FAIL.0, SPAWN_STRAY);
    assert!(stray.is_failure());
    assert_eq!(heap.live_count(), live_before + 1);

    drop(info);
    drop(child);
}

#[test]
fn test_call_hr_maps_failures() {
    let heap = FakeHeap::new();
    let echo = heap.adopt::<Echo>(heap.echo()).unwrap();
    let mut out = crate::interop::OutHandle::new();

    let ok = echo.call_hr(
        "Spawn",
        &[Arg::from(1i32), Arg::from(SPAWN_NONE), Arg::out(&mut out)],
    );
    assert_eq!(ok.unwrap(), ResultCode::S_FALSE);

    let err = echo
        .call_hr(
            "Spawn",
            &[
                Arg::from(ResultCode::E_ACCESSDENIED.0),
                Arg::from(SPAWN_NONE),
                Arg::out(&mut out),
            ],
        )
        .unwrap_err();
    assert_eq!(err.code(), Some(ResultCode::E_ACCESSDENIED));
    assert!(out.get().is_null());
}

#[test]
fn test_create_iid_passes_interface_id() {
    let heap = FakeHeap::new();
    let dispatch = heap.adopt::<Dispatch>(heap.dispatch(&[])).unwrap();
    let unknown = dispatch.to_unknown();
    let again = unknown
        .create_iid::<Dispatch>("QueryInterface", &[])
        .unwrap()
        .into_result("IUnknown", "QueryInterface")
        .unwrap();
    assert_eq!(again, dispatch);
}

proptest! {
    #[test]
    fn prop_refcount_balance(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
        let heap = FakeHeap::new();
        let handle = heap.echo();
        let root = heap.adopt::<Echo>(handle).unwrap();
        let mut held = Vec::new();

        for clone in ops {
            if clone || held.is_empty() {
                held.push(root.clone());
            } else {
                held.pop();
            }
            prop_assert_eq!(heap.refcount(handle) as usize, held.len() + 1);
        }
        drop(held);
        prop_assert_eq!(heap.refcount(handle), 1);

        let unbalanced = (0..4).map(|_| unsafe { acquire(handle) }).last();
        prop_assert_eq!(unbalanced, Some(5));
        for _ in 0..4 {
            unsafe { release(handle) };
        }
        prop_assert_eq!(heap.refcount(handle), 1);
        drop(root);
        prop_assert!(heap.violations().is_empty());
    }
}

#[test]
fn test_late_bound_method_call() {
    let heap = FakeHeap::new();
    let handle = heap.dispatch(&[("Add", 7), ("Caption", 8)]);
    let object = heap.adopt::<Dispatch>(handle).unwrap();

    assert_eq!(object.id_of_name("add").unwrap(), 7);
    let result = object
        .invoke_method("Add", vec![Variant::i4(2), Variant::i4(40)])
        .unwrap();
    assert_eq!(result.as_i4(), Some(42));

    let invocations = heap.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].dispid, 7);
    assert_eq!(invocations[0].flags, DISPATCH_METHOD);
    // passed last to first
    let received: Vec<_> = invocations[0].args.iter().map(|a| a.i4).collect();
    assert_eq!(received, vec![Some(40), Some(2)]);
}

#[test]
fn test_late_bound_property_put() {
    let heap = FakeHeap::new();
    let object = heap
        .adopt::<Dispatch>(heap.dispatch(&[("Caption", 8)]))
        .unwrap();

    object
        .put_property("Caption", Variant::string("hello").unwrap())
        .unwrap();
    let invocations = heap.invocations();
    let put = &invocations[0];
    assert_eq!(put.flags, DISPATCH_PROPERTYPUT);
    assert_eq!(put.named, vec![DISPID_PROPERTYPUT]);
    assert_eq!(put.args[0].var_type, vt::BSTR);
    assert_eq!(put.args[0].text.as_deref(), Some("hello"));

    let value = object.get_property("Caption").unwrap();
    assert_eq!(value.as_i4(), Some(0));
}

#[test]
fn test_late_bound_errors() {
    let heap = FakeHeap::new();
    let object = heap.adopt::<Dispatch>(heap.dispatch(&[("Add", 7)])).unwrap();

    let err = object.invoke_method("Subtract", vec![]).unwrap_err();
    assert_eq!(err.code(), Some(ResultCode::DISP_E_UNKNOWNNAME));

    let err = object
        .invoke_id(99, DISPATCH_METHOD, vec![], &mut [])
        .unwrap_err();
    assert_eq!(err.code(), Some(ResultCode::DISP_E_MEMBERNOTFOUND));

    assert!(matches!(
        object.id_of_name("bad\0name"),
        Err(DispatchError::InteriorNul { position: 3 })
    ));
}

#[test]
fn test_bstr() {
    let s = Bstr::new("héllo").unwrap();
    assert_eq!(s.len(), 5);
    assert_eq!(s.to_string_lossy(), "héllo");
    assert_eq!(s.to_string(), "héllo");
    assert_eq!(s, Bstr::from_wide(&"héllo".encode_utf16().collect::<Vec<_>>()).unwrap());

    let empty = Bstr::new("").unwrap();
    assert!(empty.is_empty());
    assert!(empty.as_wide().is_empty());

    let raw = s.into_raw();
    // SAFETY: terminated like every BSTR
    assert_eq!(unsafe { *raw.add(5) }, 0);
    let back = unsafe { Bstr::from_raw(raw) }.unwrap();
    assert_eq!(back.to_string_lossy(), "héllo");
    assert!(unsafe { Bstr::from_raw(core::ptr::null_mut()) }.is_none());
}

#[test]
fn test_wide_c_string() {
    let wide = WideCString::new("abc").unwrap();
    assert_eq!(wide.len(), 3);
    assert_eq!(wide.as_wide(), &[97, 98, 99]);
    assert!(matches!(
        WideCString::new("a\0b"),
        Err(DispatchError::InteriorNul { position: 1 })
    ));
}

#[test]
fn test_variants() {
    assert!(Variant::empty().is_empty());
    assert_eq!(Variant::from(7).as_i4(), Some(7));
    assert_eq!(Variant::from(2.5).as_r8(), Some(2.5));
    assert_eq!(Variant::from(true).as_bool(), Some(true));
    assert_eq!(Variant::boolean(false).as_bool(), Some(false));
    assert_eq!(Variant::from(7).as_r8(), None);

    let text = Variant::string("vtcall").unwrap();
    assert_eq!(text.var_type(), vt::BSTR);
    assert_eq!(text.as_string().as_deref(), Some("vtcall"));
    // reading does not consume
    assert_eq!(text.as_string().as_deref(), Some("vtcall"));
}

#[test]
fn test_object_variant_owns_a_reference() {
    let heap = FakeHeap::new();
    let handle = heap.dispatch(&[]);
    let object = heap.adopt::<Dispatch>(handle).unwrap();

    let variant = Variant::dispatch(object.clone());
    assert_eq!(heap.refcount(handle), 2);
    let view = variant.as_dispatch().unwrap();
    assert_eq!(heap.refcount(handle), 3);
    drop(view);

    let taken = variant.into_dispatch().unwrap();
    assert_eq!(heap.refcount(handle), 2);
    drop(taken);

    let variant = Variant::unknown(object.to_unknown());
    assert_eq!(variant.var_type(), vt::UNKNOWN);
    drop(variant);
    assert_eq!(heap.refcount(handle), 1);
}

#[cfg(not(windows))]
#[test]
fn test_activation_without_runtime() {
    assert!(matches!(
        clsid_from_prog_id("Shell.Application"),
        Err(DispatchError::Load(_))
    ));
    assert!(matches!(
        create_instance::<Dispatch>(&Guid::zeroed()),
        Err(DispatchError::Load(_))
    ));
    assert!(matches!(
        Apartment::initialize(ApartmentKind::Sta),
        Err(DispatchError::Load(_))
    ));
    assert!(Hstring::empty().as_raw().is_null());
}
