use std::ffi::c_char;
use std::sync::atomic::{AtomicUsize, Ordering};

use extbridge::bridge::abi::WireContext;
use extbridge::bridge::typespec::{
    Definition, GetSetDef, LegacySlot, MemberDef, MethodDef, SlotDef, SpecParam, TypeSpec,
};
use extbridge::bridge::signature::Signature;
use extbridge::value::{type_flags, ManagedValue};
use extbridge::{BackendKind, Bridge, BridgeContext, BridgeMode, ErrorKind};

fn with_bridge(f: impl for<'gc> Fn(BridgeContext<'gc>)) {
    let mut bridge = Bridge::new(BackendKind::Reflective, BridgeMode::Universal);
    bridge.enter(&f);
}

fn method(name: &str, ptr: u64, sig: Signature) -> Definition {
    Definition::Method(MethodDef {
        name: name.to_string(),
        ptr,
        sig,
        doc: None,
    })
}

fn slot(id: u32, ptr: u64) -> Definition {
    Definition::Slot(SlotDef::from_id(id, ptr).unwrap())
}

// ---- native fixtures ----

extern "C" fn fx_seven(ctx: *mut WireContext, _self: u64) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.box_int())(ctx, 7)
    }
}

extern "C" fn fx_one(ctx: *mut WireContext, _self: u64) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.box_int())(ctx, 1)
    }
}

extern "C" fn fx_two(ctx: *mut WireContext, _self: u64) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.box_int())(ctx, 2)
    }
}

extern "C" fn fx_compare_echo(ctx: *mut WireContext, _a: u64, _b: u64, op: i32) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.box_int())(ctx, op)
    }
}

extern "C" fn fx_getter_closure(ctx: *mut WireContext, _self: u64, closure: u64) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.box_int())(ctx, closure as i32)
    }
}

static SETTER_SEEN: AtomicUsize = AtomicUsize::new(0);

extern "C" fn fx_setter_store(ctx: *mut WireContext, _self: u64, value: u64, closure: u64) -> i32 {
    unsafe {
        let c = &*ctx;
        let v = (c.unbox_int())(ctx, value);
        SETTER_SEEN.store((v as usize) * 1000 + closure as usize, Ordering::SeqCst);
    }
    0
}

extern "C" fn fx_init_mark(
    ctx: *mut WireContext,
    self_h: u64,
    _argv: *const u64,
    _nargs: u64,
    _kw: u64,
) -> i32 {
    unsafe {
        let c = &*ctx;
        let value = (c.box_int())(ctx, 1);
        (c.attr_set())(ctx, self_h, b"ready\0".as_ptr() as *const c_char, value)
    }
}

extern "C" fn fx_new_echo_class(
    ctx: *mut WireContext,
    cls: u64,
    _argv: *const u64,
    _nargs: u64,
    _kw: u64,
) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.dup())(ctx, cls)
    }
}

extern "C" fn fx_traverse_stub(_ctx: u64, _self: u64, _visit: u64, _arg: u64) -> i32 {
    0
}

static META_DESTROYS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn fx_meta_destroy(_data: *mut std::ffi::c_void) {
    META_DESTROYS.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn fx_instance_destroy(_data: *mut std::ffi::c_void) {}

// ---- tests ----

#[test]
fn dotted_names_split_into_module_and_name() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "pkg.mod.Widget".to_string(),
            doc: Some("a widget".to_string()),
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        assert_eq!(class.name, "Widget");
        assert_eq!(class.module.as_deref(), Some("pkg.mod"));

        let target = ManagedValue::Class(class);
        assert_eq!(ctx.get_attr(target, "__module__").unwrap().as_str(), Some("pkg.mod"));
        assert_eq!(ctx.get_attr(target, "__doc__").unwrap().as_str(), Some("a widget"));
    });
}

#[test]
fn an_empty_name_is_refused() {
    with_bridge(|ctx| {
        let err = ctx.create_type_from_spec(&TypeSpec::default(), &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SystemError);
    });
}

#[test]
fn methods_are_callable_on_instances() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Lucky".to_string(),
            defines: vec![method("seven", fx_seven as usize as u64, Signature::NoArgs)],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();
        let baseline = ctx.live_handles();
        let r = ctx.call_method(obj, "seven", &[]).unwrap();
        assert_eq!(r, ManagedValue::Int32(7));
        assert_eq!(ctx.live_handles(), baseline);
    });
}

#[test]
fn the_first_definition_of_a_name_wins() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Pick".to_string(),
            defines: vec![
                method("pick", fx_one as usize as u64, Signature::NoArgs),
                method("pick", fx_two as usize as u64, Signature::NoArgs),
            ],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();
        assert_eq!(ctx.call_method(obj, "pick", &[]).unwrap(), ManagedValue::Int32(1));
    });
}

#[test]
fn members_read_and_write_instance_storage() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Point".to_string(),
            basic_size: 16,
            defines: vec![
                Definition::Member(MemberDef::from_type_id("x", 1, 0, false, None).unwrap()),
                Definition::Member(MemberDef::from_type_id("y", 3, 8, false, None).unwrap()),
                Definition::Member(MemberDef::from_type_id("tag", 1, 4, true, None).unwrap()),
            ],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        // the synthesized constructor allocated a zeroed storage block
        let p = ctx.construct(class, &[]).unwrap();
        assert_eq!(ctx.get_attr(p, "x").unwrap(), ManagedValue::Int32(0));
        assert_eq!(ctx.get_attr(p, "y").unwrap(), ManagedValue::Float64(0.0));

        ctx.set_attr(p, "x", ManagedValue::Int32(123)).unwrap();
        ctx.set_attr(p, "y", ManagedValue::Float64(-2.5)).unwrap();
        assert_eq!(ctx.get_attr(p, "x").unwrap(), ManagedValue::Int32(123));
        assert_eq!(ctx.get_attr(p, "y").unwrap(), ManagedValue::Float64(-2.5));

        let err = ctx.set_attr(p, "tag", ManagedValue::Int32(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AttributeError);
        assert_eq!(ctx.get_attr(p, "tag").unwrap(), ManagedValue::Int32(0));
    });
}

#[test]
fn member_writes_reject_mismatched_values() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Strict".to_string(),
            basic_size: 8,
            defines: vec![
                Definition::Member(MemberDef::from_type_id("n", 10, 0, false, None).unwrap()),
            ],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();
        let err = ctx.set_attr(obj, "n", ctx.new_string("nope")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    });
}

#[test]
fn unknown_member_type_ids_are_refused() {
    let err = MemberDef::from_type_id("bad", 4, 0, false, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SystemError);
}

#[test]
fn unknown_slot_ids_are_refused() {
    let err = SlotDef::from_id(9999, fx_seven as usize as u64).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SystemError);
}

#[test]
fn getsets_forward_their_closure() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Closed".to_string(),
            defines: vec![Definition::GetSet(GetSetDef {
                name: "knob".to_string(),
                getter: Some(fx_getter_closure as usize as u64),
                setter: Some(fx_setter_store as usize as u64),
                doc: None,
                closure: 77,
            })],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();

        assert_eq!(ctx.get_attr(obj, "knob").unwrap(), ManagedValue::Int32(77));

        ctx.set_attr(obj, "knob", ManagedValue::Int32(5)).unwrap();
        assert_eq!(SETTER_SEEN.load(Ordering::SeqCst), 5077);
    });
}

#[test]
fn a_getset_with_no_accessors_is_refused() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Empty".to_string(),
            defines: vec![Definition::GetSet(GetSetDef {
                name: "void".to_string(),
                getter: None,
                setter: None,
                doc: None,
                closure: 0,
            })],
            ..Default::default()
        };
        let err = ctx.create_type_from_spec(&spec, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SystemError);
    });
}

#[test]
fn a_write_only_getset_rejects_reads() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Sink".to_string(),
            defines: vec![Definition::GetSet(GetSetDef {
                name: "drain".to_string(),
                getter: None,
                setter: Some(fx_setter_store as usize as u64),
                doc: None,
                closure: 0,
            })],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();
        let err = ctx.get_attr(obj, "drain").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AttributeError);
    });
}

#[test]
fn rich_compare_fans_out_to_six_wrappers() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Cmp".to_string(),
            defines: vec![slot(68, fx_compare_echo as usize as u64)],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let a = ctx.construct(class, &[]).unwrap();
        let b = ctx.construct(class, &[]).unwrap();

        let expected = [
            ("__lt__", 0),
            ("__le__", 1),
            ("__eq__", 2),
            ("__ne__", 3),
            ("__gt__", 4),
            ("__ge__", 5),
        ];
        for (name, code) in expected {
            assert_eq!(ctx.call_method(a, name, &[b]).unwrap(), ManagedValue::Int32(code));
        }
    });
}

#[test]
fn init_slots_run_during_construction() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Marked".to_string(),
            defines: vec![slot(60, fx_init_mark as usize as u64)],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();
        assert_eq!(ctx.get_attr(obj, "ready").unwrap(), ManagedValue::Int32(1));
    });
}

#[test]
fn an_explicit_new_slot_replaces_the_synthesized_one() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Echo".to_string(),
            basic_size: 32,
            defines: vec![slot(65, fx_new_echo_class as usize as u64)],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        // the fixture constructor returns the class it was handed
        let r = ctx.construct(class, &[]).unwrap();
        assert_eq!(r, ManagedValue::Class(class));
    });
}

#[test]
fn legacy_slots_require_the_legacy_flag() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Old".to_string(),
            legacy: false,
            legacy_slots: vec![LegacySlot::Methods(vec![MethodDef {
                name: "seven".to_string(),
                ptr: fx_seven as usize as u64,
                sig: Signature::NoArgs,
                doc: None,
            }])],
            ..Default::default()
        };
        let err = ctx.create_type_from_spec(&spec, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    });
}

#[test]
fn legacy_definitions_work_under_the_flag() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Old".to_string(),
            legacy: true,
            legacy_slots: vec![LegacySlot::Methods(vec![MethodDef {
                name: "seven".to_string(),
                ptr: fx_seven as usize as u64,
                sig: Signature::NoArgs,
                doc: None,
            }])],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();
        assert_eq!(ctx.call_method(obj, "seven", &[]).unwrap(), ManagedValue::Int32(7));
    });
}

#[test]
fn cyclic_gc_types_must_declare_a_traverse_slot() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Cyclic".to_string(),
            flags: type_flags::HAVE_GC,
            ..Default::default()
        };
        let err = ctx.create_type_from_spec(&spec, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);

        let spec = TypeSpec {
            name: "Cyclic".to_string(),
            flags: type_flags::HAVE_GC,
            defines: vec![slot(71, fx_traverse_stub as usize as u64)],
            ..Default::default()
        };
        ctx.create_type_from_spec(&spec, &[]).unwrap();
    });
}

#[test]
fn an_explicit_bases_tuple_wins_over_base_params() {
    with_bridge(|ctx| {
        let a = ctx
            .create_type_from_spec(&TypeSpec { name: "A".to_string(), ..Default::default() }, &[])
            .unwrap();
        let b = ctx
            .create_type_from_spec(&TypeSpec { name: "B".to_string(), ..Default::default() }, &[])
            .unwrap();

        let bases = ctx.new_tuple(vec![ManagedValue::Class(b)]);
        let child = ctx
            .create_type_from_spec(
                &TypeSpec { name: "Child".to_string(), ..Default::default() },
                &[
                    SpecParam::Base(ManagedValue::Class(a)),
                    SpecParam::BasesTuple(bases),
                ],
            )
            .unwrap();
        assert_eq!(child.base.unwrap().name, "B");
    });
}

#[test]
fn multiple_bases_are_refused() {
    with_bridge(|ctx| {
        let a = ctx
            .create_type_from_spec(&TypeSpec { name: "A".to_string(), ..Default::default() }, &[])
            .unwrap();
        let b = ctx
            .create_type_from_spec(&TypeSpec { name: "B".to_string(), ..Default::default() }, &[])
            .unwrap();
        let bases = ctx.new_tuple(vec![ManagedValue::Class(a), ManagedValue::Class(b)]);
        let err = ctx
            .create_type_from_spec(
                &TypeSpec { name: "Child".to_string(), ..Default::default() },
                &[SpecParam::BasesTuple(bases)],
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    });
}

#[test]
fn methods_are_inherited_through_the_base_chain() {
    with_bridge(|ctx| {
        let base = ctx
            .create_type_from_spec(
                &TypeSpec {
                    name: "Base".to_string(),
                    defines: vec![method("seven", fx_seven as usize as u64, Signature::NoArgs)],
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        let child = ctx
            .create_type_from_spec(
                &TypeSpec { name: "Child".to_string(), ..Default::default() },
                &[SpecParam::Base(ManagedValue::Class(base))],
            )
            .unwrap();
        let obj = ctx.construct(child, &[]).unwrap();
        assert_eq!(ctx.call_method(obj, "seven", &[]).unwrap(), ManagedValue::Int32(7));
    });
}

#[test]
fn pure_types_cannot_extend_a_raw_layout_base() {
    with_bridge(|ctx| {
        let raw_base = ctx
            .create_type_from_spec(
                &TypeSpec {
                    name: "RawBase".to_string(),
                    legacy: true,
                    basic_size: 24,
                    defines: vec![slot(1000, fx_instance_destroy as usize as u64)],
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        assert!(raw_base.raw_layout);

        let err = ctx
            .create_type_from_spec(
                &TypeSpec { name: "Pure".to_string(), ..Default::default() },
                &[SpecParam::Base(ManagedValue::Class(raw_base))],
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);

        // a legacy subtype is allowed to extend it
        ctx.create_type_from_spec(
            &TypeSpec { name: "AlsoRaw".to_string(), legacy: true, ..Default::default() },
            &[SpecParam::Base(ManagedValue::Class(raw_base))],
        )
        .unwrap();
    });
}

#[test]
fn metaclass_storage_runs_its_destroy_function_once() {
    with_bridge(|ctx| {
        let meta = ctx
            .create_type_from_spec(
                &TypeSpec {
                    name: "Meta".to_string(),
                    legacy: true,
                    basic_size: 48,
                    defines: vec![slot(1000, fx_meta_destroy as usize as u64)],
                    ..Default::default()
                },
                &[],
            )
            .unwrap();

        let class = ctx
            .create_type_from_spec(
                &TypeSpec { name: "Shaped".to_string(), ..Default::default() },
                &[SpecParam::Metaclass(ManagedValue::Class(meta))],
            )
            .unwrap();
        assert!(class.native_space.borrow().is_some());

        let before = META_DESTROYS.load(Ordering::SeqCst);
        ctx.release_type_storage(class).unwrap();
        assert_eq!(META_DESTROYS.load(Ordering::SeqCst), before + 1);
        assert!(class.native_space.borrow().is_none());

        // releasing again is a no-op
        ctx.release_type_storage(class).unwrap();
        assert_eq!(META_DESTROYS.load(Ordering::SeqCst), before + 1);
    });
}

#[test]
fn the_synthesized_constructor_allocates_the_declared_block() {
    with_bridge(|ctx| {
        let base = ctx
            .create_type_from_spec(
                &TypeSpec { name: "Sized".to_string(), basic_size: 32, ..Default::default() },
                &[],
            )
            .unwrap();
        let child = ctx
            .create_type_from_spec(
                &TypeSpec { name: "Bigger".to_string(), basic_size: 64, ..Default::default() },
                &[SpecParam::Base(ManagedValue::Class(base))],
            )
            .unwrap();

        let obj = ctx.construct(child, &[]).unwrap();
        let block = obj
            .as_object()
            .unwrap()
            .with(|o| o.native_space.as_ref().map(|s| (s.len(), s.read_bytes(0, 64).map(<[u8]>::to_vec))));
        let (len, bytes) = block.unwrap();
        assert_eq!(len, 64);
        assert_eq!(bytes.unwrap(), vec![0u8; 64]);
    });
}

extern "C" fn fx_self_echo(ctx: *mut WireContext, self_h: u64) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.dup())(ctx, self_h)
    }
}

#[test]
fn end_to_end_method_and_member_round_trip() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Cell".to_string(),
            basic_size: 16,
            defines: vec![
                method("echo", fx_self_echo as usize as u64, Signature::Unary),
                Definition::Member(MemberDef::from_type_id("n", 1, 8, false, None).unwrap()),
            ],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();

        let baseline = ctx.live_handles();
        let echoed = ctx.call_method(obj, "echo", &[]).unwrap();
        assert_eq!(echoed, obj);

        ctx.set_attr(obj, "n", ManagedValue::Int32(41)).unwrap();
        assert_eq!(ctx.get_attr(obj, "n").unwrap(), ManagedValue::Int32(41));
        assert_eq!(ctx.live_handles(), baseline);
    });
}

extern "C" fn fx_boot(ctx: *mut WireContext) -> u64 {
    unsafe {
        let c = &*ctx;
        (c.box_int())(ctx, 1)
    }
}

#[test]
fn calling_a_zero_arity_method_with_a_receiver_is_a_type_error() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Boot".to_string(),
            defines: vec![method("boot", fx_boot as usize as u64, Signature::ModuleInit)],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();
        let err = ctx.call_method(obj, "boot", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert!(err.message.contains("takes 0 arguments"));
    });
}

static ASSIGN_SEEN: AtomicUsize = AtomicUsize::new(0);
static SUBSCRIPT_SEEN: AtomicUsize = AtomicUsize::new(0);

extern "C" fn fx_assign_item(ctx: *mut WireContext, _self: u64, idx: u64, value: u64) -> i32 {
    unsafe {
        let c = &*ctx;
        let v = (c.unbox_int())(ctx, value);
        ASSIGN_SEEN.store((idx as usize) * 100 + v as usize, Ordering::SeqCst);
    }
    0
}

extern "C" fn fx_assign_subscript(
    _ctx: *mut WireContext,
    _self: u64,
    _key: u64,
    _value: u64,
) -> i32 {
    SUBSCRIPT_SEEN.store(1, Ordering::SeqCst);
    0
}

#[test]
fn assignment_slot_fans_out_and_the_first_write_wins() {
    with_bridge(|ctx| {
        // slot 23 (sequence assign) fills both item dunders; the later
        // slot 3 maps onto the same names and must be ignored
        let spec = TypeSpec {
            name: "Seq".to_string(),
            defines: vec![
                slot(23, fx_assign_item as usize as u64),
                slot(3, fx_assign_subscript as usize as u64),
            ],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();
        let obj = ctx.construct(class, &[]).unwrap();

        ctx.call_method(obj, "__setitem__", &[ManagedValue::Int64(4), ManagedValue::Int32(7)])
            .unwrap();
        assert_eq!(ASSIGN_SEEN.load(Ordering::SeqCst), 407);

        ctx.call_method(obj, "__delitem__", &[ManagedValue::Int64(2), ManagedValue::Int32(1)])
            .unwrap();
        assert_eq!(ASSIGN_SEEN.load(Ordering::SeqCst), 201);
        assert_eq!(SUBSCRIPT_SEEN.load(Ordering::SeqCst), 0);
    });
}

#[test]
fn doc_strings_are_readable_on_methods_and_members() {
    with_bridge(|ctx| {
        let spec = TypeSpec {
            name: "Doc".to_string(),
            basic_size: 16,
            defines: vec![
                Definition::Method(MethodDef {
                    name: "described".to_string(),
                    ptr: fx_seven as usize as u64,
                    sig: Signature::NoArgs,
                    doc: Some("returns seven".to_string()),
                }),
                method("bare", fx_one as usize as u64, Signature::NoArgs),
                Definition::Member(
                    MemberDef::from_type_id("n", 1, 0, false, Some("the n field".to_string()))
                        .unwrap(),
                ),
            ],
            ..Default::default()
        };
        let class = ctx.create_type_from_spec(&spec, &[]).unwrap();

        let m = ctx.get_attr(ManagedValue::Class(class), "described").unwrap();
        let doc = ctx.get_attr(m, "__doc__").unwrap();
        assert_eq!(doc.as_str(), Some("returns seven"));

        let bare = ctx.get_attr(ManagedValue::Class(class), "bare").unwrap();
        assert_eq!(ctx.get_attr(bare, "__doc__").unwrap(), ManagedValue::Null);

        let member = ctx.get_attr(ManagedValue::Class(class), "n").unwrap();
        let doc = ctx.get_attr(member, "__doc__").unwrap();
        assert_eq!(doc.as_str(), Some("the n field"));
    });
}
