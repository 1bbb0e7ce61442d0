//! Building managed types from extension-provided specs.
//!
//! The builder walks the spec's ordered definition list exactly once,
//! resolving every pointer, name and descriptor before the class is
//! published. Failure at any step leaves no trace: a half-built type is
//! never reachable through a handle.

use std::collections::HashMap;

use crate::value::{
    type_flags, Accessor, ClassParts, ClassRef, CompareOp, Descriptor, FunctionKind,
    ManagedClass, ManagedValue, MemberKind, NativeFunction, NativeSpace,
};

use super::signature::Signature;
use super::slots::{member_kind_from_id, SlotKind};
use super::{BridgeContext, BridgeError, ErrorKind};

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub ptr: u64,
    pub sig: Signature,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MemberDef {
    pub name: String,
    pub kind: MemberKind,
    pub offset: usize,
    pub read_only: bool,
    pub doc: Option<String>,
}

impl MemberDef {
    /// Resolves a numeric field-type id, as it arrives from a C-side spec.
    pub fn from_type_id(
        name: impl Into<String>,
        type_id: u32,
        offset: usize,
        read_only: bool,
        doc: Option<String>,
    ) -> Result<Self, BridgeError> {
        let name = name.into();
        let kind = member_kind_from_id(type_id).ok_or_else(|| {
            BridgeError::new(
                ErrorKind::SystemError,
                format!("member '{name}' has unknown field type id {type_id}"),
            )
        })?;
        Ok(MemberDef { name, kind, offset, read_only, doc })
    }
}

#[derive(Debug, Clone)]
pub struct GetSetDef {
    pub name: String,
    pub getter: Option<u64>,
    pub setter: Option<u64>,
    pub doc: Option<String>,
    /// Opaque pointer forwarded unchanged to both accessors.
    pub closure: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotDef {
    pub kind: SlotKind,
    pub ptr: u64,
}

impl SlotDef {
    /// Resolves a numeric slot id, as it arrives from a C-side spec.
    pub fn from_id(id: u32, ptr: u64) -> Result<Self, BridgeError> {
        let kind = SlotKind::from_id(id).ok_or_else(|| {
            BridgeError::new(
                ErrorKind::SystemError,
                format!("unknown slot id {id}"),
            )
        })?;
        Ok(SlotDef { kind, ptr })
    }
}

/// One entry of the spec's ordered definition list.
#[derive(Debug, Clone)]
pub enum Definition {
    Method(MethodDef),
    Slot(SlotDef),
    Member(MemberDef),
    GetSet(GetSetDef),
}

/// Legacy definitions, only honored when the spec sets the legacy flag.
#[derive(Debug, Clone)]
pub enum LegacySlot {
    Methods(Vec<MethodDef>),
    Members(Vec<MemberDef>),
    GetSets(Vec<GetSetDef>),
    Slot(SlotDef),
}

#[derive(Debug, Clone, Default)]
pub struct TypeSpec {
    /// Optionally dotted: the module half lands in `__module__`.
    pub name: String,
    pub doc: Option<String>,
    pub basic_size: usize,
    pub item_size: usize,
    pub flags: u64,
    pub legacy: bool,
    pub defines: Vec<Definition>,
    pub legacy_slots: Vec<LegacySlot>,
}

/// Out-of-band spec parameters.
#[derive(Debug, Clone, Copy)]
pub enum SpecParam<'gc> {
    Base(ManagedValue<'gc>),
    /// Wins outright over any number of single-base params.
    BasesTuple(ManagedValue<'gc>),
    Metaclass(ManagedValue<'gc>),
}

fn split_dotted_name(name: &str) -> (Option<&str>, &str) {
    match name.rfind('.') {
        Some(dot) => (Some(&name[..dot]), &name[dot + 1..]),
        None => (None, name),
    }
}

fn expect_class<'gc>(
    value: &ManagedValue<'gc>,
    what: &str,
) -> Result<ClassRef<'gc>, BridgeError> {
    value.as_class().ok_or_else(|| {
        BridgeError::new(
            ErrorKind::TypeError,
            format!("{what} must be a type, got {}", value.type_name()),
        )
    })
}

struct Builder<'gc> {
    namespace: HashMap<String, ManagedValue<'gc>>,
    instance_destroy: Option<u64>,
    get_buffer: Option<u64>,
    release_buffer: Option<u64>,
    seen_new: bool,
    seen_traverse: bool,
    has_legacy_member: bool,
}

impl<'gc> Builder<'gc> {
    /// First write wins; later definitions for the same name are ignored.
    fn install(&mut self, name: &str, value: ManagedValue<'gc>) {
        if !self.namespace.contains_key(name) {
            self.namespace.insert(name.to_string(), value);
        }
    }

    fn check_name(&self, name: &str, what: &str) -> Result<(), BridgeError> {
        if name.is_empty() {
            return Err(BridgeError::new(
                ErrorKind::SystemError,
                format!("{what} definition is missing a name"),
            ));
        }
        Ok(())
    }

    fn add_method(
        &mut self,
        ctx: &BridgeContext<'gc>,
        def: &MethodDef,
    ) -> Result<(), BridgeError> {
        self.check_name(&def.name, "method")?;
        let callable = ctx.attach(def.ptr, def.sig)?;
        let func = ctx.new_function(NativeFunction {
            name: def.name.clone(),
            doc: def.doc.clone(),
            kind: FunctionKind::Native(callable),
        });
        self.install(&def.name, func);
        Ok(())
    }

    fn add_member(
        &mut self,
        ctx: &BridgeContext<'gc>,
        def: &MemberDef,
        legacy_origin: bool,
    ) -> Result<(), BridgeError> {
        self.check_name(&def.name, "member")?;
        if legacy_origin {
            self.has_legacy_member = true;
        }
        let getter = Some(Accessor::Member { kind: def.kind, offset: def.offset });
        // read-only members never get the setter half
        let setter = if def.read_only {
            None
        } else {
            Some(Accessor::Member { kind: def.kind, offset: def.offset })
        };
        let descriptor = ctx.new_descriptor(Descriptor {
            name: def.name.clone(),
            doc: def.doc.clone(),
            getter,
            setter,
        });
        self.install(&def.name, descriptor);
        Ok(())
    }

    fn add_getset(
        &mut self,
        ctx: &BridgeContext<'gc>,
        def: &GetSetDef,
    ) -> Result<(), BridgeError> {
        self.check_name(&def.name, "getset")?;
        if def.getter.is_none() && def.setter.is_none() {
            return Err(BridgeError::new(
                ErrorKind::SystemError,
                format!("getset '{}' defines neither accessor", def.name),
            ));
        }
        let getter = def
            .getter
            .map(|ptr| {
                ctx.attach(ptr, Signature::Getter)
                    .map(|callable| Accessor::Native { callable, closure: def.closure })
            })
            .transpose()?;
        let setter = def
            .setter
            .map(|ptr| {
                ctx.attach(ptr, Signature::Setter)
                    .map(|callable| Accessor::Native { callable, closure: def.closure })
            })
            .transpose()?;
        let descriptor = ctx.new_descriptor(Descriptor {
            name: def.name.clone(),
            doc: def.doc.clone(),
            getter,
            setter,
        });
        self.install(&def.name, descriptor);
        Ok(())
    }

    fn add_slot(&mut self, ctx: &BridgeContext<'gc>, def: &SlotDef) -> Result<(), BridgeError> {
        let callable = ctx.attach(def.ptr, def.kind.signature())?;
        match def.kind {
            SlotKind::Destroy => {
                // out of band: runs on storage release, not via lookup
                if self.instance_destroy.is_none() {
                    self.instance_destroy = Some(def.ptr);
                }
            }
            SlotKind::Traverse => {
                self.seen_traverse = true;
            }
            SlotKind::GetBuffer => {
                if self.get_buffer.is_none() {
                    self.get_buffer = Some(def.ptr);
                }
            }
            SlotKind::ReleaseBuffer => {
                if self.release_buffer.is_none() {
                    self.release_buffer = Some(def.ptr);
                }
            }
            SlotKind::RichCompare => {
                // one pointer, six wrappers, each forwarding its opcode
                for op in CompareOp::ALL {
                    let func = ctx.new_function(NativeFunction {
                        name: op.dunder_name().to_string(),
                        doc: None,
                        kind: FunctionKind::RichCompare { callable, op },
                    });
                    self.install(op.dunder_name(), func);
                }
            }
            SlotKind::New => {
                self.seen_new = true;
                let func = ctx.new_function(NativeFunction {
                    name: "__new__".to_string(),
                    doc: None,
                    kind: FunctionKind::Native(callable),
                });
                self.install("__new__", func);
            }
            _ => {
                for name in def.kind.dunder_names() {
                    let func = ctx.new_function(NativeFunction {
                        name: name.to_string(),
                        doc: None,
                        kind: FunctionKind::Native(callable),
                    });
                    self.install(name, func);
                }
            }
        }
        Ok(())
    }
}

/// Builds a type from a spec. See the module docs for the failure
/// atomicity guarantee.
pub fn create_type_from_spec<'gc>(
    ctx: &BridgeContext<'gc>,
    spec: &TypeSpec,
    params: &[SpecParam<'gc>],
) -> Result<ClassRef<'gc>, BridgeError> {
    if spec.name.is_empty() {
        return Err(BridgeError::new(
            ErrorKind::SystemError,
            "type spec is missing a name".to_string(),
        ));
    }
    let (module, short_name) = split_dotted_name(&spec.name);

    // bases: an explicit tuple wins outright over single-base params
    let mut single_bases: Vec<ClassRef<'gc>> = vec![];
    let mut tuple_bases: Option<Vec<ClassRef<'gc>>> = None;
    let mut metaclass: Option<ClassRef<'gc>> = None;
    for param in params {
        match param {
            SpecParam::Base(v) => single_bases.push(expect_class(v, "a base param")?),
            SpecParam::BasesTuple(v) => {
                let items = match v {
                    ManagedValue::Tuple(t) => t.iter().copied().collect::<Vec<_>>(),
                    other => {
                        return Err(BridgeError::new(
                            ErrorKind::TypeError,
                            format!("bases param must be a tuple, got {}", other.type_name()),
                        ))
                    }
                };
                let mut resolved = Vec::with_capacity(items.len());
                for item in &items {
                    resolved.push(expect_class(item, "a bases-tuple entry")?);
                }
                tuple_bases = Some(resolved);
            }
            SpecParam::Metaclass(v) => metaclass = Some(expect_class(v, "the metaclass param")?),
        }
    }
    let bases = tuple_bases.unwrap_or(single_bases);
    if bases.len() > 1 {
        return Err(BridgeError::new(
            ErrorKind::TypeError,
            format!("type '{}': multiple bases are not supported", spec.name),
        ));
    }
    let base = bases.first().copied();

    let mut builder = Builder {
        namespace: HashMap::new(),
        instance_destroy: None,
        get_buffer: None,
        release_buffer: None,
        seen_new: false,
        seen_traverse: false,
        has_legacy_member: false,
    };

    if let Some(doc) = &spec.doc {
        builder.install("__doc__", ctx.new_string(doc));
    }
    if let Some(module) = module {
        builder.install("__module__", ctx.new_string(module));
    }

    for def in &spec.defines {
        match def {
            Definition::Method(m) => builder.add_method(ctx, m)?,
            Definition::Slot(s) => builder.add_slot(ctx, s)?,
            Definition::Member(m) => builder.add_member(ctx, m, false)?,
            Definition::GetSet(g) => builder.add_getset(ctx, g)?,
        }
    }

    // legacy definitions are refused outright on a pure spec
    if !spec.legacy_slots.is_empty() && !spec.legacy {
        return Err(BridgeError::new(
            ErrorKind::TypeError,
            format!("type '{}': legacy slots require the legacy flag", spec.name),
        ));
    }
    for legacy in &spec.legacy_slots {
        match legacy {
            LegacySlot::Methods(methods) => {
                for m in methods {
                    builder.add_method(ctx, m)?;
                }
            }
            LegacySlot::Members(members) => {
                for m in members {
                    builder.add_member(ctx, m, true)?;
                }
            }
            LegacySlot::GetSets(getsets) => {
                for g in getsets {
                    builder.add_getset(ctx, g)?;
                }
            }
            LegacySlot::Slot(s) => builder.add_slot(ctx, s)?,
        }
    }

    if spec.flags & type_flags::HAVE_GC != 0 && !builder.seen_traverse {
        return Err(BridgeError::new(
            ErrorKind::ValueError,
            format!("type '{}': cyclic-GC flag requires a traverse slot", spec.name),
        ));
    }

    // synthesized constructor: allocate the storage block, then delegate
    if spec.basic_size > 0 && !builder.seen_new {
        let func = ctx.new_function(NativeFunction {
            name: "__new__".to_string(),
            doc: None,
            kind: FunctionKind::SyntheticNew,
        });
        builder.install("__new__", func);
    }

    let is_pure = !spec.legacy;
    let raw_layout = spec.legacy
        && (spec.basic_size > 0
            || builder.instance_destroy.is_some()
            || builder.has_legacy_member);
    if is_pure {
        if let Some(b) = base {
            if b.raw_layout {
                return Err(BridgeError::new(
                    ErrorKind::TypeError,
                    format!(
                        "pure type '{}' cannot inherit from '{}', which exposes its storage layout",
                        spec.name, b.name
                    ),
                ));
            }
        }
    }

    // type-level native storage, sized by the metaclass; its destructor is
    // the metaclass's out-of-band destroy function
    let type_space = match metaclass {
        Some(meta) if meta.basic_size > 0 => Some(NativeSpace::new(
            meta.basic_size,
            meta.instance_destroy,
            ctx.next_storage_id(),
        )),
        _ => None,
    };

    // publication: nothing above this point is reachable on failure
    let class = ManagedClass::define(
        ctx.gc,
        ClassParts {
            name: short_name.to_string(),
            module: module.map(str::to_string),
            base,
            namespace: builder.namespace,
            basic_size: spec.basic_size,
            item_size: spec.item_size,
            flags: spec.flags,
            is_pure,
            raw_layout,
            instance_destroy: builder.instance_destroy,
            get_buffer: builder.get_buffer,
            release_buffer: builder.release_buffer,
            native_space: type_space,
        },
    );

    Ok(class)
}
