use std::cell::RefCell;
use std::collections::HashMap;

use gc_arena::{Collect, Gc, Mutation};

use super::{ClassRef, ManagedValue, NativeSpace};

/// Type flags understood by the builder. The bridge defines its own
/// numbering; extension headers mirror these constants.
pub mod type_flags {
    /// Instances participate in cyclic collection; requires a traverse slot.
    pub const HAVE_GC: u64 = 1 << 14;
    /// The type may be used as a base.
    pub const BASETYPE: u64 = 1 << 10;
}

/// Everything needed to define a class, collected before publication.
pub struct ClassParts<'gc> {
    pub name: String,
    pub module: Option<String>,
    pub base: Option<ClassRef<'gc>>,
    pub namespace: HashMap<String, ManagedValue<'gc>>,
    pub basic_size: usize,
    pub item_size: usize,
    pub flags: u64,
    pub is_pure: bool,
    pub raw_layout: bool,
    pub instance_destroy: Option<u64>,
    pub get_buffer: Option<u64>,
    pub release_buffer: Option<u64>,
    pub native_space: Option<NativeSpace>,
}

impl<'gc> ClassParts<'gc> {
    pub fn new(name: impl Into<String>) -> Self {
        ClassParts {
            name: name.into(),
            module: None,
            base: None,
            namespace: HashMap::new(),
            basic_size: 0,
            item_size: 0,
            flags: 0,
            is_pure: true,
            raw_layout: false,
            instance_destroy: None,
            get_buffer: None,
            release_buffer: None,
            native_space: None,
        }
    }
}

/// A type produced by the spec builder (or declared normally through
/// [`ManagedClass::define`]).
///
/// The attribute dict is frozen at publication; a handle to the class is
/// never visible to native code until the builder has finished every
/// step. Only the type-level storage block stays mutable, because it is
/// released on request and its release must run the registered destroy
/// function.
#[derive(Collect, Debug)]
#[collect(no_drop)]
pub struct ManagedClass<'gc> {
    pub name: String,
    pub module: Option<String>,
    pub basic_size: usize,
    pub item_size: usize,
    pub flags: u64,
    /// Built without the legacy flag; pure types may not inherit from a
    /// base that exposes its raw storage layout.
    pub is_pure: bool,
    /// Set when the type hands natives direct access to its storage layout
    /// (nonzero basic size under legacy, legacy members, or an out-of-band
    /// destructor).
    pub raw_layout: bool,
    pub base: Option<ClassRef<'gc>>,
    pub attributes: HashMap<String, ManagedValue<'gc>>,
    /// Out-of-band destructor for instance storage blocks. Not an
    /// attribute: it runs when storage is released, never via lookup.
    #[collect(require_static)]
    pub instance_destroy: Option<u64>,
    /// Buffer protocol pointers, recorded for the host runtime to consume.
    #[collect(require_static)]
    pub get_buffer: Option<u64>,
    #[collect(require_static)]
    pub release_buffer: Option<u64>,
    /// Storage block owned by the type itself (metaclass basic size).
    /// Holds no GC pointers, so interior mutability here needs no write
    /// barrier.
    #[collect(require_static)]
    pub native_space: RefCell<Option<NativeSpace>>,
}

impl<'gc> ManagedClass<'gc> {
    /// The single construction path for classes. The spec builder goes
    /// through here too, with the parts it computed.
    pub fn define(mc: &Mutation<'gc>, parts: ClassParts<'gc>) -> ClassRef<'gc> {
        Gc::new(
            mc,
            ManagedClass {
                name: parts.name,
                module: parts.module,
                basic_size: parts.basic_size,
                item_size: parts.item_size,
                flags: parts.flags,
                is_pure: parts.is_pure,
                raw_layout: parts.raw_layout,
                base: parts.base,
                attributes: parts.namespace,
                instance_destroy: parts.instance_destroy,
                get_buffer: parts.get_buffer,
                release_buffer: parts.release_buffer,
                native_space: RefCell::new(parts.native_space),
            },
        )
    }

    /// Walks the class and its bases for a named attribute.
    pub fn lookup(&self, name: &str) -> Option<ManagedValue<'gc>> {
        if let Some(v) = self.attributes.get(name) {
            return Some(*v);
        }
        let mut base = self.base;
        while let Some(b) = base {
            if let Some(v) = b.attributes.get(name) {
                return Some(*v);
            }
            base = b.base;
        }
        None
    }

    /// Nearest explicit constructor in the base chain, if any.
    pub fn inherited_constructor(&self) -> Option<ManagedValue<'gc>> {
        let mut base = self.base;
        while let Some(b) = base {
            if let Some(v) = b.attributes.get("__new__") {
                return Some(*v);
            }
            base = b.base;
        }
        None
    }
}
