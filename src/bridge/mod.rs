//! The bridge: one arena-rooted instance of the whole machinery.
//!
//! A [`Bridge`] owns the managed heap, the handle table, the trampoline
//! dispatcher, the pending-exception slot and (in debug mode) the capsule
//! table. All of it is per-instance state; two bridges in one process
//! never share a registry. Work happens inside [`Bridge::enter`], which
//! hands out a [`BridgeContext`] scoped to one arena mutation.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use gc_arena::{Arena, Collect, Collection, DynamicRootSet, Gc, Mutation, Rootable};

use crate::value::{
    ClassRef, Descriptor, FunctionKind, FunctionRef, ManagedValue, MemberError, NativeCallable,
    NativeFunction, NativeSpace, ObjectRef, StorageId,
};

#[macro_use]
mod macros;

pub mod abi;
pub mod args;
pub mod boxing;
pub mod debug;
pub mod handles;
pub mod library;
pub mod signature;
pub mod slots;
pub mod tracer;
pub mod trampoline;
pub mod typespec;

use abi::{AbiTable, WireContext};
use boxing::{Wire, WIRE_NULL};
use debug::DebugHandles;
use handles::{HandleKind, HandleTable};
use library::{ExtensionError, ExtensionLibraries};
use signature::{ReturnKind, Signature};
use tracer::Tracer;
use trampoline::{BackendKind, Dispatcher, RawReturn, WireWord};
use typespec::{SpecParam, TypeSpec};

pub type GCHandle<'gc> = &'gc Mutation<'gc>;

/// Error taxonomy. Everything a native can trigger lands in the pending
/// slot as one of these; host-side callers get them as `Err` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    ValueError,
    AttributeError,
    KeyError,
    RuntimeError,
    MemoryError,
    /// Misuse of the bridge itself: bad specs, arity mismatches,
    /// re-attachment with a different signature.
    SystemError,
    /// A closed or fabricated handle, detected by the generation check or
    /// (always) by the debug wrapper.
    StaleHandle,
}

impl ErrorKind {
    /// Numeric codes used by the `err_set` ABI entry point.
    pub fn from_code(code: i32) -> ErrorKind {
        match code {
            1 => ErrorKind::TypeError,
            2 => ErrorKind::ValueError,
            3 => ErrorKind::AttributeError,
            4 => ErrorKind::KeyError,
            6 => ErrorKind::MemoryError,
            7 => ErrorKind::SystemError,
            8 => ErrorKind::StaleHandle,
            _ => ErrorKind::RuntimeError,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ErrorKind::TypeError => 1,
            ErrorKind::ValueError => 2,
            ErrorKind::AttributeError => 3,
            ErrorKind::KeyError => 4,
            ErrorKind::RuntimeError => 5,
            ErrorKind::MemoryError => 6,
            ErrorKind::SystemError => 7,
            ErrorKind::StaleHandle => 8,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: String) -> Self {
        BridgeError { kind, message }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<ExtensionError> for BridgeError {
    fn from(e: ExtensionError) -> Self {
        BridgeError::new(ErrorKind::SystemError, e.to_string())
    }
}

impl From<MemberError> for BridgeError {
    fn from(e: MemberError) -> Self {
        let kind = match e {
            MemberError::OutOfBounds { .. } => ErrorKind::SystemError,
            MemberError::TypeMismatch { .. } => ErrorKind::TypeError,
        };
        BridgeError::new(kind, e.to_string())
    }
}

/// Universal mode trusts natives with raw wires; debug mode swaps in the
/// capsule-wrapped handle table and dispatcher wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    Universal,
    Debug,
}

pub struct BridgeRoot<'gc> {
    roots: DynamicRootSet<'gc>,
    handles: RefCell<HandleTable>,
    pending: RefCell<Option<BridgeError>>,
    dispatcher: Dispatcher,
    debug: Option<RefCell<DebugHandles>>,
    abi: AbiTable,
    tracer: Tracer,
    extensions: RefCell<ExtensionLibraries>,
    storage_ids: Cell<u64>,
}

// Everything reachable from GC values lives behind `roots`; the rest of
// the bridge state is untraced plumbing.
unsafe impl<'gc> Collect for BridgeRoot<'gc> {
    fn trace(&self, cc: &Collection) {
        self.roots.trace(cc);
    }
}

impl<'gc> BridgeRoot<'gc> {
    fn new(
        mc: &Mutation<'gc>,
        backend: BackendKind,
        mode: BridgeMode,
        extension_root: PathBuf,
    ) -> Self {
        BridgeRoot {
            roots: DynamicRootSet::new(mc),
            handles: RefCell::new(HandleTable::new()),
            pending: RefCell::new(None),
            dispatcher: Dispatcher::new(backend),
            debug: match mode {
                BridgeMode::Universal => None,
                BridgeMode::Debug => Some(RefCell::new(DebugHandles::new())),
            },
            abi: AbiTable::new(),
            tracer: Tracer::from_env(),
            extensions: RefCell::new(ExtensionLibraries::new(extension_root)),
            storage_ids: Cell::new(1),
        }
    }
}

pub type BridgeArena = Arena<Rootable!['gc => BridgeRoot<'gc>]>;

pub struct Bridge {
    arena: BridgeArena,
}

impl Bridge {
    pub fn new(backend: BackendKind, mode: BridgeMode) -> Self {
        Self::with_extension_root(backend, mode, ".")
    }

    pub fn with_extension_root(
        backend: BackendKind,
        mode: BridgeMode,
        extension_root: impl Into<PathBuf>,
    ) -> Self {
        let extension_root = extension_root.into();
        Bridge {
            arena: BridgeArena::new(|mc| BridgeRoot::new(mc, backend, mode, extension_root)),
        }
    }

    /// Runs one unit of work against the bridge. Managed values cannot
    /// escape the closure; wires (plain `u64`s) can.
    pub fn enter<R>(&mut self, f: impl for<'gc> FnOnce(BridgeContext<'gc>) -> R) -> R {
        self.arena.mutate(|gc, root| f(BridgeContext { gc, root }))
    }

    pub fn collect(&mut self) {
        self.arena.collect_all();
    }

    /// Drops every remaining handle, globals and fields included, and
    /// runs the registered destroy functions of surviving storage blocks.
    pub fn teardown(&mut self) {
        self.arena.mutate(|_, root| {
            root.handles.borrow_mut().release_all();
            root.tracer.flush();
        });
        self.arena.collect_all();
    }
}

/// Decoded result of one trampoline invocation, still undisposed: callers
/// are expected to run the matching sentinel check.
#[derive(Debug)]
pub enum InvokeResult<'gc> {
    Object(ManagedValue<'gc>),
    Ssize(i64),
    Status(i32),
    Void,
}

/// Everything a unit of bridge work needs: the mutation handle and the
/// bridge root. `Copy`, and cheap to pass around by value.
#[derive(Clone, Copy)]
pub struct BridgeContext<'gc> {
    pub gc: GCHandle<'gc>,
    root: &'gc BridgeRoot<'gc>,
}

impl<'gc> BridgeContext<'gc> {
    pub fn tracer(&self) -> &Tracer {
        &self.root.tracer
    }

    pub fn tracer_enabled(&self) -> bool {
        self.root.tracer.is_enabled()
    }

    pub(crate) fn next_storage_id(&self) -> StorageId {
        let id = self.root.storage_ids.get();
        self.root.storage_ids.set(id + 1);
        StorageId(id)
    }

    // ----- value constructors -----

    pub fn new_string(&self, s: &str) -> ManagedValue<'gc> {
        ManagedValue::Str(Gc::new(self.gc, s.to_string()))
    }

    pub fn new_tuple(&self, items: Vec<ManagedValue<'gc>>) -> ManagedValue<'gc> {
        ManagedValue::Tuple(Gc::new(self.gc, items))
    }

    pub fn new_object(&self, class: ClassRef<'gc>) -> ManagedValue<'gc> {
        ManagedValue::Object(ObjectRef::new(self.gc, class))
    }

    pub(crate) fn new_function(&self, f: NativeFunction) -> ManagedValue<'gc> {
        ManagedValue::Function(Gc::new(self.gc, f))
    }

    pub(crate) fn new_descriptor(&self, d: Descriptor) -> ManagedValue<'gc> {
        ManagedValue::Descriptor(Gc::new(self.gc, d))
    }

    // ----- handles -----

    /// Opens a per-call handle (or boxes the value). This is what `invoke`
    /// uses for every handle argument.
    pub fn allocate(&self, value: ManagedValue<'gc>) -> u64 {
        self.wire_for_native(value)
    }

    /// Opens a handle exempt from recycling; explicit closes are ignored.
    pub fn create_global(&self, value: ManagedValue<'gc>) -> u64 {
        self.wire_out(self.table_or_box(value, HandleKind::Global))
    }

    /// Opens a handle owned by a native-storage block; it is released when
    /// the block is, not by an explicit close.
    pub fn create_field(&self, value: ManagedValue<'gc>, owner: StorageId) -> u64 {
        self.wire_out(self.table_or_box(value, HandleKind::Field(owner)))
    }

    pub fn dereference(&self, wire: u64) -> Result<ManagedValue<'gc>, BridgeError> {
        self.from_wire(wire)
    }

    pub fn close(&self, wire: u64) -> Result<(), BridgeError> {
        self.close_wire(wire)
    }

    /// Open table entries, all allocation classes. Boxed wires never count.
    pub fn live_handles(&self) -> usize {
        self.root.handles.borrow().live()
    }

    fn table_or_box(&self, value: ManagedValue<'gc>, kind: HandleKind) -> u64 {
        match value {
            ManagedValue::Null => WIRE_NULL,
            ManagedValue::Int32(i) => boxing::box_int(i),
            ManagedValue::Float64(d) => boxing::box_double(d),
            other => {
                self.root
                    .handles
                    .borrow_mut()
                    .allocate(self.gc, self.root.roots, other, kind)
            }
        }
    }

    /// Boxes or opens a per-call handle, then applies the mode's outbound
    /// wrapping. Infallible by design: every managed value has a wire form.
    pub(crate) fn wire_for_native(&self, value: ManagedValue<'gc>) -> u64 {
        self.wire_out(self.table_or_box(value, HandleKind::PerCall))
    }

    /// Outbound: wraps in a capsule in debug mode.
    fn wire_out(&self, wire: u64) -> u64 {
        match &self.root.debug {
            Some(debug) => debug.borrow_mut().wrap(wire),
            None => wire,
        }
    }

    /// Inbound: unwraps the capsule in debug mode, then decodes.
    pub(crate) fn from_wire(&self, bits: u64) -> Result<ManagedValue<'gc>, BridgeError> {
        let bits = match &self.root.debug {
            Some(debug) => debug.borrow().unwrap(bits)?,
            None => bits,
        };
        match boxing::classify(bits) {
            Wire::Null => Ok(ManagedValue::Null),
            Wire::Int(i) => Ok(ManagedValue::Int32(i)),
            Wire::Double(d) => Ok(ManagedValue::Float64(d)),
            Wire::Handle { .. } => self.root.handles.borrow().dereference(self.root.roots, bits),
        }
    }

    pub(crate) fn close_wire(&self, bits: u64) -> Result<(), BridgeError> {
        let bits = match &self.root.debug {
            Some(debug) => debug.borrow_mut().close(bits)?,
            None => bits,
        };
        self.root.handles.borrow_mut().close(bits)
    }

    // ----- pending exception -----

    pub fn raise(&self, kind: ErrorKind, message: impl Into<String>) {
        self.set_pending(BridgeError::new(kind, message.into()));
    }

    pub(crate) fn set_pending(&self, err: BridgeError) {
        bridge_trace!(self, "pending <- {err}");
        *self.root.pending.borrow_mut() = Some(err);
    }

    /// Peek without clearing; this is what the `err_occurred` ABI entry
    /// point reports.
    pub fn error_occurred(&self) -> bool {
        self.root.pending.borrow().is_some()
    }

    /// The sentinel check: takes and clears the pending exception.
    pub fn take_error(&self) -> Option<BridgeError> {
        self.root.pending.borrow_mut().take()
    }

    // ----- trampoline -----

    /// Attaches a signature to a pointer, once. Returns the immutable
    /// pairing used for every later call.
    pub fn attach(&self, ptr: u64, sig: Signature) -> Result<NativeCallable, BridgeError> {
        self.root.dispatcher.attach(ptr, sig)?;
        Ok(NativeCallable { ptr, sig })
    }

    /// Marshals, calls through the backend, decodes by logical return
    /// kind, and closes everything `convert` opened. Errors from the
    /// native side travel exclusively through the pending slot; the
    /// caller runs the sentinel check that fits the signature.
    pub fn invoke(
        &self,
        callable: NativeCallable,
        call_args: &[ManagedValue<'gc>],
    ) -> Result<InvokeResult<'gc>, BridgeError> {
        bridge_trace!(self, "invoke {:?} at {:#x}", callable.sig, callable.ptr);
        let converted = args::convert(self, callable.sig, call_args)?;

        let wire_ctx = WireContext::new(&self.root.abi, self as *const Self as *mut ());
        let mut words: Vec<WireWord> =
            Vec::with_capacity(callable.sig.shape().word_count());
        if callable.sig.takes_context() {
            words.push(WireWord::Word(&wire_ctx as *const WireContext as u64));
        }
        words.extend(converted.wire_words());

        let raw = self
            .root
            .dispatcher
            .call(callable.ptr, callable.sig.shape(), &words);

        // close the argument handles even when decoding fails, so the
        // convert/close pairing holds on the error path too
        let result = self.decode_return(callable.sig.return_kind(), raw);
        args::close(self, converted)?;
        result
    }

    fn decode_return(
        &self,
        kind: ReturnKind,
        raw: RawReturn,
    ) -> Result<InvokeResult<'gc>, BridgeError> {
        match (kind, raw) {
            (ReturnKind::Object, RawReturn::Word(wire)) => {
                let value = self.from_wire(wire)?;
                // ownership of the returned handle transfers to the host
                self.close_wire(wire)?;
                Ok(InvokeResult::Object(value))
            }
            (ReturnKind::Ssize, RawReturn::Word(w)) => Ok(InvokeResult::Ssize(w as i64)),
            (ReturnKind::Status, RawReturn::Int(s)) => Ok(InvokeResult::Status(s)),
            (ReturnKind::Void, RawReturn::Void) => Ok(InvokeResult::Void),
            (kind, raw) => Err(BridgeError::new(
                ErrorKind::SystemError,
                format!("return kind {kind:?} does not fit raw return {raw:?}"),
            )),
        }
    }

    // ----- sentinel checks -----

    /// Null plus pending means failure; bare null is a protocol breach.
    pub fn check_object(&self, value: ManagedValue<'gc>) -> Result<ManagedValue<'gc>, BridgeError> {
        if !value.is_null() {
            return Ok(value);
        }
        Err(self.take_error().unwrap_or_else(|| {
            BridgeError::new(
                ErrorKind::SystemError,
                "native returned null without setting an error".to_string(),
            )
        }))
    }

    pub fn check_status(&self, status: i32) -> Result<(), BridgeError> {
        if status == 0 {
            return Ok(());
        }
        Err(self.take_error().unwrap_or_else(|| {
            BridgeError::new(
                ErrorKind::SystemError,
                format!("native returned status {status} without setting an error"),
            )
        }))
    }

    pub fn check_ssize(&self, value: i64) -> Result<i64, BridgeError> {
        if value == -1 {
            if let Some(err) = self.take_error() {
                return Err(err);
            }
        }
        Ok(value)
    }

    /// Invoke plus the matching sentinel check in one step.
    pub fn call(
        &self,
        callable: NativeCallable,
        call_args: &[ManagedValue<'gc>],
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        match self.invoke(callable, call_args)? {
            InvokeResult::Object(v) => self.check_object(v),
            InvokeResult::Ssize(n) => Ok(ManagedValue::Int64(self.check_ssize(n)?)),
            InvokeResult::Status(s) => {
                self.check_status(s)?;
                Ok(ManagedValue::Null)
            }
            InvokeResult::Void => Ok(ManagedValue::Null),
        }
    }

    // ----- attribute protocol -----

    pub fn get_attr(
        &self,
        target: ManagedValue<'gc>,
        name: &str,
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        if let ManagedValue::Class(c) = target {
            return c.lookup(name).ok_or_else(|| self.no_attribute(&c.name, name));
        }
        // doc strings ride on the callables and descriptors themselves
        if name == "__doc__" {
            match target {
                ManagedValue::Function(f) => return Ok(self.doc_string(f.doc.as_deref())),
                ManagedValue::Descriptor(d) => return Ok(self.doc_string(d.doc.as_deref())),
                _ => {}
            }
        }
        if let ManagedValue::Object(obj) = target {
            if let Some(v) = obj.with(|o| o.attributes.get(name).copied()) {
                return Ok(v);
            }
        }
        let class = self.class_of(&target)?;
        match class.lookup(name) {
            Some(ManagedValue::Descriptor(d)) => self.descriptor_get(&d, target),
            Some(v) => Ok(v),
            None => Err(self.no_attribute(&class.name, name)),
        }
    }

    pub fn set_attr(
        &self,
        target: ManagedValue<'gc>,
        name: &str,
        value: ManagedValue<'gc>,
    ) -> Result<(), BridgeError> {
        let class = self.class_of(&target)?;
        if let Some(ManagedValue::Descriptor(d)) = class.lookup(name) {
            return self.descriptor_set(&d, target, value);
        }
        match target {
            ManagedValue::Object(obj) => {
                obj.with_mut(self.gc, |o| {
                    o.attributes.insert(name.to_string(), value);
                });
                Ok(())
            }
            other => Err(BridgeError::new(
                ErrorKind::TypeError,
                format!("cannot set attribute '{name}' on {}", other.type_name()),
            )),
        }
    }

    fn doc_string(&self, doc: Option<&str>) -> ManagedValue<'gc> {
        match doc {
            Some(d) => self.new_string(d),
            None => ManagedValue::Null,
        }
    }

    fn no_attribute(&self, type_name: &str, attr: &str) -> BridgeError {
        BridgeError::new(
            ErrorKind::AttributeError,
            format!("'{type_name}' has no attribute '{attr}'"),
        )
    }

    fn class_of(&self, value: &ManagedValue<'gc>) -> Result<ClassRef<'gc>, BridgeError> {
        match value {
            ManagedValue::Object(obj) => Ok(obj.class()),
            other => Err(BridgeError::new(
                ErrorKind::TypeError,
                format!("{} has no attribute protocol", other.type_name()),
            )),
        }
    }

    fn descriptor_get(
        &self,
        descriptor: &Descriptor,
        target: ManagedValue<'gc>,
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        match descriptor.getter {
            None => Err(BridgeError::new(
                ErrorKind::AttributeError,
                format!("attribute '{}' is not readable", descriptor.name),
            )),
            Some(crate::value::Accessor::Member { kind, offset }) => {
                let obj = self.expect_storage_object(&target, &descriptor.name)?;
                obj.with(|o| match &o.native_space {
                    Some(space) => Ok(kind.read(space, offset)?),
                    None => Err(self.missing_storage(&descriptor.name)),
                })
            }
            Some(crate::value::Accessor::Native { callable, closure }) => {
                let result = self.call(
                    callable,
                    &[target, ManagedValue::Int64(closure as i64)],
                )?;
                Ok(result)
            }
        }
    }

    fn descriptor_set(
        &self,
        descriptor: &Descriptor,
        target: ManagedValue<'gc>,
        value: ManagedValue<'gc>,
    ) -> Result<(), BridgeError> {
        match descriptor.setter {
            None => Err(BridgeError::new(
                ErrorKind::AttributeError,
                format!("attribute '{}' is read-only", descriptor.name),
            )),
            Some(crate::value::Accessor::Member { kind, offset }) => {
                let obj = self.expect_storage_object(&target, &descriptor.name)?;
                obj.with_mut(self.gc, |o| match &mut o.native_space {
                    Some(space) => Ok(kind.write(space, offset, &value)?),
                    None => Err(self.missing_storage(&descriptor.name)),
                })
            }
            Some(crate::value::Accessor::Native { callable, closure }) => {
                self.call(
                    callable,
                    &[target, value, ManagedValue::Int64(closure as i64)],
                )?;
                Ok(())
            }
        }
    }

    fn expect_storage_object(
        &self,
        value: &ManagedValue<'gc>,
        attr: &str,
    ) -> Result<ObjectRef<'gc>, BridgeError> {
        value.as_object().ok_or_else(|| {
            BridgeError::new(
                ErrorKind::TypeError,
                format!("attribute '{attr}' requires an instance, got {}", value.type_name()),
            )
        })
    }

    fn missing_storage(&self, attr: &str) -> BridgeError {
        BridgeError::new(
            ErrorKind::SystemError,
            format!("attribute '{attr}' needs a native-storage block, but none is attached"),
        )
    }

    // ----- calling managed-visible functions -----

    /// Calls a bound method: looks `name` up on the target's class and
    /// shapes the argument list the way the method's signature expects.
    pub fn call_method(
        &self,
        target: ManagedValue<'gc>,
        name: &str,
        method_args: &[ManagedValue<'gc>],
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        let f = match self.get_attr(target, name)? {
            ManagedValue::Function(f) => f,
            other => {
                return Err(BridgeError::new(
                    ErrorKind::TypeError,
                    format!("attribute '{name}' is {}, not callable", other.type_name()),
                ))
            }
        };
        self.call_function(f, target, method_args)
    }

    pub fn call_function(
        &self,
        f: FunctionRef<'gc>,
        target: ManagedValue<'gc>,
        method_args: &[ManagedValue<'gc>],
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        match f.kind {
            FunctionKind::Native(callable) => {
                let full = self.shape_method_args(callable.sig, target, method_args)?;
                self.call(callable, &full)
            }
            FunctionKind::RichCompare { callable, op } => {
                if method_args.len() != 1 {
                    return Err(BridgeError::new(
                        ErrorKind::TypeError,
                        format!("{} takes exactly one argument", f.name),
                    ));
                }
                self.call(
                    callable,
                    &[target, method_args[0], ManagedValue::Int32(op.code())],
                )
            }
            FunctionKind::SyntheticNew => Err(BridgeError::new(
                ErrorKind::TypeError,
                "constructors are invoked through construct()".to_string(),
            )),
        }
    }

    fn shape_method_args(
        &self,
        sig: Signature,
        target: ManagedValue<'gc>,
        method_args: &[ManagedValue<'gc>],
    ) -> Result<Vec<ManagedValue<'gc>>, BridgeError> {
        let full = match sig {
            Signature::Varargs => {
                vec![target, self.new_tuple(method_args.to_vec())]
            }
            Signature::Keywords | Signature::InitProc => {
                vec![target, self.new_tuple(method_args.to_vec()), ManagedValue::Null]
            }
            _ => {
                let mut full = Vec::with_capacity(1 + method_args.len());
                full.push(target);
                full.extend_from_slice(method_args);
                if full.len() != sig.arity() {
                    return Err(BridgeError::new(
                        ErrorKind::TypeError,
                        format!(
                            "{sig:?} takes {} arguments, got {}",
                            sig.arity().saturating_sub(1),
                            method_args.len()
                        ),
                    ));
                }
                full
            }
        };
        Ok(full)
    }

    // ----- construction -----

    /// Instantiates a class: runs `__new__` (explicit, inherited or
    /// synthesized), then `__init__` if the type defines one.
    pub fn construct(
        &self,
        class: ClassRef<'gc>,
        ctor_args: &[ManagedValue<'gc>],
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        let instance = match class.lookup("__new__") {
            None => self.new_object(class),
            Some(ManagedValue::Function(f)) => self.run_constructor(class, f, ctor_args)?,
            Some(other) => {
                return Err(BridgeError::new(
                    ErrorKind::TypeError,
                    format!("__new__ of '{}' is {}, not callable", class.name, other.type_name()),
                ))
            }
        };
        if let Some(ManagedValue::Function(init)) = class.lookup("__init__") {
            self.call_function(init, instance, ctor_args)?;
        }
        Ok(instance)
    }

    fn run_constructor(
        &self,
        class: ClassRef<'gc>,
        f: FunctionRef<'gc>,
        ctor_args: &[ManagedValue<'gc>],
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        match f.kind {
            FunctionKind::SyntheticNew => {
                // the storage block is allocated before any delegation
                let space = NativeSpace::new(
                    class.basic_size,
                    class.instance_destroy,
                    self.next_storage_id(),
                );
                // delegate only to an explicit native constructor; an
                // inherited synthesized one would re-allocate the same block
                let instance = match class.inherited_constructor() {
                    Some(ManagedValue::Function(inherited))
                        if !matches!(inherited.kind, FunctionKind::SyntheticNew) =>
                    {
                        self.run_constructor(class, inherited, ctor_args)?
                    }
                    _ => self.new_object(class),
                };
                match instance.as_object() {
                    Some(obj) => obj.with_mut(self.gc, |o| o.native_space = Some(space)),
                    None => {
                        return Err(BridgeError::new(
                            ErrorKind::SystemError,
                            format!("constructor of '{}' produced a non-instance", class.name),
                        ))
                    }
                }
                Ok(instance)
            }
            FunctionKind::Native(callable) => self.call(
                callable,
                &[
                    ManagedValue::Class(class),
                    self.new_tuple(ctor_args.to_vec()),
                    ManagedValue::Null,
                ],
            ),
            FunctionKind::RichCompare { .. } => Err(BridgeError::new(
                ErrorKind::SystemError,
                format!("'{}' has a comparison wrapper installed as __new__", class.name),
            )),
        }
    }

    // ----- types -----

    pub fn create_type_from_spec(
        &self,
        spec: &TypeSpec,
        params: &[SpecParam<'gc>],
    ) -> Result<ClassRef<'gc>, BridgeError> {
        bridge_trace!(self, "create type '{}' ({} defines)", spec.name, spec.defines.len());
        typespec::create_type_from_spec(self, spec, params)
    }

    /// Releases a type's native-storage block: field handles owned by the
    /// block go first, then the block's destroy function runs through the
    /// dispatcher.
    pub fn release_type_storage(&self, class: ClassRef<'gc>) -> Result<(), BridgeError> {
        let space = class.native_space.borrow_mut().take();
        let Some(mut space) = space else {
            return Ok(());
        };
        self.root.handles.borrow_mut().release_fields_of(space.id());
        if let Some(destroy) = space.take_destroy() {
            self.root.dispatcher.attach(destroy, Signature::DestroyFunc)?;
            self.root.dispatcher.call(
                destroy,
                Signature::DestroyFunc.shape(),
                &[WireWord::Word(space.base_ptr() as u64)],
            );
        }
        Ok(())
    }

    // ----- extensions -----

    /// Loads an extension library and runs its init entry point through
    /// the module-init signature.
    pub fn load_extension(
        &self,
        library: &str,
        init_symbol: &str,
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        let init = self
            .root
            .extensions
            .borrow_mut()
            .get_init(library, init_symbol)?;
        bridge_trace!(self, "extension '{library}' init {init_symbol} at {init:#x}");
        let callable = self.attach(init, Signature::ModuleInit)?;
        self.call(callable, &[])
    }

    /// Slot address for a named ABI member, as an extension's load step
    /// would query it.
    pub fn abi_member(&self, name: &str) -> Option<u64> {
        self.root.abi.by_name(name)
    }

    // ----- ABI entry point bodies (called from the extern "C" shims) -----

    pub(crate) fn abi_dup(&self, h: u64) -> u64 {
        bridge_trace_wire!(self, "dup", h);
        match self.from_wire(h) {
            Ok(value) => self.wire_for_native(value),
            Err(err) => {
                self.set_pending(err);
                WIRE_NULL
            }
        }
    }

    pub(crate) fn abi_close(&self, h: u64) -> i32 {
        bridge_trace_wire!(self, "close", h);
        match self.close_wire(h) {
            Ok(()) => 0,
            Err(err) => {
                self.set_pending(err);
                -1
            }
        }
    }

    pub(crate) fn abi_box_int(&self, value: i32) -> u64 {
        self.wire_out(boxing::box_int(value))
    }

    pub(crate) fn abi_unbox_int(&self, h: u64) -> i32 {
        let result = self.from_wire(h).and_then(|v| {
            let wide = v.as_int().ok_or_else(|| {
                BridgeError::new(
                    ErrorKind::TypeError,
                    format!("expected an int, got {}", v.type_name()),
                )
            })?;
            i32::try_from(wide).map_err(|_| {
                BridgeError::new(
                    ErrorKind::ValueError,
                    format!("int {wide} does not fit in 32 bits"),
                )
            })
        });
        match result {
            Ok(i) => i,
            Err(err) => {
                self.set_pending(err);
                -1
            }
        }
    }

    pub(crate) fn abi_box_double(&self, value: f64) -> u64 {
        self.wire_out(boxing::box_double(value))
    }

    pub(crate) fn abi_unbox_double(&self, h: u64) -> f64 {
        match self.from_wire(h).and_then(|v| {
            v.as_float().ok_or_else(|| {
                BridgeError::new(
                    ErrorKind::TypeError,
                    format!("expected a float, got {}", v.type_name()),
                )
            })
        }) {
            Ok(d) => d,
            Err(err) => {
                self.set_pending(err);
                -1.0
            }
        }
    }

    pub(crate) fn abi_err_set(&self, kind: ErrorKind, message: String) {
        self.set_pending(BridgeError::new(kind, message));
    }

    pub(crate) fn abi_get_attr(&self, h: u64, name: &str) -> u64 {
        let result = self
            .from_wire(h)
            .and_then(|target| self.get_attr(target, name));
        match result {
            Ok(value) => self.wire_for_native(value),
            Err(err) => {
                self.set_pending(err);
                WIRE_NULL
            }
        }
    }

    pub(crate) fn abi_set_attr(&self, h: u64, name: &str, value: u64) -> i32 {
        let result = self.from_wire(h).and_then(|target| {
            let value = self.from_wire(value)?;
            self.set_attr(target, name, value)
        });
        match result {
            Ok(()) => 0,
            Err(err) => {
                self.set_pending(err);
                -1
            }
        }
    }

    pub(crate) fn abi_call(&self, callable: u64, argv: &[u64]) -> u64 {
        let result = (|| {
            let callable = match self.from_wire(callable)? {
                ManagedValue::Function(f) => match f.kind {
                    FunctionKind::Native(c) => c,
                    _ => {
                        return Err(BridgeError::new(
                            ErrorKind::TypeError,
                            format!("'{}' cannot be called through the ABI", f.name),
                        ))
                    }
                },
                other => {
                    return Err(BridgeError::new(
                        ErrorKind::TypeError,
                        format!("{} is not callable", other.type_name()),
                    ))
                }
            };
            let mut call_args = Vec::with_capacity(argv.len());
            for wire in argv {
                call_args.push(self.from_wire(*wire)?);
            }
            self.call(callable, &call_args)
        })();
        match result {
            Ok(value) => self.wire_for_native(value),
            Err(err) => {
                self.set_pending(err);
                WIRE_NULL
            }
        }
    }
}
