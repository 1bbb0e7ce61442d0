use gc_arena::{Collect, Gc};

mod class;
mod function;
mod object;

pub use class::{type_flags, ClassParts, ManagedClass};
pub use function::{
    Accessor, CompareOp, Descriptor, FunctionKind, NativeCallable, NativeFunction,
};
pub use object::{
    ManagedObject, MemberError, MemberKind, NativeSpace, ObjectRef, StorageId,
};

pub type ClassRef<'gc> = Gc<'gc, ManagedClass<'gc>>;
pub type FunctionRef<'gc> = Gc<'gc, NativeFunction>;

/// Everything the runtime passes around by value.
///
/// Primitive variants compare by value, reference variants by identity.
/// Copying a `ManagedValue` never copies the underlying object.
#[derive(Clone, Copy, Collect)]
#[collect(no_drop)]
pub enum ManagedValue<'gc> {
    Null,
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Str(Gc<'gc, String>),
    Tuple(Gc<'gc, Vec<ManagedValue<'gc>>>),
    Object(ObjectRef<'gc>),
    Class(ClassRef<'gc>),
    Function(FunctionRef<'gc>),
    Descriptor(Gc<'gc, Descriptor>),
}

impl<'gc> ManagedValue<'gc> {
    pub fn type_name(&self) -> &'static str {
        match self {
            ManagedValue::Null => "null",
            ManagedValue::Int32(_) => "int32",
            ManagedValue::Int64(_) => "int64",
            ManagedValue::Float64(_) => "float64",
            ManagedValue::Str(_) => "str",
            ManagedValue::Tuple(_) => "tuple",
            ManagedValue::Object(_) => "object",
            ManagedValue::Class(_) => "class",
            ManagedValue::Function(_) => "function",
            ManagedValue::Descriptor(_) => "descriptor",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ManagedValue::Null)
    }

    pub fn as_class(&self) -> Option<ClassRef<'gc>> {
        match self {
            ManagedValue::Class(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef<'gc>> {
        match self {
            ManagedValue::Object(o) => Some(*o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ManagedValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Widens both integer variants; used by member stores and index args.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ManagedValue::Int32(v) => Some(*v as i64),
            ManagedValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ManagedValue::Float64(v) => Some(*v),
            ManagedValue::Int32(v) => Some(*v as f64),
            ManagedValue::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl<'gc> PartialEq for ManagedValue<'gc> {
    fn eq(&self, other: &Self) -> bool {
        use ManagedValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float64(a), Float64(b)) => a == b,
            (Str(a), Str(b)) => Gc::ptr_eq(*a, *b) || **a == **b,
            (Tuple(a), Tuple(b)) => Gc::ptr_eq(*a, *b),
            (Object(a), Object(b)) => Gc::ptr_eq(a.0, b.0),
            (Class(a), Class(b)) => Gc::ptr_eq(*a, *b),
            (Function(a), Function(b)) => Gc::ptr_eq(*a, *b),
            (Descriptor(a), Descriptor(b)) => Gc::ptr_eq(*a, *b),
            _ => false,
        }
    }
}

impl<'gc> std::fmt::Debug for ManagedValue<'gc> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagedValue::Null => write!(f, "null"),
            ManagedValue::Int32(v) => write!(f, "{v}i32"),
            ManagedValue::Int64(v) => write!(f, "{v}i64"),
            ManagedValue::Float64(v) => write!(f, "{v}f64"),
            ManagedValue::Str(s) => write!(f, "{:?}", s.as_str()),
            ManagedValue::Tuple(t) => f.debug_list().entries(t.iter()).finish(),
            ManagedValue::Object(o) => {
                write!(f, "<{} object at {:p}>", o.class().name, Gc::as_ptr(o.0))
            }
            ManagedValue::Class(c) => write!(f, "<class {}>", c.name),
            ManagedValue::Function(func) => write!(f, "<function {}>", func.name),
            ManagedValue::Descriptor(d) => write!(f, "<descriptor {}>", d.name),
        }
    }
}
