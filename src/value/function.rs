use gc_arena::Collect;

use crate::bridge::signature::Signature;

use super::object::MemberKind;

/// A native entry point with its attached calling convention. Attachment
/// is immutable: the pair never changes once the dispatcher has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Collect)]
#[collect(require_static)]
pub struct NativeCallable {
    pub ptr: u64,
    pub sig: Signature,
}

/// Comparison operation carried by a rich-compare wrapper. The numeric
/// codes are part of the ABI; natives receive them as the fourth word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Collect)]
#[collect(require_static)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Ge,
    ];

    pub fn code(self) -> i32 {
        match self {
            CompareOp::Lt => 0,
            CompareOp::Le => 1,
            CompareOp::Eq => 2,
            CompareOp::Ne => 3,
            CompareOp::Gt => 4,
            CompareOp::Ge => 5,
        }
    }

    pub fn dunder_name(self) -> &'static str {
        match self {
            CompareOp::Lt => "__lt__",
            CompareOp::Le => "__le__",
            CompareOp::Eq => "__eq__",
            CompareOp::Ne => "__ne__",
            CompareOp::Gt => "__gt__",
            CompareOp::Ge => "__ge__",
        }
    }
}

#[derive(Debug, Clone, Copy, Collect)]
#[collect(require_static)]
pub enum FunctionKind {
    /// Calls straight through the trampoline.
    Native(NativeCallable),
    /// One rich-compare pointer fans out to six wrappers; each carries the
    /// opcode it forwards as the extra argument word.
    RichCompare { callable: NativeCallable, op: CompareOp },
    /// Constructor synthesized for types with a nonzero basic size and no
    /// explicit constructor: allocates the storage block, then delegates
    /// to the nearest inherited constructor.
    SyntheticNew,
}

/// A callable the bridge built from a method or slot definition.
#[derive(Debug, Collect)]
#[collect(require_static)]
pub struct NativeFunction {
    pub name: String,
    pub doc: Option<String>,
    pub kind: FunctionKind,
}

/// One side of a getset or member descriptor.
#[derive(Debug, Clone, Copy, Collect)]
#[collect(require_static)]
pub enum Accessor {
    /// Getset accessors forward the definition's opaque closure pointer
    /// unchanged on every call.
    Native { callable: NativeCallable, closure: u64 },
    /// Member accessors read and write the instance storage block directly.
    Member { kind: MemberKind, offset: usize },
}

/// A data descriptor installed in a class dict. A missing setter means the
/// attribute rejects writes; a missing getter means it rejects reads.
#[derive(Debug, Collect)]
#[collect(require_static)]
pub struct Descriptor {
    pub name: String,
    pub doc: Option<String>,
    pub getter: Option<Accessor>,
    pub setter: Option<Accessor>,
}
