//! The closed catalog of native calling conventions.
//!
//! Every native entry point the bridge will ever call is described by one
//! [`Signature`]. Dispatch is an exhaustive match: adding a kind without
//! updating the shape and return tables is a compile error, not a runtime
//! surprise.

use gc_arena::Collect;

/// Logical calling convention of a native entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Collect)]
#[collect(require_static)]
pub enum Signature {
    /// `(ctx) -> handle`; the extension init symbol.
    ModuleInit,
    NoArgs,
    Unary,
    Binary,
    Ternary,
    /// `(ctx, self, argv, nargs) -> handle`
    Varargs,
    /// `(ctx, self, argv, nargs, kwnames) -> handle`
    Keywords,
    /// `(ctx, self) -> int` truth test
    Inquiry,
    Len,
    Hash,
    Repr,
    GetIter,
    IterNext,
    /// `(ctx, self, index) -> handle`
    SsizeArg,
    SsizeSsizeArg,
    /// `(ctx, self, index, value) -> status`
    SsizeObjArg,
    SsizeSsizeObjArg,
    ObjObj,
    ObjObjArg,
    /// `(ctx, self, argv, nargs, kw) -> status`
    InitProc,
    /// `(ctx, self, closure) -> handle`
    Getter,
    /// `(ctx, self, value, closure) -> status`
    Setter,
    GetAttr,
    SetAttr,
    /// `(ctx, self, other, opcode) -> handle`
    RichCompare,
    /// `(ctx, self, buffer, flags) -> status`
    GetBuffer,
    ReleaseBuffer,
    /// `(ctx, self, visit, arg) -> status`; recorded, never invoked here
    Traverse,
    Destructor,
    /// `(data) -> void`; the only convention without a context word
    DestroyFunc,
    FreeFunc,
}

/// Physical call shape after merging.
///
/// Handles, pointers and sizes all travel as 64-bit words, so most
/// signatures collapse onto a handful of word-count shapes. Shapes that
/// return a C `int` stay separate from the word-returning ones (the callee
/// only writes 32 bits of the return register), and shapes carrying a
/// 32-bit extra argument keep their own entry because the argument width
/// is part of the foreign calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// n words in, one word out
    Words1,
    Words2,
    Words3,
    Words4,
    Words5,
    /// n words in, C int out
    Int2,
    Int3,
    Int4,
    Int5,
    /// three words and an opcode in, one word out
    WordsOp,
    /// three words and a flags int in, C int out
    WordsFlags,
    /// n words in, nothing out
    Void1,
    Void2,
    Void3,
}

impl CallShape {
    /// Total argument words, counting the context word where present.
    pub fn word_count(self) -> usize {
        match self {
            CallShape::Words1 | CallShape::Void1 => 1,
            CallShape::Words2 | CallShape::Int2 | CallShape::Void2 => 2,
            CallShape::Words3 | CallShape::Int3 | CallShape::Void3 => 3,
            CallShape::Words4 | CallShape::Int4 | CallShape::WordsOp | CallShape::WordsFlags => 4,
            CallShape::Words5 | CallShape::Int5 => 5,
        }
    }

    pub const ALL: [CallShape; 14] = [
        CallShape::Words1,
        CallShape::Words2,
        CallShape::Words3,
        CallShape::Words4,
        CallShape::Words5,
        CallShape::Int2,
        CallShape::Int3,
        CallShape::Int4,
        CallShape::Int5,
        CallShape::WordsOp,
        CallShape::WordsFlags,
        CallShape::Void1,
        CallShape::Void2,
        CallShape::Void3,
    ];
}

/// How the raw return value is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// A wire handle; null plus a pending exception signals failure.
    Object,
    /// A signed size or hash; -1 plus a pending exception signals failure.
    Ssize,
    /// A C int status; nonzero plus a pending exception signals failure.
    Status,
    Void,
}

impl Signature {
    pub fn shape(self) -> CallShape {
        use Signature::*;
        match self {
            ModuleInit => CallShape::Words1,
            NoArgs | Unary | Repr | GetIter | IterNext | Len | Hash => CallShape::Words2,
            Binary | Getter | GetAttr | SsizeArg => CallShape::Words3,
            Ternary | Varargs | SsizeSsizeArg => CallShape::Words4,
            Keywords => CallShape::Words5,
            Inquiry => CallShape::Int2,
            ObjObj => CallShape::Int3,
            Traverse | Setter | SetAttr | ObjObjArg | SsizeObjArg => CallShape::Int4,
            SsizeSsizeObjArg | InitProc => CallShape::Int5,
            RichCompare => CallShape::WordsOp,
            GetBuffer => CallShape::WordsFlags,
            ReleaseBuffer => CallShape::Void3,
            Destructor | FreeFunc => CallShape::Void2,
            DestroyFunc => CallShape::Void1,
        }
    }

    pub fn return_kind(self) -> ReturnKind {
        use Signature::*;
        match self {
            ModuleInit | NoArgs | Unary | Binary | Ternary | Varargs | Keywords | Repr
            | GetIter | IterNext | SsizeArg | SsizeSsizeArg | Getter | GetAttr
            | RichCompare => ReturnKind::Object,
            Len | Hash => ReturnKind::Ssize,
            Inquiry | ObjObj | SsizeObjArg | SsizeSsizeObjArg | ObjObjArg | InitProc
            | Setter | SetAttr | GetBuffer | Traverse => ReturnKind::Status,
            ReleaseBuffer | Destructor | DestroyFunc | FreeFunc => ReturnKind::Void,
        }
    }

    /// Whether the callee receives the context as its first word.
    pub fn takes_context(self) -> bool {
        !matches!(self, Signature::DestroyFunc)
    }

    /// Managed arguments expected by `invoke`, context word excluded. The
    /// vector kinds take one argument tuple in place of the argv and nargs
    /// words.
    pub fn arity(self) -> usize {
        use Signature::*;
        match self {
            Varargs | Keywords | InitProc => self.shape().word_count() - 2,
            _ => self.shape().word_count() - self.takes_context() as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_compatible_kinds_share_a_shape() {
        assert_eq!(Signature::NoArgs.shape(), Signature::Hash.shape());
        assert_eq!(Signature::Binary.shape(), Signature::Getter.shape());
        assert_eq!(Signature::Setter.shape(), Signature::ObjObjArg.shape());
        // int-returning kinds never share a shape with word-returning ones
        assert_ne!(Signature::ObjObj.shape(), Signature::Binary.shape());
        assert_ne!(Signature::InitProc.shape(), Signature::Keywords.shape());
    }

    #[test]
    fn arity_counts_managed_arguments_only() {
        assert_eq!(Signature::ModuleInit.arity(), 0);
        assert_eq!(Signature::Unary.arity(), 1);
        assert_eq!(Signature::RichCompare.arity(), 3);
        assert_eq!(Signature::DestroyFunc.arity(), 1);
    }
}
