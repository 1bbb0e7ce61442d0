//! The trampoline: attaching native entry points and calling through them.
//!
//! A signature is attached to a pointer exactly once; after that, calls go
//! through one of two backends selected when the bridge is built. The
//! foreign-call backend drives libffi with one `Cif` per physical shape,
//! all constructed up front. The reflective backend transmutes the pointer
//! to a typed `extern "C" fn` per shape and calls it directly.

use std::collections::HashMap;
use std::ffi::c_void;

use enum_dispatch::enum_dispatch;
use gc_arena::Collect;
use libffi::middle::{Arg, Cif, CodePtr, Type};

use super::signature::{CallShape, Signature};
use super::{BridgeError, ErrorKind};

/// One argument word as it crosses the boundary. Everything is a 64-bit
/// word except the rich-compare opcode and the buffer flags, which are C
/// ints by convention.
#[derive(Debug, Clone, Copy)]
pub enum WireWord {
    Word(u64),
    Int(i32),
}

/// Raw return value before logical decoding.
#[derive(Debug, Clone, Copy)]
pub enum RawReturn {
    Word(u64),
    Int(i32),
    Void,
}

#[enum_dispatch]
pub trait CallThrough {
    /// Calls `ptr` with `words` under the given physical shape. The
    /// pointer must be a live function of exactly that shape; attachment
    /// is the gate that establishes this.
    fn call_raw(&self, ptr: u64, shape: CallShape, words: &[WireWord]) -> RawReturn;
}

#[enum_dispatch(CallThrough)]
pub enum Backend {
    ForeignBackend,
    ReflectiveBackend,
}

/// Which backend a bridge is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Foreign,
    Reflective,
}

impl Backend {
    pub fn new(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Foreign => ForeignBackend::new().into(),
            BackendKind::Reflective => ReflectiveBackend.into(),
        }
    }
}

pub struct ForeignBackend {
    cifs: HashMap<CallShape, Cif>,
}

impl ForeignBackend {
    pub fn new() -> Self {
        let mut cifs = HashMap::new();
        for shape in CallShape::ALL {
            cifs.insert(shape, Self::build_cif(shape));
        }
        ForeignBackend { cifs }
    }

    fn build_cif(shape: CallShape) -> Cif {
        let words = shape.word_count();
        let mut args: Vec<Type> = Vec::with_capacity(words);
        match shape {
            CallShape::WordsOp | CallShape::WordsFlags => {
                for _ in 0..words - 1 {
                    args.push(Type::u64());
                }
                args.push(Type::i32());
            }
            _ => {
                for _ in 0..words {
                    args.push(Type::u64());
                }
            }
        }
        let ret = match shape {
            CallShape::Words1
            | CallShape::Words2
            | CallShape::Words3
            | CallShape::Words4
            | CallShape::Words5
            | CallShape::WordsOp => Type::u64(),
            CallShape::Int2
            | CallShape::Int3
            | CallShape::Int4
            | CallShape::Int5
            | CallShape::WordsFlags => Type::i32(),
            CallShape::Void1 | CallShape::Void2 | CallShape::Void3 => Type::void(),
        };
        Cif::new(args, ret)
    }
}

impl Default for ForeignBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CallThrough for ForeignBackend {
    fn call_raw(&self, ptr: u64, shape: CallShape, words: &[WireWord]) -> RawReturn {
        debug_assert_eq!(words.len(), shape.word_count());
        let cif = &self.cifs[&shape];
        let target = CodePtr::from_ptr(ptr as usize as *const c_void);

        // Arg borrows its operand; keep the widened copies alive for the call.
        let copies: Vec<WireWord> = words.to_vec();
        let arg_values: Vec<Arg> = copies
            .iter()
            .map(|w| match w {
                WireWord::Word(v) => Arg::new(v),
                WireWord::Int(v) => Arg::new(v),
            })
            .collect();

        match shape {
            CallShape::Words1
            | CallShape::Words2
            | CallShape::Words3
            | CallShape::Words4
            | CallShape::Words5
            | CallShape::WordsOp => RawReturn::Word(unsafe { cif.call::<u64>(target, &arg_values) }),
            CallShape::Int2
            | CallShape::Int3
            | CallShape::Int4
            | CallShape::Int5
            | CallShape::WordsFlags => RawReturn::Int(unsafe { cif.call::<i32>(target, &arg_values) }),
            CallShape::Void1 | CallShape::Void2 | CallShape::Void3 => {
                let _: c_void = unsafe { cif.call(target, &arg_values) };
                RawReturn::Void
            }
        }
    }
}

/// Calls through typed function pointers instead of libffi. One entry
/// point per shape; the match is exhaustive so a new shape cannot be
/// added without a calling convention.
pub struct ReflectiveBackend;

macro_rules! word {
    ($words:expr, $i:expr) => {
        match $words[$i] {
            WireWord::Word(v) => v,
            WireWord::Int(v) => v as u64,
        }
    };
}

macro_rules! int {
    ($words:expr, $i:expr) => {
        match $words[$i] {
            WireWord::Int(v) => v,
            WireWord::Word(v) => v as i32,
        }
    };
}

impl CallThrough for ReflectiveBackend {
    fn call_raw(&self, ptr: u64, shape: CallShape, words: &[WireWord]) -> RawReturn {
        debug_assert_eq!(words.len(), shape.word_count());
        let p = ptr as usize;
        // SAFETY: attachment guarantees the pointer matches the shape.
        unsafe {
        use std::mem::transmute;
        match shape {
            CallShape::Words1 => {
                let f: extern "C" fn(u64) -> u64 = transmute(p);
                RawReturn::Word(f(word!(words, 0)))
            }
            CallShape::Words2 => {
                let f: extern "C" fn(u64, u64) -> u64 = transmute(p);
                RawReturn::Word(f(word!(words, 0), word!(words, 1)))
            }
            CallShape::Words3 => {
                let f: extern "C" fn(u64, u64, u64) -> u64 = transmute(p);
                RawReturn::Word(f(word!(words, 0), word!(words, 1), word!(words, 2)))
            }
            CallShape::Words4 => {
                let f: extern "C" fn(u64, u64, u64, u64) -> u64 = transmute(p);
                RawReturn::Word(f(
                    word!(words, 0),
                    word!(words, 1),
                    word!(words, 2),
                    word!(words, 3),
                ))
            }
            CallShape::Words5 => {
                let f: extern "C" fn(u64, u64, u64, u64, u64) -> u64 = transmute(p);
                RawReturn::Word(f(
                    word!(words, 0),
                    word!(words, 1),
                    word!(words, 2),
                    word!(words, 3),
                    word!(words, 4),
                ))
            }
            CallShape::Int2 => {
                let f: extern "C" fn(u64, u64) -> i32 = transmute(p);
                RawReturn::Int(f(word!(words, 0), word!(words, 1)))
            }
            CallShape::Int3 => {
                let f: extern "C" fn(u64, u64, u64) -> i32 = transmute(p);
                RawReturn::Int(f(word!(words, 0), word!(words, 1), word!(words, 2)))
            }
            CallShape::Int4 => {
                let f: extern "C" fn(u64, u64, u64, u64) -> i32 = transmute(p);
                RawReturn::Int(f(
                    word!(words, 0),
                    word!(words, 1),
                    word!(words, 2),
                    word!(words, 3),
                ))
            }
            CallShape::Int5 => {
                let f: extern "C" fn(u64, u64, u64, u64, u64) -> i32 = transmute(p);
                RawReturn::Int(f(
                    word!(words, 0),
                    word!(words, 1),
                    word!(words, 2),
                    word!(words, 3),
                    word!(words, 4),
                ))
            }
            CallShape::WordsOp => {
                let f: extern "C" fn(u64, u64, u64, i32) -> u64 = transmute(p);
                RawReturn::Word(f(
                    word!(words, 0),
                    word!(words, 1),
                    word!(words, 2),
                    int!(words, 3),
                ))
            }
            CallShape::WordsFlags => {
                let f: extern "C" fn(u64, u64, u64, i32) -> i32 = transmute(p);
                RawReturn::Int(f(
                    word!(words, 0),
                    word!(words, 1),
                    word!(words, 2),
                    int!(words, 3),
                ))
            }
            CallShape::Void1 => {
                let f: extern "C" fn(u64) = transmute(p);
                f(word!(words, 0));
                RawReturn::Void
            }
            CallShape::Void2 => {
                let f: extern "C" fn(u64, u64) = transmute(p);
                f(word!(words, 0), word!(words, 1));
                RawReturn::Void
            }
            CallShape::Void3 => {
                let f: extern "C" fn(u64, u64, u64) = transmute(p);
                f(word!(words, 0), word!(words, 1), word!(words, 2));
                RawReturn::Void
            }
        } }
    }
}

/// Per-bridge attachment registry plus the selected backend.
pub struct Dispatcher {
    backend: Backend,
    attached: std::cell::RefCell<HashMap<u64, Signature>>,
}

gc_arena::unsafe_empty_collect!(Dispatcher);

impl Dispatcher {
    pub fn new(kind: BackendKind) -> Self {
        Dispatcher {
            backend: Backend::new(kind),
            attached: std::cell::RefCell::new(HashMap::new()),
        }
    }

    /// Records the immutable pointer/signature pairing. Re-attaching the
    /// same pairing is a cheap no-op; changing a pointer's signature is a
    /// system error.
    pub fn attach(&self, ptr: u64, sig: Signature) -> Result<(), BridgeError> {
        if ptr == 0 {
            return Err(BridgeError::new(
                ErrorKind::SystemError,
                "cannot attach a signature to a null pointer".to_string(),
            ));
        }
        match self.attached.borrow_mut().entry(ptr) {
            std::collections::hash_map::Entry::Occupied(e) if *e.get() != sig => {
                Err(BridgeError::new(
                    ErrorKind::SystemError,
                    format!(
                        "pointer {ptr:#x} already attached as {:?}, cannot re-attach as {sig:?}",
                        e.get()
                    ),
                ))
            }
            std::collections::hash_map::Entry::Occupied(_) => Ok(()),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(sig);
                Ok(())
            }
        }
    }

    pub fn attached_signature(&self, ptr: u64) -> Option<Signature> {
        self.attached.borrow().get(&ptr).copied()
    }

    pub fn call(&self, ptr: u64, shape: CallShape, words: &[WireWord]) -> RawReturn {
        self.backend.call_raw(ptr, shape, words)
    }
}
