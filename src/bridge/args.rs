//! Argument marshaling: the convert half opens the wires a native call
//! needs, the close half releases exactly what was opened.
//!
//! Every signature kind has one symmetric convert/close pairing here. The
//! vector kinds (varargs, keywords, init) materialize their argument tuple
//! as an out-of-heap argv block whose wires are closed as one bulk
//! operation after the call.

use crate::value::ManagedValue;

use super::signature::Signature;
use super::trampoline::WireWord;
use super::{BridgeContext, BridgeError, ErrorKind};

/// One pre-dispatch argument word. `Handle` words are wires that were
/// opened for this call and must be closed after it; `Raw` words are
/// pointers, sizes and closures passed through untouched.
#[derive(Debug, Clone, Copy)]
enum ArgWord {
    Handle(u64),
    Raw(u64),
    Int(i32),
}

impl ArgWord {
    fn to_wire(self) -> WireWord {
        match self {
            ArgWord::Handle(w) | ArgWord::Raw(w) => WireWord::Word(w),
            ArgWord::Int(v) => WireWord::Int(v),
        }
    }
}

pub struct ConvertedArgs {
    words: Vec<ArgWord>,
    /// argv storage for the vector kinds; the pointer embedded in `words`
    /// aims at this block, so it lives until `close`.
    vector: Option<Box<[u64]>>,
}

impl ConvertedArgs {
    /// The physical words, context word excluded.
    pub fn wire_words(&self) -> Vec<WireWord> {
        self.words.iter().map(|w| w.to_wire()).collect()
    }
}

fn type_error(sig: Signature, what: &str, got: &ManagedValue<'_>) -> BridgeError {
    BridgeError::new(
        ErrorKind::TypeError,
        format!("{sig:?} expects {what}, got {}", got.type_name()),
    )
}

/// Opens every wire the call needs. On success the caller owns the result
/// and must hand it back to [`close`] after the call returns.
pub fn convert<'gc>(
    ctx: &BridgeContext<'gc>,
    sig: Signature,
    args: &[ManagedValue<'gc>],
) -> Result<ConvertedArgs, BridgeError> {
    use Signature::*;

    if args.len() != sig.arity() {
        return Err(BridgeError::new(
            ErrorKind::SystemError,
            format!("{sig:?} takes {} arguments, got {}", sig.arity(), args.len()),
        ));
    }

    let handle = |i: usize| -> ArgWord { ArgWord::Handle(ctx.wire_for_native(args[i])) };
    let raw = |i: usize| -> Result<ArgWord, BridgeError> {
        args[i]
            .as_int()
            .map(|v| ArgWord::Raw(v as u64))
            .ok_or_else(|| type_error(sig, "a pointer-sized integer", &args[i]))
    };
    let int = |i: usize| -> Result<ArgWord, BridgeError> {
        args[i]
            .as_int()
            .map(|v| ArgWord::Int(v as i32))
            .ok_or_else(|| type_error(sig, "an int", &args[i]))
    };
    let tuple = |i: usize| -> Result<Vec<ManagedValue<'gc>>, BridgeError> {
        match &args[i] {
            ManagedValue::Tuple(t) => Ok(t.iter().copied().collect()),
            other => Err(type_error(sig, "an argument tuple", other)),
        }
    };

    let mut vector = None;
    let mut argv = |items: &[ManagedValue<'gc>]| -> (ArgWord, ArgWord) {
        let storage: Box<[u64]> = items.iter().map(|v| ctx.wire_for_native(*v)).collect();
        let ptr = if storage.is_empty() { 0 } else { storage.as_ptr() as u64 };
        let nargs = storage.len() as u64;
        vector = Some(storage);
        (ArgWord::Raw(ptr), ArgWord::Raw(nargs))
    };

    let words = match sig {
        ModuleInit => vec![],
        NoArgs | Unary | Repr | GetIter | IterNext | Len | Hash | Inquiry | Destructor => {
            vec![handle(0)]
        }
        Binary | ObjObj | GetAttr => vec![handle(0), handle(1)],
        Ternary => vec![handle(0), handle(1), handle(2)],
        Varargs => {
            let (ptr, nargs) = argv(&tuple(1)?);
            vec![handle(0), ptr, nargs]
        }
        Keywords => {
            let (ptr, nargs) = argv(&tuple(1)?);
            vec![handle(0), ptr, nargs, handle(2)]
        }
        InitProc => {
            let (ptr, nargs) = argv(&tuple(1)?);
            vec![handle(0), ptr, nargs, handle(2)]
        }
        Getter => vec![handle(0), raw(1)?],
        Setter => vec![handle(0), handle(1), raw(2)?],
        SetAttr => vec![handle(0), handle(1), handle(2)],
        ObjObjArg => vec![handle(0), handle(1), handle(2)],
        SsizeArg => vec![handle(0), raw(1)?],
        SsizeSsizeArg => vec![handle(0), raw(1)?, raw(2)?],
        SsizeObjArg => vec![handle(0), raw(1)?, handle(2)],
        SsizeSsizeObjArg => vec![handle(0), raw(1)?, raw(2)?, handle(3)],
        RichCompare => vec![handle(0), handle(1), int(2)?],
        GetBuffer => vec![handle(0), raw(1)?, int(2)?],
        ReleaseBuffer => vec![handle(0), raw(1)?],
        FreeFunc | DestroyFunc => vec![raw(0)?],
        Traverse => {
            return Err(BridgeError::new(
                ErrorKind::SystemError,
                "traverse entry points are recorded, never invoked".to_string(),
            ))
        }
    };

    Ok(ConvertedArgs { words, vector })
}

/// Closes every wire [`convert`] opened, in reverse order, then releases
/// the argv block in bulk.
pub fn close(ctx: &BridgeContext<'_>, converted: ConvertedArgs) -> Result<(), BridgeError> {
    let ConvertedArgs { words, vector } = converted;
    for word in words.iter().rev() {
        if let ArgWord::Handle(w) = word {
            ctx.close_wire(*w)?;
        }
    }
    if let Some(storage) = vector {
        // one bulk release for the whole argument vector
        for w in storage.iter() {
            ctx.close_wire(*w)?;
        }
    }
    Ok(())
}
