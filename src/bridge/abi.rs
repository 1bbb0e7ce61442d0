//! The stable ABI surface handed to native code.
//!
//! Natives receive one context word per call: a pointer to a
//! [`WireContext`], which carries an indexed table of function-pointer
//! slots. An extension queries the slots it needs once at load time
//! (through the typed accessors its header declares) and calls back into
//! the bridge through them for everything else: duplicating and closing
//! handles, boxing scalars, attribute access, invoking callables, and the
//! pending exception.

use std::ffi::{c_char, CStr};

use gc_arena::Collect;

use super::boxing;
use super::{BridgeContext, ErrorKind};

/// First field of every context the bridge hands out; a cheap guard
/// against natives passing back a stray pointer.
pub const WIRE_CONTEXT_MAGIC: u64 = 0x5842_5249_4447_4531; // "XBRIDGE1"

/// Index of one entry point in the context's slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AbiMember {
    Dup = 0,
    Close = 1,
    BoxInt = 2,
    UnboxInt = 3,
    BoxDouble = 4,
    UnboxDouble = 5,
    ErrSet = 6,
    ErrOccurred = 7,
    GetAttr = 8,
    SetAttr = 9,
    Call = 10,
}

impl AbiMember {
    pub const COUNT: usize = 11;

    pub const ALL: [AbiMember; Self::COUNT] = [
        AbiMember::Dup,
        AbiMember::Close,
        AbiMember::BoxInt,
        AbiMember::UnboxInt,
        AbiMember::BoxDouble,
        AbiMember::UnboxDouble,
        AbiMember::ErrSet,
        AbiMember::ErrOccurred,
        AbiMember::GetAttr,
        AbiMember::SetAttr,
        AbiMember::Call,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AbiMember::Dup => "handle_dup",
            AbiMember::Close => "handle_close",
            AbiMember::BoxInt => "box_int",
            AbiMember::UnboxInt => "unbox_int",
            AbiMember::BoxDouble => "box_double",
            AbiMember::UnboxDouble => "unbox_double",
            AbiMember::ErrSet => "err_set",
            AbiMember::ErrOccurred => "err_occurred",
            AbiMember::GetAttr => "attr_get",
            AbiMember::SetAttr => "attr_set",
            AbiMember::Call => "call",
        }
    }

    pub fn from_name(name: &str) -> Option<AbiMember> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }
}

/// The per-bridge slot table. Built once at bridge construction; the
/// addresses never change afterwards.
pub struct AbiTable {
    slots: Box<[u64; AbiMember::COUNT]>,
}

gc_arena::unsafe_empty_collect!(AbiTable);

impl AbiTable {
    pub fn new() -> Self {
        let mut slots = Box::new([0u64; AbiMember::COUNT]);
        slots[AbiMember::Dup as usize] = abi_dup as usize as u64;
        slots[AbiMember::Close as usize] = abi_close as usize as u64;
        slots[AbiMember::BoxInt as usize] = abi_box_int as usize as u64;
        slots[AbiMember::UnboxInt as usize] = abi_unbox_int as usize as u64;
        slots[AbiMember::BoxDouble as usize] = abi_box_double as usize as u64;
        slots[AbiMember::UnboxDouble as usize] = abi_unbox_double as usize as u64;
        slots[AbiMember::ErrSet as usize] = abi_err_set as usize as u64;
        slots[AbiMember::ErrOccurred as usize] = abi_err_occurred as usize as u64;
        slots[AbiMember::GetAttr as usize] = abi_get_attr as usize as u64;
        slots[AbiMember::SetAttr as usize] = abi_set_attr as usize as u64;
        slots[AbiMember::Call as usize] = abi_call as usize as u64;
        AbiTable { slots }
    }

    pub fn slot(&self, member: AbiMember) -> u64 {
        self.slots[member as usize]
    }

    pub fn by_name(&self, name: &str) -> Option<u64> {
        AbiMember::from_name(name).map(|m| self.slot(m))
    }

    pub(crate) fn slots_ptr(&self) -> *const u64 {
        self.slots.as_ptr()
    }
}

impl Default for AbiTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The C-visible call context. One lives on the stack for the duration of
/// each `invoke`; its address is the context word.
#[repr(C)]
pub struct WireContext {
    magic: u64,
    slots: *const u64,
    nslots: usize,
    state: *mut (),
}

macro_rules! typed_slot {
    ($(#[$meta:meta])* $name:ident, $member:expr, $fnty:ty) => {
        $(#[$meta])*
        ///
        /// # Safety
        /// `self` must be a context word received from this bridge.
        pub unsafe fn $name(&self) -> $fnty {
            std::mem::transmute::<usize, $fnty>(self.slot($member) as usize)
        }
    };
}

impl WireContext {
    pub(crate) fn new(table: &AbiTable, state: *mut ()) -> WireContext {
        WireContext {
            magic: WIRE_CONTEXT_MAGIC,
            slots: table.slots_ptr(),
            nslots: AbiMember::COUNT,
            state,
        }
    }

    pub fn slot(&self, member: AbiMember) -> u64 {
        debug_assert!((member as usize) < self.nslots);
        // SAFETY: slots points into the bridge's AbiTable, which outlives
        // every context it is embedded in.
        unsafe { *self.slots.add(member as usize) }
    }

    typed_slot!(
        /// Duplicate a handle: the result is independently closeable.
        dup, AbiMember::Dup, unsafe extern "C" fn(*mut WireContext, u64) -> u64
    );
    typed_slot!(
        /// Close a handle. Returns 0, or -1 with the pending exception set.
        close, AbiMember::Close, unsafe extern "C" fn(*mut WireContext, u64) -> i32
    );
    typed_slot!(
        box_int, AbiMember::BoxInt, unsafe extern "C" fn(*mut WireContext, i32) -> u64
    );
    typed_slot!(
        unbox_int, AbiMember::UnboxInt, unsafe extern "C" fn(*mut WireContext, u64) -> i32
    );
    typed_slot!(
        box_double, AbiMember::BoxDouble, unsafe extern "C" fn(*mut WireContext, f64) -> u64
    );
    typed_slot!(
        unbox_double, AbiMember::UnboxDouble, unsafe extern "C" fn(*mut WireContext, u64) -> f64
    );
    typed_slot!(
        /// Set the pending exception; returns the null handle so callees
        /// can `return err_set(...)`.
        err_set, AbiMember::ErrSet,
        unsafe extern "C" fn(*mut WireContext, i32, *const c_char) -> u64
    );
    typed_slot!(
        err_occurred, AbiMember::ErrOccurred, unsafe extern "C" fn(*mut WireContext) -> i32
    );
    typed_slot!(
        attr_get, AbiMember::GetAttr,
        unsafe extern "C" fn(*mut WireContext, u64, *const c_char) -> u64
    );
    typed_slot!(
        attr_set, AbiMember::SetAttr,
        unsafe extern "C" fn(*mut WireContext, u64, *const c_char, u64) -> i32
    );
    typed_slot!(
        /// Invoke a callable handle with an argv of handles.
        call, AbiMember::Call,
        unsafe extern "C" fn(*mut WireContext, u64, *const u64, u64) -> u64
    );
}

/// Recovers the bridge context. The lifetime is conjured here: the
/// `WireContext` only exists on an `invoke` frame, and the state pointer
/// aims at the `BridgeContext` owned by that same frame.
unsafe fn bridge<'a>(ctx: *mut WireContext) -> Option<&'a BridgeContext<'a>> {
    if ctx.is_null() || (*ctx).magic != WIRE_CONTEXT_MAGIC || (*ctx).state.is_null() {
        return None;
    }
    Some(&*((*ctx).state as *const BridgeContext<'a>))
}

unsafe fn name_str<'a>(name: *const c_char) -> Option<std::borrow::Cow<'a, str>> {
    if name.is_null() {
        None
    } else {
        Some(CStr::from_ptr(name).to_string_lossy())
    }
}

extern "C" fn abi_dup(ctx: *mut WireContext, h: u64) -> u64 {
    match unsafe { bridge(ctx) } {
        Some(bc) => bc.abi_dup(h),
        None => boxing::WIRE_NULL,
    }
}

extern "C" fn abi_close(ctx: *mut WireContext, h: u64) -> i32 {
    match unsafe { bridge(ctx) } {
        Some(bc) => bc.abi_close(h),
        None => -1,
    }
}

extern "C" fn abi_box_int(ctx: *mut WireContext, value: i32) -> u64 {
    match unsafe { bridge(ctx) } {
        Some(bc) => bc.abi_box_int(value),
        None => boxing::WIRE_NULL,
    }
}

extern "C" fn abi_unbox_int(ctx: *mut WireContext, h: u64) -> i32 {
    match unsafe { bridge(ctx) } {
        Some(bc) => bc.abi_unbox_int(h),
        None => -1,
    }
}

extern "C" fn abi_box_double(ctx: *mut WireContext, value: f64) -> u64 {
    match unsafe { bridge(ctx) } {
        Some(bc) => bc.abi_box_double(value),
        None => boxing::WIRE_NULL,
    }
}

extern "C" fn abi_unbox_double(ctx: *mut WireContext, h: u64) -> f64 {
    match unsafe { bridge(ctx) } {
        Some(bc) => bc.abi_unbox_double(h),
        None => -1.0,
    }
}

extern "C" fn abi_err_set(ctx: *mut WireContext, code: i32, message: *const c_char) -> u64 {
    if let Some(bc) = unsafe { bridge(ctx) } {
        let message = unsafe { name_str(message) }
            .map(|m| m.into_owned())
            .unwrap_or_default();
        bc.abi_err_set(ErrorKind::from_code(code), message);
    }
    boxing::WIRE_NULL
}

extern "C" fn abi_err_occurred(ctx: *mut WireContext) -> i32 {
    match unsafe { bridge(ctx) } {
        Some(bc) => bc.error_occurred() as i32,
        None => 0,
    }
}

extern "C" fn abi_get_attr(ctx: *mut WireContext, h: u64, name: *const c_char) -> u64 {
    match (unsafe { bridge(ctx) }, unsafe { name_str(name) }) {
        (Some(bc), Some(name)) => bc.abi_get_attr(h, &name),
        _ => boxing::WIRE_NULL,
    }
}

extern "C" fn abi_set_attr(ctx: *mut WireContext, h: u64, name: *const c_char, value: u64) -> i32 {
    match (unsafe { bridge(ctx) }, unsafe { name_str(name) }) {
        (Some(bc), Some(name)) => bc.abi_set_attr(h, &name, value),
        _ => -1,
    }
}

extern "C" fn abi_call(ctx: *mut WireContext, callable: u64, argv: *const u64, nargs: u64) -> u64 {
    match unsafe { bridge(ctx) } {
        Some(bc) => {
            let args: Vec<u64> = if argv.is_null() || nargs == 0 {
                vec![]
            } else {
                unsafe { std::slice::from_raw_parts(argv, nargs as usize) }.to_vec()
            };
            bc.abi_call(callable, &args)
        }
        None => boxing::WIRE_NULL,
    }
}
