use std::collections::HashMap;
use std::ffi::c_void;

use gc_arena::lock::RefLock;
use gc_arena::{Collect, Gc, Mutation};

use super::{ClassRef, ManagedValue};

/// Identifies one native-storage block for the lifetime of the bridge.
/// Field handles are keyed by the id of the block that owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Collect)]
#[collect(require_static)]
pub struct StorageId(pub u64);

/// A zeroed out-of-heap block attached to an instance or a type.
///
/// Native code addresses the block through the raw pointer, so the bytes
/// are intentionally untracked by the collector. When the block is
/// released, the registered destroy function (if any) runs exactly once
/// with the block's base address.
pub struct NativeSpace {
    data: Box<[u8]>,
    destroy: Option<u64>,
    id: StorageId,
}

gc_arena::unsafe_empty_collect!(NativeSpace);

impl NativeSpace {
    pub fn new(size: usize, destroy: Option<u64>, id: StorageId) -> Self {
        NativeSpace {
            data: vec![0u8; size].into_boxed_slice(),
            destroy,
            id,
        }
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn base_ptr(&self) -> *mut u8 {
        self.data.as_ptr() as *mut u8
    }

    /// Detaches the destroy function so a caller can run it through the
    /// dispatcher instead of the direct fallback in `Drop`.
    pub fn take_destroy(&mut self) -> Option<u64> {
        self.destroy.take()
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.data.get(offset..offset.checked_add(len)?)
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match offset
            .checked_add(bytes.len())
            .and_then(|end| self.data.get_mut(offset..end))
        {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}

impl Drop for NativeSpace {
    fn drop(&mut self) {
        if let Some(ptr) = self.destroy.take() {
            // SAFETY: destroy pointers enter the bridge only through slot
            // registration, which requires the destroy-func signature.
            let f: unsafe extern "C" fn(*mut c_void) =
                unsafe { std::mem::transmute(ptr as usize) };
            unsafe { f(self.base_ptr() as *mut c_void) };
        }
    }
}

impl std::fmt::Debug for NativeSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NativeSpace({} bytes, id {}, destroy {:?})",
            self.data.len(),
            self.id.0,
            self.destroy
        )
    }
}

/// Field type of a member definition. Members address a fixed-width scalar
/// at a byte offset inside an instance storage block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Collect)]
#[collect(require_static)]
pub enum MemberKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MemberError {
    /// offset + width does not fit in the storage block
    OutOfBounds { offset: usize, width: usize, space: usize },
    TypeMismatch { expected: &'static str, got: &'static str },
}

impl std::fmt::Display for MemberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberError::OutOfBounds { offset, width, space } => write!(
                f,
                "member access at offset {offset} (width {width}) outside {space}-byte storage block"
            ),
            MemberError::TypeMismatch { expected, got } => {
                write!(f, "member store expects {expected}, got {got}")
            }
        }
    }
}

macro_rules! read_scalar {
    ($space:expr, $offset:expr, $ty:ty, $variant:ident, $conv:ty) => {{
        let width = std::mem::size_of::<$ty>();
        let bytes = $space.read_bytes($offset, width).ok_or(MemberError::OutOfBounds {
            offset: $offset,
            width,
            space: $space.len(),
        })?;
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        buf.copy_from_slice(bytes);
        ManagedValue::$variant(<$ty>::from_ne_bytes(buf) as $conv)
    }};
}

macro_rules! write_scalar {
    ($space:expr, $offset:expr, $raw:expr, $ty:ty) => {{
        let bytes = ($raw as $ty).to_ne_bytes();
        if !$space.write_bytes($offset, &bytes) {
            return Err(MemberError::OutOfBounds {
                offset: $offset,
                width: bytes.len(),
                space: $space.len(),
            });
        }
        Ok(())
    }};
}

impl MemberKind {
    pub fn width(self) -> usize {
        match self {
            MemberKind::I8 | MemberKind::U8 => 1,
            MemberKind::I16 | MemberKind::U16 => 2,
            MemberKind::I32 | MemberKind::U32 | MemberKind::F32 => 4,
            MemberKind::I64 | MemberKind::U64 | MemberKind::F64 => 8,
        }
    }

    pub fn read<'gc>(
        self,
        space: &NativeSpace,
        offset: usize,
    ) -> Result<ManagedValue<'gc>, MemberError> {
        Ok(match self {
            MemberKind::I8 => read_scalar!(space, offset, i8, Int32, i32),
            MemberKind::I16 => read_scalar!(space, offset, i16, Int32, i32),
            MemberKind::I32 => read_scalar!(space, offset, i32, Int32, i32),
            MemberKind::I64 => read_scalar!(space, offset, i64, Int64, i64),
            MemberKind::U8 => read_scalar!(space, offset, u8, Int32, i32),
            MemberKind::U16 => read_scalar!(space, offset, u16, Int32, i32),
            MemberKind::U32 => read_scalar!(space, offset, u32, Int64, i64),
            MemberKind::U64 => read_scalar!(space, offset, u64, Int64, i64),
            MemberKind::F32 => read_scalar!(space, offset, f32, Float64, f64),
            MemberKind::F64 => read_scalar!(space, offset, f64, Float64, f64),
        })
    }

    pub fn write(
        self,
        space: &mut NativeSpace,
        offset: usize,
        value: &ManagedValue<'_>,
    ) -> Result<(), MemberError> {
        match self {
            MemberKind::F32 | MemberKind::F64 => {
                let raw = value.as_float().ok_or(MemberError::TypeMismatch {
                    expected: "float",
                    got: value.type_name(),
                })?;
                match self {
                    MemberKind::F32 => write_scalar!(space, offset, raw, f32),
                    _ => write_scalar!(space, offset, raw, f64),
                }
            }
            _ => {
                let raw = value.as_int().ok_or(MemberError::TypeMismatch {
                    expected: "int",
                    got: value.type_name(),
                })?;
                match self {
                    MemberKind::I8 => write_scalar!(space, offset, raw, i8),
                    MemberKind::I16 => write_scalar!(space, offset, raw, i16),
                    MemberKind::I32 => write_scalar!(space, offset, raw, i32),
                    MemberKind::I64 => write_scalar!(space, offset, raw, i64),
                    MemberKind::U8 => write_scalar!(space, offset, raw, u8),
                    MemberKind::U16 => write_scalar!(space, offset, raw, u16),
                    MemberKind::U32 => write_scalar!(space, offset, raw, u32),
                    MemberKind::U64 => write_scalar!(space, offset, raw, u64),
                    MemberKind::F32 | MemberKind::F64 => unreachable!(),
                }
            }
        }
    }
}

/// A managed instance: its class, its attribute map, and the optional
/// native-storage block installed by the synthesized constructor.
#[derive(Collect)]
#[collect(no_drop)]
pub struct ManagedObject<'gc> {
    pub class: ClassRef<'gc>,
    pub attributes: HashMap<String, ManagedValue<'gc>>,
    pub native_space: Option<NativeSpace>,
}

#[derive(Clone, Copy, Collect)]
#[collect(no_drop)]
pub struct ObjectRef<'gc>(pub Gc<'gc, RefLock<ManagedObject<'gc>>>);

impl<'gc> ObjectRef<'gc> {
    pub fn new(mc: &Mutation<'gc>, class: ClassRef<'gc>) -> Self {
        ObjectRef(Gc::new(
            mc,
            RefLock::new(ManagedObject {
                class,
                attributes: HashMap::new(),
                native_space: None,
            }),
        ))
    }

    pub fn with<T>(&self, op: impl FnOnce(&ManagedObject<'gc>) -> T) -> T {
        op(&self.0.borrow())
    }

    pub fn with_mut<T>(
        &self,
        mc: &Mutation<'gc>,
        op: impl FnOnce(&mut ManagedObject<'gc>) -> T,
    ) -> T {
        op(&mut self.0.borrow_mut(mc))
    }

    pub fn class(&self) -> ClassRef<'gc> {
        self.0.borrow().class
    }
}
