//! The slot catalog: which protocol entries a type spec may fill, the
//! magic names they fan out to, and the calling convention each expects.
//!
//! The numeric ids are the bridge's ABI; extension headers mirror them.

use crate::value::MemberKind;

use super::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    GetBuffer,
    ReleaseBuffer,
    MapAssignSubscript,
    MapLength,
    MapSubscript,
    NumberAdd,
    NumberMultiply,
    NumberSubtract,
    NumberNegative,
    NumberBool,
    SequenceAssignItem,
    SequenceItem,
    SequenceLength,
    Init,
    Iter,
    IterNext,
    New,
    Repr,
    RichCompare,
    Hash,
    Traverse,
    Destroy,
}

impl SlotKind {
    pub fn from_id(id: u32) -> Option<SlotKind> {
        use SlotKind::*;
        Some(match id {
            1 => GetBuffer,
            2 => ReleaseBuffer,
            3 => MapAssignSubscript,
            4 => MapLength,
            5 => MapSubscript,
            7 => NumberAdd,
            10 => NumberMultiply,
            13 => NumberSubtract,
            16 => NumberNegative,
            17 => NumberBool,
            23 => SequenceAssignItem,
            24 => SequenceItem,
            25 => SequenceLength,
            60 => Init,
            62 => Iter,
            63 => IterNext,
            65 => New,
            66 => Repr,
            68 => RichCompare,
            70 => Hash,
            71 => Traverse,
            1000 => Destroy,
            _ => return None,
        })
    }

    pub fn signature(self) -> Signature {
        use SlotKind::*;
        match self {
            GetBuffer => Signature::GetBuffer,
            ReleaseBuffer => Signature::ReleaseBuffer,
            MapAssignSubscript => Signature::ObjObjArg,
            MapLength | SequenceLength => Signature::Len,
            MapSubscript | NumberAdd | NumberMultiply | NumberSubtract => Signature::Binary,
            NumberNegative => Signature::Unary,
            NumberBool => Signature::Inquiry,
            SequenceAssignItem => Signature::SsizeObjArg,
            SequenceItem => Signature::SsizeArg,
            Init => Signature::InitProc,
            Iter => Signature::GetIter,
            IterNext => Signature::IterNext,
            New => Signature::Keywords,
            Repr => Signature::Repr,
            RichCompare => Signature::RichCompare,
            Hash => Signature::Hash,
            Traverse => Signature::Traverse,
            Destroy => Signature::DestroyFunc,
        }
    }

    /// Magic-method names this slot fans out to. Assignment slots fill the
    /// set and delete names from the same pointer; out-of-band slots fill
    /// none.
    pub fn dunder_names(self) -> &'static [&'static str] {
        use SlotKind::*;
        match self {
            MapAssignSubscript | SequenceAssignItem => &["__setitem__", "__delitem__"],
            MapLength | SequenceLength => &["__len__"],
            MapSubscript | SequenceItem => &["__getitem__"],
            NumberAdd => &["__add__"],
            NumberMultiply => &["__mul__"],
            NumberSubtract => &["__sub__"],
            NumberNegative => &["__neg__"],
            NumberBool => &["__bool__"],
            Init => &["__init__"],
            Iter => &["__iter__"],
            IterNext => &["__next__"],
            New => &["__new__"],
            Repr => &["__repr__"],
            Hash => &["__hash__"],
            // rich compare fans out to the six comparison dunders, each
            // with its own opcode; handled by the builder
            RichCompare => &[],
            GetBuffer | ReleaseBuffer | Traverse | Destroy => &[],
        }
    }
}

pub fn member_kind_from_id(id: u32) -> Option<MemberKind> {
    Some(match id {
        0 => MemberKind::I16,
        1 => MemberKind::I32,
        2 => MemberKind::F32,
        3 => MemberKind::F64,
        5 => MemberKind::I8,
        6 => MemberKind::U8,
        7 => MemberKind::U16,
        8 => MemberKind::U32,
        10 => MemberKind::I64,
        11 => MemberKind::U64,
        _ => return None,
    })
}
