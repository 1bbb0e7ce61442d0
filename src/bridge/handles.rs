//! The handle table: the indirection that lets native code hold on to
//! managed values that may move or be collected.
//!
//! Entries stash values as `DynamicRoot`s in the bridge's root set, so an
//! open handle pins its value for the collector without the table itself
//! being traced. Slots carry a 16-bit generation that is bumped on every
//! close; a recycled slot therefore rejects handles minted for its
//! previous occupant.

use gc_arena::lock::Lock;
use gc_arena::{Collect, DynamicRoot, DynamicRootSet, Gc, Mutation, Rootable};

use crate::value::{ManagedValue, StorageId};

use super::boxing::{self, Wire};
use super::{BridgeError, ErrorKind};

type ValueSlot = Rootable![Gc<'_, Lock<ManagedValue<'_>>>];

#[derive(Collect)]
#[collect(require_static)]
pub struct ValueHandle(DynamicRoot<ValueSlot>);

/// Allocation class of an open handle, deciding when it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Closed explicitly by the native caller (or by the invoke epilogue).
    PerCall,
    /// Lives for the bridge; explicit closes are ignored.
    Global,
    /// Released in bulk when the owning native-storage block is released;
    /// explicit closes are ignored.
    Field(StorageId),
}

struct SlotEntry {
    root: ValueHandle,
    kind: HandleKind,
}

/// Slot 0 is permanently reserved so the null wire word never aliases a
/// live entry.
pub struct HandleTable {
    slots: Vec<Option<SlotEntry>>,
    generations: Vec<u16>,
    free: Vec<u32>,
    live: usize,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            slots: vec![None],
            generations: vec![0],
            free: vec![],
            live: 0,
        }
    }

    /// O(1): pops the free list or appends a slot.
    pub fn allocate<'gc>(
        &mut self,
        mc: &Mutation<'gc>,
        roots: DynamicRootSet<'gc>,
        value: ManagedValue<'gc>,
        kind: HandleKind,
    ) -> u64 {
        let root = ValueHandle(roots.stash(mc, Gc::new(mc, Lock::new(value))));
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(SlotEntry { root, kind });
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(SlotEntry { root, kind }));
                self.generations.push(0);
                index
            }
        };
        self.live += 1;
        boxing::box_handle(index, self.generations[index as usize])
    }

    /// O(1): index plus generation check.
    pub fn dereference<'gc>(
        &self,
        roots: DynamicRootSet<'gc>,
        bits: u64,
    ) -> Result<ManagedValue<'gc>, BridgeError> {
        let entry = self.entry(bits)?;
        Ok(roots.fetch(&entry.root.0).get())
    }

    /// Closes a per-call handle: unroots the value, bumps the slot
    /// generation and recycles the slot. Global and field handles ignore
    /// explicit closes; their lifetime is not the caller's to manage.
    pub fn close(&mut self, bits: u64) -> Result<(), BridgeError> {
        let (index, _) = match boxing::classify(bits) {
            Wire::Null | Wire::Int(_) | Wire::Double(_) => return Ok(()),
            Wire::Handle { index, generation } => {
                self.check(index, generation)?;
                (index, generation)
            }
        };
        match self.slots[index as usize].as_ref().map(|e| e.kind) {
            Some(HandleKind::Global) | Some(HandleKind::Field(_)) => Ok(()),
            Some(HandleKind::PerCall) => {
                self.release(index);
                Ok(())
            }
            None => unreachable!("check() rejects empty slots"),
        }
    }

    /// Bulk release of every field handle owned by one storage block.
    pub fn release_fields_of(&mut self, owner: StorageId) {
        for index in 0..self.slots.len() as u32 {
            let is_owned = matches!(
                self.slots[index as usize],
                Some(SlotEntry { kind: HandleKind::Field(id), .. }) if id == owner
            );
            if is_owned {
                self.release(index);
            }
        }
    }

    /// Bridge teardown: drops every remaining entry, globals included.
    pub fn release_all(&mut self) {
        for index in 1..self.slots.len() as u32 {
            if self.slots[index as usize].is_some() {
                self.release(index);
            }
        }
    }

    /// Open entries of any allocation class. The per-call balance checks
    /// in tests compare this against a baseline.
    pub fn live(&self) -> usize {
        self.live
    }

    fn release(&mut self, index: u32) {
        // dropping the entry unroots the stashed value
        self.slots[index as usize] = None;
        self.generations[index as usize] = self.generations[index as usize].wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
    }

    fn entry(&self, bits: u64) -> Result<&SlotEntry, BridgeError> {
        match boxing::classify(bits) {
            Wire::Handle { index, generation } => {
                self.check(index, generation)?;
                Ok(self.slots[index as usize].as_ref().unwrap_or_else(|| {
                    unreachable!("check() rejects empty slots")
                }))
            }
            other => Err(BridgeError::new(
                ErrorKind::SystemError,
                format!("expected an allocated handle, got {other:?}"),
            )),
        }
    }

    fn check(&self, index: u32, generation: u16) -> Result<(), BridgeError> {
        let stale = || {
            BridgeError::new(
                ErrorKind::StaleHandle,
                format!("handle {index}:{generation} is closed or was never allocated"),
            )
        };
        if index == 0 || index as usize >= self.slots.len() {
            return Err(stale());
        }
        if self.slots[index as usize].is_none() || self.generations[index as usize] != generation {
            return Err(stale());
        }
        Ok(())
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
