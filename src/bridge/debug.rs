//! Debug-mode handle capsules.
//!
//! In debug mode every wire crossing the boundary is replaced by the
//! address of a heap capsule holding the real wire and a closed flag.
//! Native code that uses a handle after closing it, closes it twice, or
//! fabricates one, hits a definite error here instead of whatever a
//! recycled table slot would have produced. The capsule table is swapped
//! in wholesale when the bridge is built; none of this code runs in
//! production mode.

use std::collections::HashMap;

use gc_arena::Collect;

use super::boxing;
use super::{BridgeError, ErrorKind};

struct Capsule {
    wire: u64,
    closed: bool,
}

/// Owns every capsule minted for the bridge. Closed capsules are kept
/// until teardown so a double close is distinguishable from a fabricated
/// pointer.
pub struct DebugHandles {
    capsules: HashMap<u64, *mut Capsule>,
}

gc_arena::unsafe_empty_collect!(DebugHandles);

impl DebugHandles {
    pub fn new() -> Self {
        DebugHandles {
            capsules: HashMap::new(),
        }
    }

    /// Wraps a wire in a fresh capsule. The null wire passes through so
    /// the sentinel convention stays mode-independent.
    pub fn wrap(&mut self, wire: u64) -> u64 {
        if wire == boxing::WIRE_NULL {
            return wire;
        }
        let ptr = Box::into_raw(Box::new(Capsule { wire, closed: false }));
        self.capsules.insert(ptr as u64, ptr);
        ptr as u64
    }

    /// The wire behind a live capsule.
    pub fn unwrap(&self, bits: u64) -> Result<u64, BridgeError> {
        if bits == boxing::WIRE_NULL {
            return Ok(bits);
        }
        match self.capsules.get(&bits) {
            None => Err(BridgeError::new(
                ErrorKind::StaleHandle,
                format!("{bits:#x} is not a handle this bridge issued"),
            )),
            Some(&ptr) => {
                // SAFETY: the box lives until teardown; only this table
                // touches it.
                let capsule = unsafe { &*ptr };
                if capsule.closed {
                    Err(BridgeError::new(
                        ErrorKind::StaleHandle,
                        format!("use of handle {bits:#x} after it was closed"),
                    ))
                } else {
                    Ok(capsule.wire)
                }
            }
        }
    }

    /// Marks the capsule closed and surrenders its wire for the real
    /// close. A second close of the same capsule is an error.
    pub fn close(&mut self, bits: u64) -> Result<u64, BridgeError> {
        let wire = self.unwrap(bits)?;
        if bits != boxing::WIRE_NULL {
            let ptr = self.capsules[&bits];
            unsafe { (*ptr).closed = true };
        }
        Ok(wire)
    }

    pub fn live(&self) -> usize {
        self.capsules
            .values()
            .filter(|&&ptr| !unsafe { &*ptr }.closed)
            .count()
    }
}

impl Default for DebugHandles {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DebugHandles {
    fn drop(&mut self) {
        for (_, ptr) in self.capsules.drain() {
            // SAFETY: each pointer came from Box::into_raw and is dropped
            // exactly once.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}
