//! Object Copying - Evacuation through the Forwarding Protocol
//!
//! Copy Strategy:
//! 1. Snapshot the mark (the `expected` value of the claim)
//! 2. Size the object and allocate space for the copy
//! 3. Copy the body, then give the copy the snapshot mark
//! 4. Claim the original with a forwarding CAS
//! 5. On a lost race, hand the copy back and use the winner's
//!
//! Several collector threads may evacuate the same object; exactly one copy
//! survives. Mutators must not change marks while a pass is running.

use crate::error::{HeaderError, Result};
use crate::logging::{log_event, HeaderEvent};
use crate::object::header::ObjectRef;
use crate::util::{Alignment, MemOrder};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// ObjectCopier - evacuates objects and keeps copy statistics
pub struct ObjectCopier {
    /// Bytes copied by winning evacuations
    bytes_copied: AtomicU64,
    /// Objects copied by winning evacuations
    objects_copied: AtomicU64,
    /// Copies discarded after losing the forwarding race
    races_lost: AtomicUsize,
}

impl ObjectCopier {
    pub fn new() -> Self {
        Self {
            bytes_copied: AtomicU64::new(0),
            objects_copied: AtomicU64::new(0),
            races_lost: AtomicUsize::new(0),
        }
    }

    /// Evacuate `obj`
    ///
    /// `allocate` returns space for the given number of bytes; `undo`
    /// receives the address and size of a copy that lost the race. Returns
    /// the object's surviving location, which is the existing forwardee if
    /// the object was already forwarded.
    pub fn evacuate<A, U>(&self, obj: ObjectRef, allocate: A, undo: U) -> Result<ObjectRef>
    where
        A: FnOnce(usize) -> Result<usize>,
        U: FnOnce(usize, usize),
    {
        let expected = obj.mark_acquire();
        if expected.is_forwarded() {
            return obj
                .forwardee_of(expected)
                .ok_or(HeaderError::InvalidAddress { address: 0 });
        }

        let bytes = obj.size() * Alignment::WORD;
        let destination = allocate(bytes)?;
        // SAFETY: the allocator handed out `bytes` of exclusive memory.
        let copy = unsafe { ObjectRef::from_address(destination) }.ok_or(
            HeaderError::InvalidAddress {
                address: destination,
            },
        )?;

        // The mark is written separately; collector threads may be CASing it.
        let body = Alignment::WORD;
        unsafe {
            std::ptr::copy_nonoverlapping(
                (obj.address() + body) as *const u8,
                (destination + body) as *mut u8,
                bytes - body,
            );
        }
        copy.store_mark(expected, MemOrder::Plain);

        match obj.forward_to_atomic(copy, expected, MemOrder::AcqRel) {
            None => {
                self.bytes_copied.fetch_add(bytes as u64, Ordering::Relaxed);
                self.objects_copied.fetch_add(1, Ordering::Relaxed);
                Ok(copy)
            },
            Some(winner) => {
                undo(destination, bytes);
                self.races_lost.fetch_add(1, Ordering::Relaxed);
                Ok(winner)
            },
        }
    }

    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied.load(Ordering::Relaxed)
    }

    pub fn objects_copied(&self) -> u64 {
        self.objects_copied.load(Ordering::Relaxed)
    }

    pub fn races_lost(&self) -> usize {
        self.races_lost.load(Ordering::Relaxed)
    }

    /// Reset statistics
    pub fn reset(&self) {
        self.bytes_copied.store(0, Ordering::Relaxed);
        self.objects_copied.store(0, Ordering::Relaxed);
        self.races_lost.store(0, Ordering::Relaxed);
    }

    /// Get copy statistics
    pub fn stats(&self) -> CopyStats {
        CopyStats {
            bytes_copied: self.bytes_copied(),
            objects_copied: self.objects_copied(),
            races_lost: self.races_lost() as u64,
        }
    }

    /// Log the current statistics as a header event
    pub fn report(&self) {
        let stats = self.stats();
        log_event(HeaderEvent::CopyStats {
            objects_copied: stats.objects_copied as usize,
            bytes_copied: stats.bytes_copied as usize,
            races_lost: stats.races_lost as usize,
        });
    }
}

impl Default for ObjectCopier {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopyStats {
    pub bytes_copied: u64,
    pub objects_copied: u64,
    pub races_lost: u64,
}
