//! Displaced Mark Records
//!
//! Locking moves the object's original mark into a record outside the
//! object and points the mark word at that record. The header layer only
//! needs enough of the lock protocol to keep hash and age consistent:
//!
//! - [`lock_object`] / [`enter_monitor`]: unlocked -> locked
//! - [`unlock_object`]: locked -> original (possibly newly hashed) mark
//!
//! Unlock first empties the record and then restores the mark with a
//! release store. A hash installer CASes into the record, so it either lands
//! before the unlock (and is restored with the mark) or fails and retries
//! against the unlocked mark.
//!
//! Records are reused across objects. The record word carries a lock-period
//! stamp above the displaced mark bits, so an update prepared against one
//! lock period can never land in the next one, even when both displaced
//! marks are bitwise equal.
//!
//! Records are owned by the caller and must stay valid for as long as any
//! thread may observe the locked mark.

use crate::object::header::ObjectRef;
use crate::object::mark_word::{LockKind, MarkWord, HASH_BITS, HASH_SHIFT};
use crate::util::MemOrder;
use crate::{assert_context, fatal};
use std::sync::atomic::{AtomicU64, Ordering};

/// Displaced mark bits sit below the stamp
#[cfg(target_pointer_width = "64")]
const STAMP_SHIFT: u32 = 40;
#[cfg(not(target_pointer_width = "64"))]
const STAMP_SHIFT: u32 = 32;

const MARK_BITS: u64 = (1 << STAMP_SHIFT) - 1;

const _: () = assert!(HASH_SHIFT + HASH_BITS <= STAMP_SHIFT);

/// Off-object home of a displaced mark
///
/// The record word is the first word, so stack records and monitors can
/// share this layout. Empty mark bits mean the record is not holding a
/// displaced mark, either because it is free or because an unlock is
/// taking it.
#[repr(C, align(8))]
#[derive(Debug)]
pub struct DisplacedMarkRecord {
    word: AtomicU64,
}

impl DisplacedMarkRecord {
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// # Safety
    /// `addr` must come from a locked mark whose record is still alive.
    #[inline]
    pub(crate) unsafe fn at<'a>(addr: usize) -> &'a DisplacedMarkRecord {
        &*(addr as *const DisplacedMarkRecord)
    }

    /// Mark bits of a record word; `None` when empty
    #[inline]
    fn mark_of(word: u64) -> Option<MarkWord> {
        match word & MARK_BITS {
            0 => None,
            raw => Some(MarkWord::from_raw(raw as usize)),
        }
    }

    /// Lock periods started through this record, modulo the stamp width
    #[inline]
    pub fn stamp(&self) -> u64 {
        self.word.load(Ordering::Relaxed) >> STAMP_SHIFT
    }

    /// Displaced mark, or `None` while the record is empty
    #[inline]
    pub fn load(&self) -> Option<MarkWord> {
        Self::mark_of(self.word.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn load_word(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    /// Replace the displaced mark if the record still holds `seen`
    ///
    /// `seen` is a whole record word, so the CAS fails once the lock period
    /// it was read in has ended.
    #[inline]
    pub(crate) fn replace(&self, seen: u64, new: MarkWord) -> bool {
        let word = (seen & !MARK_BITS) | new.raw() as u64;
        self.word
            .compare_exchange(seen, word, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Overwrite the displaced mark of the current lock period
    ///
    /// Returns `false` if the record is empty.
    #[inline]
    pub(crate) fn overwrite(&self, new: MarkWord) -> bool {
        self.word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Self::mark_of(word).map(|_| (word & !MARK_BITS) | new.raw() as u64)
            })
            .is_ok()
    }

    /// Start a lock period holding `mark`
    #[inline]
    fn begin(&self, mark: MarkWord) {
        let stamp = (self.stamp().wrapping_add(1)) << STAMP_SHIFT;
        self.word.store(stamp | mark.raw() as u64, Ordering::Relaxed);
    }

    /// Empty the record, keeping the stamp
    #[inline]
    fn take(&self) -> Option<MarkWord> {
        Self::mark_of(self.word.fetch_and(!MARK_BITS, Ordering::AcqRel))
    }
}

impl Default for DisplacedMarkRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A displaced mark read through a locked object's record
#[derive(Debug, Clone, Copy)]
pub(crate) struct DisplacedSnapshot<'a> {
    pub(crate) record: &'a DisplacedMarkRecord,
    pub(crate) word: u64,
    pub(crate) mark: MarkWord,
}

impl DisplacedSnapshot<'_> {
    /// Replace the snapshot's mark if its lock period is still current
    #[inline]
    pub(crate) fn replace(self, new: MarkWord) -> bool {
        self.record.replace(self.word, new)
    }
}

impl ObjectRef {
    /// Read the displaced mark behind `mark`, the object's locked mark
    ///
    /// `None` if the record is empty, or if the object's mark changed after
    /// the record was read (the record may already serve another object).
    pub(crate) fn displaced_snapshot<'a>(self, mark: MarkWord) -> Option<DisplacedSnapshot<'a>> {
        let addr = mark.displaced_record()?;
        // SAFETY: a locked mark points at a live record.
        let record = unsafe { DisplacedMarkRecord::at(addr) };
        let word = record.load_word();
        if self.mark_acquire() != mark {
            return None;
        }
        let displaced = DisplacedMarkRecord::mark_of(word)?;
        Some(DisplacedSnapshot {
            record,
            word,
            mark: displaced,
        })
    }

    /// The mark currently points at a displaced mark record
    #[inline]
    pub fn has_displaced_mark(self) -> bool {
        self.mark_acquire().has_displaced_record()
    }

    /// The original mark of a locked object
    ///
    /// `None` if the object is not locked or its lock is being released.
    pub fn displaced_mark(self) -> Option<MarkWord> {
        self.displaced_snapshot(self.mark_acquire())
            .map(|snapshot| snapshot.mark)
    }

    /// Replace the original mark of a locked object
    ///
    /// For the lock owner, or for a collector while mutators are stopped.
    /// Fatal if the object is not locked or its record is empty.
    pub fn set_displaced_mark(self, displaced: MarkWord) {
        assert_context!(
            displaced.is_unlocked(),
            "displaced mark for {:?} must be unlocked, got {:?}",
            self,
            displaced
        );
        let mark = self.mark_acquire();
        let stored = match mark.displaced_record() {
            // SAFETY: a locked mark points at a live record.
            Some(addr) => unsafe { DisplacedMarkRecord::at(addr) }.overwrite(displaced),
            None => false,
        };
        if !stored {
            fatal!("{:?} has no displaced mark to replace (mark {:?})", self, mark);
        }
    }
}

fn install(obj: ObjectRef, record: &DisplacedMarkRecord, kind: LockKind) -> bool {
    let mark = obj.mark_acquire();
    if !mark.is_unlocked() {
        return false;
    }

    // Unlocked marks always have bit 0 set, so they never look empty.
    record.begin(mark);
    let locked = MarkWord::encode_locked(record.address(), kind);
    if obj.cas_mark(locked, mark, MemOrder::AcqRel) == mark {
        true
    } else {
        record.take();
        false
    }
}

/// Stack-lock an unlocked object
///
/// Returns `false` if the object is not unlocked or the CAS lost a race.
pub fn lock_object(obj: ObjectRef, record: &DisplacedMarkRecord) -> bool {
    install(obj, record, LockKind::Stack)
}

/// Lock an unlocked object through an inflated monitor
pub fn enter_monitor(obj: ObjectRef, monitor: &DisplacedMarkRecord) -> bool {
    install(obj, monitor, LockKind::Monitor)
}

/// Restore the displaced mark held by `record`
pub fn unlock_object(obj: ObjectRef, record: &DisplacedMarkRecord) {
    let mark = obj.mark_acquire();
    assert_context!(
        mark.displaced_record() == Some(record.address()),
        "{:?} is not locked through record {:#x} (mark {:?})",
        obj,
        record.address(),
        mark
    );

    match record.take() {
        Some(displaced) => obj.store_mark(displaced, MemOrder::Release),
        None => fatal!("record {:#x} released twice", record.address()),
    }
}
