//! Forwarding Protocol - relocation pointers in the mark word
//!
//! During one relocating pass an object moves from Intact to Forwarded and
//! stays there until the pass ends. The forwarding pointer replaces the
//! whole mark; the copy carries the original mark.
//!
//! Usage:
//! 1. Read the mark (`expected`), copy the object, restore `expected` on
//!    the copy
//! 2. Claim the original with [`ObjectRef::forward_to_atomic`]
//! 3. The loser drops its copy and uses the winner's
//!
//! Single-threaded passes may use [`ObjectRef::forward_to`] instead.
//! Objects that cannot be moved (promotion failure, in-place compaction
//! marking) are self-forwarded and keep their hash and age.

use crate::fatal;
use crate::object::header::ObjectRef;
use crate::object::mark_word::{Forwardee, MarkWord};
use crate::util::MemOrder;

/// Outcome of a forwarding CAS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardResult {
    /// This thread's pointer is installed
    Installed,
    /// Another thread forwarded the object first
    AlreadyForwarded(ObjectRef),
    /// The mark changed, but not to a forwarding pointer
    Interfered(MarkWord),
}

/// Encode a forwarding pointer, checking it decodes back to `target`
fn forwarding_mark(target: ObjectRef) -> MarkWord {
    let mark = MarkWord::encode_forwarding(target.address());
    crate::assert_context!(
        mark.forwarding_address() == Some(target.address()),
        "forwarding encoding of {:?} is not reversible",
        target
    );
    mark
}

impl ObjectRef {
    pub(crate) fn forwardee_of(self, mark: MarkWord) -> Option<ObjectRef> {
        match mark.forwardee()? {
            Forwardee::InPlace { .. } => Some(self),
            // SAFETY: forwarding pointers name live copies.
            Forwardee::Address(target) => unsafe { ObjectRef::from_address(target) },
        }
    }

    /// Unconditionally forward to `target`
    ///
    /// Only for passes where no other thread touches the object.
    pub fn forward_to(self, target: ObjectRef) {
        self.store_mark(forwarding_mark(target), MemOrder::Plain);
    }

    /// Forward the object to itself, keeping hash and age
    pub fn forward_to_self(self) {
        let mark = self.mark();
        crate::assert_context!(
            mark.is_unlocked(),
            "self-forwarding {:?} requires an unlocked mark, got {:?}",
            self,
            mark
        );
        self.store_mark(mark.self_forwarded(), MemOrder::Plain);
    }

    /// Install a forwarding pointer if the mark is still `expected`
    pub fn cas_forward_to(self, target: ObjectRef, expected: MarkWord, order: MemOrder) -> bool {
        self.cas_mark(forwarding_mark(target), expected, order) == expected
    }

    /// Install a forwarding pointer and report what happened
    pub fn try_forward_to(
        self,
        target: ObjectRef,
        expected: MarkWord,
        order: MemOrder,
    ) -> ForwardResult {
        let observed = self.cas_mark(forwarding_mark(target), expected, order);
        if observed == expected {
            return ForwardResult::Installed;
        }
        match self.forwardee_of(observed) {
            Some(winner) => ForwardResult::AlreadyForwarded(winner),
            None => ForwardResult::Interfered(observed),
        }
    }

    /// Claim the object for `target`
    ///
    /// Returns `None` if this call installed the pointer, or the winning
    /// copy if another thread forwarded the object first. `expected` must be
    /// the mark read before copying; a mark that changed to anything other
    /// than a forwarding pointer is fatal.
    pub fn forward_to_atomic(
        self,
        target: ObjectRef,
        expected: MarkWord,
        order: MemOrder,
    ) -> Option<ObjectRef> {
        match self.try_forward_to(target, expected, order) {
            ForwardResult::Installed => None,
            ForwardResult::AlreadyForwarded(winner) => {
                log::trace!("lost forwarding race for {:?} to {:?}", self, winner);
                Some(winner)
            },
            ForwardResult::Interfered(observed) => fatal!(
                "forwarding {:?}: expected {:?} but found non-forwarded {:?}",
                self,
                expected,
                observed
            ),
        }
    }

    /// The object's new location, from a plain read of the mark
    #[inline]
    pub fn forwardee(self) -> Option<ObjectRef> {
        self.forwardee_of(self.mark())
    }

    /// The object's new location, from an acquire read of the mark
    ///
    /// A non-null result makes the copy's contents visible.
    #[inline]
    pub fn forwardee_acquire(self) -> Option<ObjectRef> {
        self.forwardee_of(self.mark_acquire())
    }

    #[inline]
    pub fn is_forwarded(self) -> bool {
        self.mark_acquire().is_forwarded()
    }

    // === Preserved Marks ===

    /// `mark` must be saved before a forwarding pointer overwrites it
    ///
    /// A pass that forwards in place rebuilds marks from the type's
    /// prototype afterwards. Locked and hashed marks, and marks that differ
    /// from the prototype in more than the age, would lose information.
    /// Age is not preserved.
    pub fn mark_must_be_preserved(self, mark: MarkWord) -> bool {
        if !mark.is_unlocked() || mark.has_hash() {
            return true;
        }
        let prototype = MarkWord::prototype_for(&self.type_ref());
        mark.with_age(0) != prototype.with_age(0)
    }

    /// [`mark_must_be_preserved`](Self::mark_must_be_preserved) for the
    /// current mark
    pub fn must_preserve_mark(self) -> bool {
        self.mark_must_be_preserved(self.mark())
    }

    /// `mark` must be saved before the object is self-forwarded after a
    /// failed promotion
    ///
    /// Self-forwarding keeps the hash and age bits of an unlocked mark, so
    /// only locked marks need saving.
    pub fn mark_must_be_preserved_for_promotion_failure(self, mark: MarkWord) -> bool {
        !mark.is_unlocked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(8))]
    struct Cell([usize; 2]);

    fn object(cell: &mut Cell) -> ObjectRef {
        cell.0[0] = MarkWord::prototype().with_hash(42).raw();
        unsafe { ObjectRef::from_address(cell.0.as_mut_ptr() as usize) }.expect("non-null")
    }

    #[test]
    fn test_forward_to() {
        let (mut a, mut b) = (Cell([0; 2]), Cell([0; 2]));
        let from = object(&mut a);
        let to = object(&mut b);

        assert!(!from.is_forwarded());
        from.forward_to(to);
        assert!(from.is_forwarded());
        assert_eq!(from.forwardee(), Some(to));
        assert_eq!(from.forwardee_acquire(), Some(to));
    }

    #[test]
    fn test_cas_forward_exactly_once() {
        let (mut a, mut b, mut c) = (Cell([0; 2]), Cell([0; 2]), Cell([0; 2]));
        let from = object(&mut a);
        let first = object(&mut b);
        let second = object(&mut c);
        let expected = from.mark();

        assert!(from.cas_forward_to(first, expected, MemOrder::Release));
        assert!(!from.cas_forward_to(second, expected, MemOrder::Release));
        assert_eq!(from.forwardee(), Some(first));
    }

    #[test]
    fn test_forward_to_atomic_reports_winner() {
        let (mut a, mut b, mut c) = (Cell([0; 2]), Cell([0; 2]), Cell([0; 2]));
        let from = object(&mut a);
        let winner = object(&mut b);
        let loser = object(&mut c);
        let expected = from.mark();

        assert_eq!(from.forward_to_atomic(winner, expected, MemOrder::AcqRel), None);
        assert_eq!(
            from.forward_to_atomic(loser, expected, MemOrder::AcqRel),
            Some(winner)
        );
    }

    #[test]
    fn test_try_forward_interfered() {
        let (mut a, mut b) = (Cell([0; 2]), Cell([0; 2]));
        let from = object(&mut a);
        let to = object(&mut b);
        let stale = MarkWord::prototype();

        assert_eq!(
            from.try_forward_to(to, stale, MemOrder::AcqRel),
            ForwardResult::Interfered(from.mark())
        );
        assert!(!from.is_forwarded());
    }

    #[test]
    #[should_panic(expected = "non-forwarded")]
    fn test_forward_to_atomic_stale_mark_is_fatal() {
        let (mut a, mut b) = (Cell([0; 2]), Cell([0; 2]));
        let from = object(&mut a);
        let to = object(&mut b);
        from.forward_to_atomic(to, MarkWord::prototype(), MemOrder::AcqRel);
    }

    #[test]
    fn test_self_forwarding() {
        let mut a = Cell([0; 2]);
        let obj = object(&mut a);

        obj.forward_to_self();
        assert!(obj.is_forwarded());
        assert!(obj.mark().is_self_forwarded());
        assert_eq!(obj.mark().hash(), 42);
        assert_eq!(obj.forwardee(), Some(obj));
    }
}
