//! Mark Word - the header's mutable metadata word
//!
//! A `MarkWord` is a decoded-free snapshot of the first header word. All
//! queries on it are pure: they never touch memory, so a caller reads the
//! field once (with whatever ordering the call site needs) and may inspect
//! the same snapshot as often as it likes.
//!
//! Bit layout (64-bit; the hash field is 24 bits wide on 32-bit targets):
//! ```text
//! unlocked        [ unused:25 | hash:31 | -:1 | age:4 | 0 | 01 ]
//! self-forwarded  [ unused:25 | hash:31 | -:1 | age:4 | 1 | 11 ]
//! forwarded       [ target address (8-byte aligned)    | 0 | 11 ]
//! stack-locked    [ displaced record address (4-aligned)   | 00 ]
//! monitor         [ monitor address (4-aligned)            | 10 ]
//! ```
//!
//! Every bit pattern decodes to exactly one [`MarkState`]: bits that a state
//! does not use are ignored by decode.

use crate::object::descriptor::TypeDescriptor;
use crate::util::debug::describe_mark;
use std::fmt;

/// Lock tag (low two bits)
pub const LOCK_BITS: u32 = 2;
/// Lock tag plus the self-forwarded bit
pub const TAG_BITS: u32 = 3;
/// First bit of the age field
pub const AGE_SHIFT: u32 = 3;
/// Width of the age field
pub const AGE_BITS: u32 = 4;
/// First bit of the hash field
pub const HASH_SHIFT: u32 = 8;
/// Width of the hash field
#[cfg(target_pointer_width = "64")]
pub const HASH_BITS: u32 = 31;
#[cfg(not(target_pointer_width = "64"))]
pub const HASH_BITS: u32 = 24;

/// Oldest age an object can reach
pub const MAX_AGE: u8 = (1 << AGE_BITS) - 1;

/// Hash value meaning "no hash installed"
pub const NO_HASH: u32 = 0;

const LOCK_MASK: usize = (1 << LOCK_BITS) - 1;
const TAG_MASK: usize = (1 << TAG_BITS) - 1;
const AGE_MASK: usize = (1 << AGE_BITS) - 1;
const AGE_MASK_IN_PLACE: usize = AGE_MASK << AGE_SHIFT;
const HASH_MASK: usize = (1 << HASH_BITS) - 1;
const HASH_MASK_IN_PLACE: usize = HASH_MASK << HASH_SHIFT;

const STACK_LOCKED_VALUE: usize = 0b00;
const UNLOCKED_VALUE: usize = 0b01;
const MONITOR_VALUE: usize = 0b10;
const FORWARDED_VALUE: usize = 0b11;
const SELF_FORWARDED_VALUE: usize = 0b111;

/// Which kind of lock owns the displaced mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Thin lock; the record lives on the owner's stack
    Stack,
    /// Inflated monitor; the record is the monitor itself
    Monitor,
}

/// Where a forwarded object now lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Forwardee {
    /// Relocated to another address
    Address(usize),
    /// Forwarded to itself; hash and age are preserved in the mark
    InPlace { hash: u32, age: u8 },
}

/// Logical state of a mark word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkState {
    /// Unlocked, hash not yet materialized
    Unhashed { age: u8 },
    /// Unlocked with an identity hash
    Hashed { hash: u32, age: u8 },
    /// Locked; the original mark lives in the displaced record
    Locked { record: usize, kind: LockKind },
    /// Forwarded during a relocating pass
    Forwarded(Forwardee),
}

/// Snapshot of an object's mark word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MarkWord(usize);

impl MarkWord {
    /// Wrap raw header bits
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        MarkWord(raw)
    }

    /// Raw header bits
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Unlocked, unhashed, age 0
    #[inline]
    pub const fn prototype() -> Self {
        MarkWord(UNLOCKED_VALUE)
    }

    /// Canonical initial mark for a fresh object of `ty`
    #[inline]
    pub fn prototype_for(ty: &TypeDescriptor) -> Self {
        ty.prototype_mark()
    }

    // === Encoders ===

    /// Encode a locked mark pointing at a displaced record
    ///
    /// `record` must be non-null and 4-byte aligned.
    #[inline]
    pub fn encode_locked(record: usize, kind: LockKind) -> Self {
        crate::assert_context!(
            record != 0 && record & LOCK_MASK == 0,
            "displaced record {:#x} must be non-null and 4-byte aligned",
            record
        );
        let tag = match kind {
            LockKind::Stack => STACK_LOCKED_VALUE,
            LockKind::Monitor => MONITOR_VALUE,
        };
        MarkWord(record | tag)
    }

    /// Encode a forwarding pointer
    ///
    /// `target` must be non-null and 8-byte aligned; the encoding is exactly
    /// reversible through [`MarkWord::forwarding_address`].
    #[inline]
    pub fn encode_forwarding(target: usize) -> Self {
        crate::assert_context!(
            target != 0 && target & TAG_MASK == 0,
            "forwarding target {:#x} must be non-null and 8-byte aligned",
            target
        );
        MarkWord(target | FORWARDED_VALUE)
    }

    /// Self-forwarded form of an unlocked mark, keeping hash and age
    #[inline]
    pub fn self_forwarded(self) -> Self {
        crate::assert_context!(
            self.carries_header_bits(),
            "only an unlocked mark can be self-forwarded, got {:?}",
            self
        );
        MarkWord((self.0 & !TAG_MASK) | SELF_FORWARDED_VALUE)
    }

    /// Undo self-forwarding, keeping hash and age
    #[inline]
    pub fn without_self_forwarding(self) -> Self {
        if self.is_self_forwarded() {
            MarkWord((self.0 & !TAG_MASK) | UNLOCKED_VALUE)
        } else {
            self
        }
    }

    // === Decoding ===

    /// Decode into the logical state
    pub fn decode(self) -> MarkState {
        match self.0 & LOCK_MASK {
            UNLOCKED_VALUE => {
                let hash = self.hash_bits();
                let age = self.age_bits();
                if hash == NO_HASH {
                    MarkState::Unhashed { age }
                } else {
                    MarkState::Hashed { hash, age }
                }
            },
            STACK_LOCKED_VALUE => MarkState::Locked {
                record: self.0 & !LOCK_MASK,
                kind: LockKind::Stack,
            },
            MONITOR_VALUE => MarkState::Locked {
                record: self.0 & !LOCK_MASK,
                kind: LockKind::Monitor,
            },
            _ => MarkState::Forwarded(self.forwardee_unchecked()),
        }
    }

    #[inline]
    fn forwardee_unchecked(self) -> Forwardee {
        if self.0 & TAG_MASK == SELF_FORWARDED_VALUE {
            Forwardee::InPlace {
                hash: self.hash_bits(),
                age: self.age_bits(),
            }
        } else {
            Forwardee::Address(self.0 & !TAG_MASK)
        }
    }

    // === Lock State ===

    #[inline]
    pub const fn is_unlocked(self) -> bool {
        self.0 & LOCK_MASK == UNLOCKED_VALUE
    }

    /// Stack-locked or owned by a monitor
    #[inline]
    pub const fn is_locked(self) -> bool {
        let tag = self.0 & LOCK_MASK;
        tag == STACK_LOCKED_VALUE || tag == MONITOR_VALUE
    }

    /// The original mark lives in an off-object record
    #[inline]
    pub const fn has_displaced_record(self) -> bool {
        self.is_locked()
    }

    #[inline]
    pub fn lock_kind(self) -> Option<LockKind> {
        match self.0 & LOCK_MASK {
            STACK_LOCKED_VALUE => Some(LockKind::Stack),
            MONITOR_VALUE => Some(LockKind::Monitor),
            _ => None,
        }
    }

    /// Address of the displaced record, if locked
    #[inline]
    pub fn displaced_record(self) -> Option<usize> {
        if self.is_locked() {
            Some(self.0 & !LOCK_MASK)
        } else {
            None
        }
    }

    // === Forwarding ===

    #[inline]
    pub const fn is_forwarded(self) -> bool {
        self.0 & LOCK_MASK == FORWARDED_VALUE
    }

    #[inline]
    pub const fn is_self_forwarded(self) -> bool {
        self.0 & TAG_MASK == SELF_FORWARDED_VALUE
    }

    /// Where the object went, if forwarded
    #[inline]
    pub fn forwardee(self) -> Option<Forwardee> {
        if self.is_forwarded() {
            Some(self.forwardee_unchecked())
        } else {
            None
        }
    }

    /// Relocation target, if forwarded to another address
    #[inline]
    pub fn forwarding_address(self) -> Option<usize> {
        match self.forwardee() {
            Some(Forwardee::Address(target)) => Some(target),
            _ => None,
        }
    }

    // === Hash and Age ===

    /// Unlocked or self-forwarded: hash and age live in this word
    #[inline]
    pub const fn carries_header_bits(self) -> bool {
        self.is_unlocked() || self.is_self_forwarded()
    }

    /// An identity hash is present in this word
    #[inline]
    pub fn has_hash(self) -> bool {
        self.carries_header_bits() && self.hash_bits() != NO_HASH
    }

    /// Identity hash, or [`NO_HASH`] if this word carries none
    #[inline]
    pub fn hash(self) -> u32 {
        if self.carries_header_bits() {
            self.hash_bits()
        } else {
            NO_HASH
        }
    }

    /// Age, or 0 if this word does not carry header bits
    #[inline]
    pub fn age(self) -> u8 {
        if self.carries_header_bits() {
            self.age_bits()
        } else {
            0
        }
    }

    /// Copy with `code` installed as the identity hash
    ///
    /// `code` is truncated to [`HASH_BITS`].
    #[inline]
    pub fn with_hash(self, code: u32) -> Self {
        let hash = (code as usize) & HASH_MASK;
        MarkWord((self.0 & !HASH_MASK_IN_PLACE) | (hash << HASH_SHIFT))
    }

    /// Copy with the given age (`age <= MAX_AGE`)
    #[inline]
    pub fn with_age(self, age: u8) -> Self {
        crate::assert_context!(age <= MAX_AGE, "age {} exceeds maximum {}", age, MAX_AGE);
        MarkWord((self.0 & !AGE_MASK_IN_PLACE) | ((age as usize) << AGE_SHIFT))
    }

    /// Copy one generation older; saturates at [`MAX_AGE`]
    #[inline]
    pub fn with_incremented_age(self) -> Self {
        let age = self.age_bits();
        if age < MAX_AGE {
            self.with_age(age + 1)
        } else {
            self
        }
    }

    #[inline]
    const fn hash_bits(self) -> u32 {
        ((self.0 >> HASH_SHIFT) & HASH_MASK) as u32
    }

    #[inline]
    const fn age_bits(self) -> u8 {
        ((self.0 >> AGE_SHIFT) & AGE_MASK) as u8
    }

    /// Mask applied to generated hash values
    #[inline]
    pub const fn hash_mask() -> u32 {
        HASH_MASK as u32
    }
}

impl Default for MarkWord {
    fn default() -> Self {
        Self::prototype()
    }
}

impl fmt::Debug for MarkWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarkWord({:#x}: {})", self.0, describe_mark(*self))
    }
}
