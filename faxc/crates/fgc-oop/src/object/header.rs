//! Object Header - the fixed prefix of every heap object
//!
//! Object Header Layout (16 bytes on 64-bit):
//! ┌─────────────────────────────────────────┐
//! │         Mark Word (8 bytes)             │  <- AtomicUsize, see mark_word.rs
//! ├────────────────────┬────────────────────┤
//! │ narrow type (4)    │ type gap (4)       │  compressed type pointers
//! ├────────────────────┴────────────────────┤
//! │      full type pointer (8 bytes)        │  otherwise
//! └─────────────────────────────────────────┘
//!
//! Arrays keep their 32-bit length in the type gap when type pointers are
//! compressed and in the word after the header otherwise; element 0 starts
//! at the next 8-byte boundary.
//!
//! [`ObjectRef`] is the non-owning handle every header operation goes
//! through. Forwarding lives in `relocate::forwarding`, identity hashing in
//! `object::hash`, typed field access in `object::field`.

use crate::model::ObjectModel;
use crate::object::descriptor::TypeRef;
use crate::object::mark_word::MarkWord;
use crate::util::{Alignment, AtomicUtils, MemOrder};
use crate::{assert_context, fatal};
use crossbeam::utils::Backoff;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicUsize};

/// Size of the object header in bytes
pub const HEADER_SIZE: usize = 2 * Alignment::WORD;

/// Offset of the mark word
pub const MARK_OFFSET: usize = 0;

/// Offset of the type word
pub const TYPE_OFFSET: usize = Alignment::WORD;

/// Offset of the type gap (compressed type pointers only)
pub const TYPE_GAP_OFFSET: usize = TYPE_OFFSET + 4;

/// Object Header
///
/// Both words are atomics: every access states its ordering through
/// [`MemOrder`], plain accesses are relaxed.
#[repr(C)]
pub struct ObjectHeader {
    mark: AtomicUsize,
    type_word: AtomicUsize,
}

const _: () = assert!(std::mem::size_of::<ObjectHeader>() == HEADER_SIZE);

/// Where the variable parts of the header live under the installed config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLayout {
    compressed_type_pointers: bool,
}

impl HeaderLayout {
    pub const fn new(compressed_type_pointers: bool) -> Self {
        Self {
            compressed_type_pointers,
        }
    }

    #[inline]
    pub const fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    #[inline]
    pub const fn has_type_gap(&self) -> bool {
        self.compressed_type_pointers
    }

    /// Offset of an array's 32-bit length
    #[inline]
    pub const fn length_offset(&self) -> usize {
        if self.compressed_type_pointers {
            TYPE_GAP_OFFSET
        } else {
            HEADER_SIZE
        }
    }

    /// Bytes before array element 0
    #[inline]
    pub const fn array_header_bytes(&self) -> usize {
        Alignment::align_up(self.length_offset() + 4, 8)
    }
}

/// Handle to a heap object
///
/// A plain address: copying it neither owns nor pins the object. Every
/// method requires the object to be live.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(NonNull<ObjectHeader>);

// An ObjectRef is an address; all access goes through atomics.
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    /// Wrap an object address
    ///
    /// # Safety
    /// `addr` must be null or the start of an object (or of memory about to
    /// be stamped as one) that stays valid for every use of the handle.
    #[inline]
    pub unsafe fn from_address(addr: usize) -> Option<ObjectRef> {
        NonNull::new(addr as *mut ObjectHeader).map(ObjectRef)
    }

    #[inline]
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    fn header<'a>(self) -> &'a ObjectHeader {
        // SAFETY: handles only exist for live objects.
        unsafe { self.0.as_ref() }
    }

    /// Atomic view of the memory at `offset`
    ///
    /// # Safety
    /// `offset` must be in bounds and aligned for `T`.
    #[inline]
    pub(crate) unsafe fn slot<'a, T>(self, offset: usize) -> &'a T {
        &*((self.address() + offset) as *const T)
    }

    // === Mark Word Access ===

    /// Load the mark word
    #[inline]
    pub fn load_mark(self, order: MemOrder) -> MarkWord {
        MarkWord::from_raw(AtomicUtils::load(&self.header().mark, order))
    }

    /// Plain load of the mark word
    #[inline]
    pub fn mark(self) -> MarkWord {
        self.load_mark(MemOrder::Plain)
    }

    #[inline]
    pub fn mark_acquire(self) -> MarkWord {
        self.load_mark(MemOrder::Acquire)
    }

    #[inline]
    pub fn store_mark(self, mark: MarkWord, order: MemOrder) {
        AtomicUtils::store(&self.header().mark, mark.raw(), order)
    }

    /// Compare-and-swap the mark word
    ///
    /// Returns the mark observed before the swap; it succeeded iff that
    /// equals `expected`.
    #[inline]
    pub fn cas_mark(self, new: MarkWord, expected: MarkWord, order: MemOrder) -> MarkWord {
        MarkWord::from_raw(AtomicUtils::cas(
            &self.header().mark,
            expected.raw(),
            new.raw(),
            order,
        ))
    }

    /// Reset the mark to the type's prototype
    pub fn init_mark(self) {
        let ty = self.type_ref();
        self.store_mark(MarkWord::prototype_for(&ty), MemOrder::Plain);
    }

    // === Type Pointer Access ===

    fn load_type_raw(self, order: MemOrder) -> usize {
        if ObjectModel::global().type_codec().is_compressed() {
            // SAFETY: the narrow type pointer is the first half of the type word.
            let narrow = unsafe { self.slot::<AtomicU32>(TYPE_OFFSET) };
            narrow.load(order.for_load()) as usize
        } else {
            AtomicUtils::load(&self.header().type_word, order)
        }
    }

    fn store_type_raw(self, raw: usize, order: MemOrder) {
        if ObjectModel::global().type_codec().is_compressed() {
            // SAFETY: the narrow type pointer is the first half of the type word.
            let narrow = unsafe { self.slot::<AtomicU32>(TYPE_OFFSET) };
            narrow.store(raw as u32, order.for_store());
        } else {
            AtomicUtils::store(&self.header().type_word, raw, order)
        }
    }

    /// Type of a fully initialized object; fatal if null
    #[inline]
    pub fn type_ref(self) -> TypeRef {
        ObjectModel::global()
            .type_codec()
            .decode(self.load_type_raw(MemOrder::Plain))
    }

    /// Type, or `None` while the object is still being stamped
    #[inline]
    pub fn type_or_null(self) -> Option<TypeRef> {
        ObjectModel::global()
            .type_codec()
            .decode_nullable(self.load_type_raw(MemOrder::Plain))
    }

    /// Acquire load of the type
    ///
    /// Pairs with [`ObjectRef::release_set_type`]: a non-null result means
    /// every header and field write made before publication is visible.
    #[inline]
    pub fn type_or_null_acquire(self) -> Option<TypeRef> {
        ObjectModel::global()
            .type_codec()
            .decode_nullable(self.load_type_raw(MemOrder::Acquire))
    }

    #[inline]
    pub fn set_type(self, ty: TypeRef) {
        let raw = ObjectModel::global().type_codec().encode(ty);
        self.store_type_raw(raw, MemOrder::Plain);
    }

    /// Publish the type with a release store
    #[inline]
    pub fn release_set_type(self, ty: TypeRef) {
        let raw = ObjectModel::global().type_codec().encode(ty);
        self.store_type_raw(raw, MemOrder::Release);
    }

    fn gap_slot<'a>(self) -> &'a AtomicU32 {
        assert_context!(
            ObjectModel::global().layout().has_type_gap(),
            "type gap only exists with compressed type pointers"
        );
        // SAFETY: with compressed type pointers the second half of the type
        // word is the gap.
        unsafe { self.slot::<AtomicU32>(TYPE_GAP_OFFSET) }
    }

    /// The 32 bits after a narrow type pointer
    pub fn type_gap(self) -> u32 {
        AtomicUtils::load_u32(self.gap_slot(), MemOrder::Plain)
    }

    pub fn set_type_gap(self, value: u32) {
        AtomicUtils::store_u32(self.gap_slot(), value, MemOrder::Plain)
    }

    // === Type Queries ===

    /// Object's type is `ty` or a subtype of it
    pub fn is_a(self, ty: TypeRef) -> bool {
        self.type_ref().is_subtype_of(ty)
    }

    /// `obj` is null or an instance of `ty`
    pub fn is_instance_of_or_null(obj: Option<ObjectRef>, ty: TypeRef) -> bool {
        obj.map_or(true, |obj| obj.is_a(ty))
    }

    pub fn is_instance(self) -> bool {
        self.type_ref().layout_helper().is_instance()
    }

    pub fn is_array(self) -> bool {
        self.type_ref().layout_helper().is_array()
    }

    pub fn is_obj_array(self) -> bool {
        self.type_ref().layout_helper().is_obj_array()
    }

    pub fn is_primitive_array(self) -> bool {
        self.type_ref().layout_helper().is_primitive_array()
    }

    // === Allocation Stamping ===

    fn check_fresh(mem: usize) {
        let alignment = ObjectModel::global().config().object_alignment;
        assert_context!(
            mem != 0 && Alignment::is_aligned(mem, alignment),
            "object memory {:#x} must be non-null and {}-byte aligned",
            mem,
            alignment
        );
    }

    /// Stamp a header for a non-array object at `mem`
    ///
    /// Prototype mark first, type pointer last with a release store, so a
    /// reader that sees the type also sees a well-formed header.
    ///
    /// # Safety
    /// `mem` must be writable, exclusively owned by the caller and at least
    /// the instance size of `ty`.
    pub unsafe fn initialize_instance(mem: usize, ty: TypeRef) -> ObjectRef {
        Self::check_fresh(mem);
        assert_context!(!ty.is_array(), "{} is an array type", ty.name());

        let obj = ObjectRef(NonNull::new_unchecked(mem as *mut ObjectHeader));
        obj.store_mark(MarkWord::prototype_for(&ty), MemOrder::Plain);
        if ObjectModel::global().layout().has_type_gap() {
            obj.set_type_gap(0);
        }
        obj.release_set_type(ty);
        obj
    }

    /// Stamp a header for an array of `length` elements at `mem`
    ///
    /// # Safety
    /// As [`ObjectRef::initialize_instance`], with room for `length`
    /// elements.
    pub unsafe fn initialize_array(mem: usize, ty: TypeRef, length: u32) -> ObjectRef {
        Self::check_fresh(mem);
        assert_context!(ty.is_array(), "{} is not an array type", ty.name());

        let obj = ObjectRef(NonNull::new_unchecked(mem as *mut ObjectHeader));
        obj.store_mark(MarkWord::prototype_for(&ty), MemOrder::Plain);
        obj.set_array_length(length);
        obj.release_set_type(ty);
        obj
    }

    // === Age ===

    /// Generational age, read through the displaced record when locked
    pub fn age(self) -> u8 {
        let backoff = Backoff::new();
        loop {
            let mark = self.mark_acquire();
            if mark.is_forwarded() {
                fatal!("age of forwarded object {:?}", self);
            }
            if !mark.has_displaced_record() {
                return mark.age();
            }
            if let Some(displaced) = self.displaced_snapshot(mark) {
                return displaced.mark.age();
            }
            backoff.snooze();
        }
    }

    /// Age the object by one generation, saturating
    ///
    /// Retries against concurrent hash installs; never clobbers lock state.
    pub fn incr_age(self) {
        let backoff = Backoff::new();
        loop {
            let mark = self.mark_acquire();
            if mark.is_forwarded() {
                fatal!("aging forwarded object {:?}", self);
            }
            if !mark.has_displaced_record() {
                let aged = mark.with_incremented_age();
                if self.cas_mark(aged, mark, MemOrder::AcqRel) == mark {
                    return;
                }
            } else if let Some(displaced) = self.displaced_snapshot(mark) {
                if displaced.replace(displaced.mark.with_incremented_age()) {
                    return;
                }
            }
            backoff.spin();
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.address())
    }
}
