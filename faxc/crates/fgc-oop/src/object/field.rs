//! Field Access Facade
//!
//! Typed loads and stores at byte offsets into an object, each with an
//! explicit [`MemOrder`]. Every access is an atomic of the field's width, so
//! offsets must be naturally aligned for the type.
//!
//! Reference fields go through the installed reference encoding: full width,
//! or 32-bit offsets from the heap base.

use crate::assert_context;
use crate::model::ObjectModel;
use crate::object::header::ObjectRef;
use crate::object::type_pointer::ReferenceCodec;
use crate::util::{Alignment, AtomicUtils, MemOrder};
use std::sync::atomic::{
    AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicU16, AtomicU32, AtomicU64, AtomicU8,
    AtomicUsize,
};

mod sealed {
    pub trait Sealed {}
}

/// Primitive values that can live in an object field
pub trait FieldValue: Copy + sealed::Sealed {
    /// # Safety
    /// `addr` must be valid and aligned for `Self`.
    unsafe fn load_at(addr: usize, order: MemOrder) -> Self;

    /// # Safety
    /// `addr` must be valid and aligned for `Self`.
    unsafe fn store_at(addr: usize, value: Self, order: MemOrder);
}

macro_rules! impl_field_value {
    ($($ty:ty => $atomic:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl FieldValue for $ty {
                #[inline]
                unsafe fn load_at(addr: usize, order: MemOrder) -> Self {
                    (*(addr as *const $atomic)).load(order.for_load())
                }

                #[inline]
                unsafe fn store_at(addr: usize, value: Self, order: MemOrder) {
                    (*(addr as *const $atomic)).store(value, order.for_store())
                }
            }
        )*
    };
}

impl_field_value! {
    i8 => AtomicI8,
    u8 => AtomicU8,
    i16 => AtomicI16,
    u16 => AtomicU16,
    i32 => AtomicI32,
    u32 => AtomicU32,
    i64 => AtomicI64,
    u64 => AtomicU64,
}

impl sealed::Sealed for bool {}

impl FieldValue for bool {
    #[inline]
    unsafe fn load_at(addr: usize, order: MemOrder) -> Self {
        u8::load_at(addr, order) & 1 != 0
    }

    /// Stored normalized to 0 or 1
    #[inline]
    unsafe fn store_at(addr: usize, value: Self, order: MemOrder) {
        u8::store_at(addr, value as u8, order)
    }
}

impl sealed::Sealed for f32 {}

impl FieldValue for f32 {
    #[inline]
    unsafe fn load_at(addr: usize, order: MemOrder) -> Self {
        f32::from_bits(u32::load_at(addr, order))
    }

    #[inline]
    unsafe fn store_at(addr: usize, value: Self, order: MemOrder) {
        u32::store_at(addr, value.to_bits(), order)
    }
}

impl sealed::Sealed for f64 {}

impl FieldValue for f64 {
    #[inline]
    unsafe fn load_at(addr: usize, order: MemOrder) -> Self {
        f64::from_bits(u64::load_at(addr, order))
    }

    #[inline]
    unsafe fn store_at(addr: usize, value: Self, order: MemOrder) {
        u64::store_at(addr, value.to_bits(), order)
    }
}

impl ObjectRef {
    /// Address of the field at `offset`
    #[inline]
    pub fn field_addr(self, offset: usize) -> usize {
        self.address() + offset
    }

    #[inline]
    fn checked_field<T>(self, offset: usize) -> usize {
        let align = std::mem::size_of::<T>();
        assert_context!(
            Alignment::is_aligned(offset, align),
            "field offset {} is not {}-byte aligned",
            offset,
            align
        );
        self.field_addr(offset)
    }

    /// Load the field at `offset`
    #[inline]
    pub fn read<T: FieldValue>(self, offset: usize, order: MemOrder) -> T {
        let addr = self.checked_field::<T>(offset);
        // SAFETY: offset is aligned and inside the live object.
        unsafe { T::load_at(addr, order) }
    }

    /// Store `value` into the field at `offset`
    #[inline]
    pub fn write<T: FieldValue>(self, offset: usize, value: T, order: MemOrder) {
        let addr = self.checked_field::<T>(offset);
        // SAFETY: offset is aligned and inside the live object.
        unsafe { T::store_at(addr, value, order) }
    }

    /// Load a reference field
    pub fn read_ref(self, offset: usize, order: MemOrder) -> Option<ObjectRef> {
        let codec = ObjectModel::global().reference_codec();
        let raw = match codec {
            ReferenceCodec::Full => {
                let addr = self.checked_field::<usize>(offset);
                // SAFETY: aligned reference slot inside the live object.
                AtomicUtils::load(unsafe { &*(addr as *const AtomicUsize) }, order)
            },
            ReferenceCodec::Compressed(_) => self.read::<u32>(offset, order) as usize,
        };
        codec.decode(raw)
    }

    /// Store a reference field
    pub fn write_ref(self, offset: usize, value: Option<ObjectRef>, order: MemOrder) {
        let codec = ObjectModel::global().reference_codec();
        let raw = codec.encode(value);
        match codec {
            ReferenceCodec::Full => {
                let addr = self.checked_field::<usize>(offset);
                // SAFETY: aligned reference slot inside the live object.
                AtomicUtils::store(unsafe { &*(addr as *const AtomicUsize) }, raw, order)
            },
            ReferenceCodec::Compressed(_) => self.write::<u32>(offset, raw as u32, order),
        }
    }

    /// Array length (arrays only)
    #[inline]
    pub fn array_length(self) -> u32 {
        self.read::<u32>(ObjectModel::global().layout().length_offset(), MemOrder::Plain)
    }

    #[inline]
    pub fn set_array_length(self, length: u32) {
        self.write::<u32>(
            ObjectModel::global().layout().length_offset(),
            length,
            MemOrder::Plain,
        )
    }

    /// Offset of array element `index`
    pub fn element_offset(self, index: usize) -> usize {
        let layout = self.type_ref().layout_helper();
        assert_context!(layout.is_array(), "{:?} is not an array", self);
        layout.array_header_bytes() + (index << layout.log2_element_size())
    }
}
