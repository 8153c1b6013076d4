//! Type Space - home of type descriptors
//!
//! One contiguous reservation that descriptors are bump-allocated into.
//! Compressed type pointers are offsets from its base, so it must never
//! move; descriptors are never freed.

use crate::error::{HeaderError, Result};
use crate::object::descriptor::{TypeDescriptor, TypeRef};
use crate::util::Alignment;
use memmap2::{MmapMut, MmapOptions};
use std::sync::atomic::{AtomicUsize, Ordering};

/// TypeSpace - append-only descriptor storage
pub struct TypeSpace {
    // Keeps the reservation alive; descriptors are reached through `base`.
    _mapping: MmapMut,
    base: usize,
    size: usize,
    top: AtomicUsize,
    granule: usize,
    defined: AtomicUsize,
}

impl TypeSpace {
    /// Reserve `size` bytes; every descriptor is aligned to `granule`
    pub fn reserve(size: usize, granule: usize) -> Result<Self> {
        if !granule.is_power_of_two() {
            return Err(HeaderError::InvalidArgument(format!(
                "granule ({}) must be a power of two",
                granule
            )));
        }

        let size = super::align_to_page(size);
        let mut mapping = MmapOptions::new().len(size).map_anon()?;
        let base = mapping.as_mut_ptr() as usize;

        log::debug!("type space reserved: {} bytes at {:#x}", size, base);

        Ok(Self {
            _mapping: mapping,
            base,
            size,
            top: AtomicUsize::new(base),
            granule: granule.max(std::mem::align_of::<TypeDescriptor>()),
            defined: AtomicUsize::new(0),
        })
    }

    /// Move `descriptor` into the space and return its handle
    pub fn define(&self, descriptor: TypeDescriptor) -> Result<TypeRef> {
        let slot = Alignment::align_up(std::mem::size_of::<TypeDescriptor>(), self.granule);
        let end = self.base + self.size;
        let mut current = self.top.load(Ordering::Relaxed);

        let addr = loop {
            let new_top = current + slot;
            if new_top > end {
                return Err(HeaderError::TypeSpaceExhausted {
                    requested: slot,
                    available: end - current,
                });
            }
            match self.top.compare_exchange_weak(
                current,
                new_top,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break current,
                Err(actual) => current = actual,
            }
        };

        // SAFETY: the slot is inside the mapping, aligned for a descriptor
        // and owned exclusively by this call.
        unsafe {
            std::ptr::write(addr as *mut TypeDescriptor, descriptor);
        }
        self.defined.fetch_add(1, Ordering::Relaxed);

        // SAFETY: the mapping lives as long as the space and slots are never reused.
        unsafe { TypeRef::from_address(addr) }.ok_or(HeaderError::InvalidAddress { address: addr })
    }

    /// Lowest address of the space
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn used(&self) -> usize {
        self.top.load(Ordering::Acquire) - self.base
    }

    /// Number of descriptors defined
    pub fn len(&self) -> usize {
        self.defined.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + self.size
    }
}
