//! Arena - Bump Pointer Object Storage
//!
//! A fixed anonymous mapping carved up by a lock-free bump pointer.
//! Allocation only requires a single CAS on `top`; memory is zeroed by the
//! mapping and again by [`Arena::reset`], so fresh objects start with a null
//! type word.

use crate::error::{HeaderError, Result};
use crate::util::Alignment;
use memmap2::{MmapMut, MmapOptions};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Arena - mmap-backed bump allocator
pub struct Arena {
    mapping: MmapMut,
    base: usize,
    size: usize,
    top: AtomicUsize,
    alignment: usize,
}

impl Arena {
    /// Reserve an arena of at least `size` bytes
    ///
    /// `alignment` is the granularity of every allocation and must be a power
    /// of two no smaller than a word.
    pub fn new(size: usize, alignment: usize) -> Result<Self> {
        if !alignment.is_power_of_two() || alignment < Alignment::WORD {
            return Err(HeaderError::InvalidArgument(format!(
                "alignment ({}) must be a power of two >= {}",
                alignment,
                Alignment::WORD
            )));
        }
        if size == 0 {
            return Err(HeaderError::InvalidArgument(
                "arena size must be positive".to_string(),
            ));
        }

        let size = super::align_to_page(size);
        let mut mapping = MmapOptions::new().len(size).map_anon()?;
        let base = mapping.as_mut_ptr() as usize;

        if !Alignment::is_aligned(base, alignment) {
            return Err(HeaderError::AlignmentError {
                address: base,
                alignment,
            });
        }

        log::debug!("arena reserved: {} bytes at {:#x}", size, base);

        Ok(Self {
            mapping,
            base,
            size,
            top: AtomicUsize::new(base),
            alignment,
        })
    }

    /// Allocate `bytes` of zeroed memory, rounded up to the arena alignment
    pub fn allocate(&self, bytes: usize) -> Result<usize> {
        let aligned = Alignment::align_up(bytes.max(1), self.alignment);
        let end = self.end();
        let mut current = self.top.load(Ordering::Relaxed);

        loop {
            let new_top = match current.checked_add(aligned) {
                Some(top) if top <= end => top,
                _ => {
                    return Err(HeaderError::ArenaExhausted {
                        requested: bytes,
                        available: end.saturating_sub(current),
                    })
                },
            };

            match self.top.compare_exchange_weak(
                current,
                new_top,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop every allocation and zero the used prefix
    ///
    /// Taking `&mut self` guarantees no object in the arena is still in use
    /// through this handle.
    pub fn reset(&mut self) {
        let used = self.used();
        self.mapping[..used].fill(0);
        self.top.store(self.base, Ordering::Release);
    }

    /// Lowest address of the arena
    pub fn base(&self) -> usize {
        self.base
    }

    /// One past the highest address of the arena
    pub fn end(&self) -> usize {
        self.base + self.size
    }

    /// Reserved bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes handed out so far
    pub fn used(&self) -> usize {
        self.top.load(Ordering::Acquire) - self.base
    }

    pub fn remaining(&self) -> usize {
        self.size - self.used()
    }

    /// Check if `addr` lies inside the reserved range
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end()
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &self.size)
            .field("used", &self.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_allocate_is_aligned_and_zeroed() {
        let arena = Arena::new(64 * 1024, 16).expect("arena");

        let a = arena.allocate(24).expect("first");
        let b = arena.allocate(8).expect("second");

        assert_eq!(a, arena.base());
        assert_eq!(b, a + 32);
        assert!(Alignment::is_aligned(b, 16));
        assert_eq!(unsafe { *(a as *const u64) }, 0);
        assert_eq!(arena.used(), 48);
    }

    #[test]
    fn test_exhaustion() {
        let arena = Arena::new(1, 8).expect("arena");
        let size = arena.size();

        arena.allocate(size).expect("fill");
        match arena.allocate(8) {
            Err(HeaderError::ArenaExhausted { available, .. }) => assert_eq!(available, 0),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_zeroes() {
        let mut arena = Arena::new(4096, 8).expect("arena");
        let addr = arena.allocate(8).expect("alloc");
        unsafe { *(addr as *mut u64) = 0xDEAD_BEEF };

        arena.reset();

        assert_eq!(arena.used(), 0);
        let again = arena.allocate(8).expect("alloc");
        assert_eq!(again, addr);
        assert_eq!(unsafe { *(again as *const u64) }, 0);
    }

    #[test]
    fn test_rejects_bad_alignment() {
        assert!(Arena::new(4096, 12).is_err());
        assert!(Arena::new(0, 8).is_err());
    }

    #[test]
    fn test_concurrent_allocation_is_disjoint() {
        let arena = Arc::new(Arena::new(1024 * 1024, 8).expect("arena"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let arena = Arc::clone(&arena);
                std::thread::spawn(move || {
                    (0..256)
                        .map(|_| arena.allocate(32).expect("alloc"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect();
        all.sort_unstable();
        all.dedup();

        assert_eq!(all.len(), 4 * 256);
        assert_eq!(arena.used(), 4 * 256 * 32);
    }
}
