//! Atomic Utilities
//!
//! Memory-ordering vocabulary shared by every header and field accessor.
//!
//! Callers state the strength they need per call with [`MemOrder`]; this
//! module maps it onto `std::sync::atomic::Ordering` for loads, stores and
//! compare-and-swap. All header words are accessed through atomics, so a
//! "plain" access is a relaxed atomic: it is only correct for single-writer
//! or stop-the-world phases.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Ordering strength requested by a header or field access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemOrder {
    /// No ordering beyond atomicity of the access itself.
    #[default]
    Plain,
    /// Later accesses cannot move before this load.
    Acquire,
    /// Earlier accesses cannot move after this store.
    Release,
    /// Acquire on read, release on write (read-modify-write only).
    AcqRel,
    /// Volatile: sequentially consistent.
    SeqCst,
}

impl MemOrder {
    /// Ordering used for a load.
    ///
    /// A release load has no meaning; it is promoted to acquire.
    #[inline]
    pub const fn for_load(self) -> Ordering {
        match self {
            MemOrder::Plain => Ordering::Relaxed,
            MemOrder::Acquire | MemOrder::Release | MemOrder::AcqRel => Ordering::Acquire,
            MemOrder::SeqCst => Ordering::SeqCst,
        }
    }

    /// Ordering used for a store.
    ///
    /// An acquire store has no meaning; it is promoted to release.
    #[inline]
    pub const fn for_store(self) -> Ordering {
        match self {
            MemOrder::Plain => Ordering::Relaxed,
            MemOrder::Acquire | MemOrder::Release | MemOrder::AcqRel => Ordering::Release,
            MemOrder::SeqCst => Ordering::SeqCst,
        }
    }

    /// (success, failure) orderings for a compare-and-swap.
    #[inline]
    pub const fn for_cas(self) -> (Ordering, Ordering) {
        match self {
            MemOrder::Plain => (Ordering::Relaxed, Ordering::Relaxed),
            MemOrder::Acquire => (Ordering::Acquire, Ordering::Acquire),
            MemOrder::Release => (Ordering::Release, Ordering::Relaxed),
            MemOrder::AcqRel => (Ordering::AcqRel, Ordering::Acquire),
            MemOrder::SeqCst => (Ordering::SeqCst, Ordering::SeqCst),
        }
    }
}

/// AtomicUtils - word-level helpers built on [`MemOrder`]
pub struct AtomicUtils;

impl AtomicUtils {
    /// Load a word with the requested strength
    #[inline]
    pub fn load(word: &AtomicUsize, order: MemOrder) -> usize {
        word.load(order.for_load())
    }

    /// Store a word with the requested strength
    #[inline]
    pub fn store(word: &AtomicUsize, value: usize, order: MemOrder) {
        word.store(value, order.for_store())
    }

    /// Load a 32-bit half-word (narrow pointers, type gap, array length)
    #[inline]
    pub fn load_u32(word: &AtomicU32, order: MemOrder) -> u32 {
        word.load(order.for_load())
    }

    #[inline]
    pub fn store_u32(word: &AtomicU32, value: u32, order: MemOrder) {
        word.store(value, order.for_store())
    }

    /// Strong compare-and-swap returning the value observed before the swap.
    ///
    /// The swap succeeded iff the returned value equals `expected`.
    #[inline]
    pub fn cas(word: &AtomicUsize, expected: usize, new: usize, order: MemOrder) -> usize {
        let (success, failure) = order.for_cas();
        match word.compare_exchange(expected, new, success, failure) {
            Ok(previous) => previous,
            Err(actual) => actual,
        }
    }
}
