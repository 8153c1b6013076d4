//! Identity Hash
//!
//! Hashes are materialized lazily the first time they are asked for and
//! then never change, whatever happens to the object afterwards:
//!
//! - unlocked: CAS the hash into the mark word
//! - locked: CAS the hash into the displaced record, leaving the lock alone;
//!   the CAS only succeeds within the lock period the record was read in
//! - self-forwarded: the mark keeps its hash bits, install there
//! - forwarded elsewhere: ask the copy
//!
//! Contended installs back off and re-read; every decision is taken from
//! one snapshot of the mark.

use crate::model::ObjectModel;
use crate::object::header::ObjectRef;
use crate::object::mark_word::{MarkState, MarkWord, NO_HASH};
use crate::util::MemOrder;
use crossbeam::utils::Backoff;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};

/// Source of fresh identity hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashStrategy {
    /// Marsaglia xor-shift with per-thread state
    #[default]
    ThreadLocalXorShift,
    /// `rand` thread RNG
    Random,
    /// Global counter; handy for reproducible tests
    Sequential,
    /// Mixed object address
    AddressBased,
}

impl HashStrategy {
    /// Parse the names accepted by `FGC_OOP_HASH`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "xorshift" | "thread_local_xor_shift" => Some(HashStrategy::ThreadLocalXorShift),
            "random" => Some(HashStrategy::Random),
            "sequential" => Some(HashStrategy::Sequential),
            "address" | "address_based" => Some(HashStrategy::AddressBased),
            _ => None,
        }
    }

    /// Fresh hash value for the object at `addr`
    ///
    /// Masked to the mark word's hash field; never [`NO_HASH`].
    pub fn generate(self, addr: usize) -> u32 {
        let value = match self {
            HashStrategy::ThreadLocalXorShift => next_xorshift(),
            HashStrategy::Random => rand::random::<u32>(),
            HashStrategy::Sequential => SEQUENCE.fetch_add(1, Ordering::Relaxed),
            HashStrategy::AddressBased => {
                let mixed = ((addr as u64) >> 3).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                (mixed >> 32) as u32
            },
        };

        match value & MarkWord::hash_mask() {
            NO_HASH => 0xBAD,
            hash => hash,
        }
    }
}

static SEQUENCE: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static XORSHIFT: Cell<[u32; 4]> = Cell::new(seed());
}

fn seed() -> [u32; 4] {
    let mut state: [u32; 4] = rand::random();
    // All-zero state would only ever produce zeros
    if state == [0; 4] {
        state[3] = 0x1F12_3BB5;
    }
    state
}

fn next_xorshift() -> u32 {
    XORSHIFT.with(|cell| {
        let [x, y, z, w] = cell.get();
        let t = x ^ (x << 11);
        let next = (w ^ (w >> 19)) ^ (t ^ (t >> 8));
        cell.set([y, z, w, next]);
        next
    })
}

impl ObjectRef {
    /// Stable identity hash, installing one if needed
    pub fn identity_hash(self) -> u32 {
        let mark = self.mark_acquire();
        match mark.decode() {
            MarkState::Hashed { hash, .. } => hash,
            MarkState::Forwarded(_) if mark.is_self_forwarded() && mark.has_hash() => mark.hash(),
            _ => match mark.forwarding_address() {
                // SAFETY: a forwarding pointer names the object's live copy.
                Some(target) => match unsafe { ObjectRef::from_address(target) } {
                    Some(copy) => copy.identity_hash(),
                    None => crate::fatal!("null forwardee for {:?}", self),
                },
                None => self.install_hash(mark),
            },
        }
    }

    fn install_hash(self, first: MarkWord) -> u32 {
        let strategy = ObjectModel::global().config().hash_strategy;
        let backoff = Backoff::new();
        let mut mark = first;

        loop {
            if mark.carries_header_bits() {
                if mark.has_hash() {
                    return mark.hash();
                }
                let hash = strategy.generate(self.address());
                let observed = self.cas_mark(mark.with_hash(hash), mark, MemOrder::AcqRel);
                if observed == mark {
                    log::trace!("hash {:#x} installed for {:?}", hash, self);
                    return hash;
                }
            } else if mark.has_displaced_record() {
                if let Some(displaced) = self.displaced_snapshot(mark) {
                    if displaced.mark.has_hash() {
                        return displaced.mark.hash();
                    }
                    let hash = strategy.generate(self.address());
                    if displaced.replace(displaced.mark.with_hash(hash)) {
                        log::trace!("hash {:#x} installed for locked {:?}", hash, self);
                        return hash;
                    }
                }
            } else {
                // Forwarded to another copy since the first read
                return self.identity_hash();
            }

            backoff.snooze();
            mark = self.mark_acquire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_from_name() {
        assert_eq!(
            HashStrategy::from_name("xorshift"),
            Some(HashStrategy::ThreadLocalXorShift)
        );
        assert_eq!(HashStrategy::from_name("RANDOM"), Some(HashStrategy::Random));
        assert_eq!(
            HashStrategy::from_name("address"),
            Some(HashStrategy::AddressBased)
        );
        assert_eq!(HashStrategy::from_name("md5"), None);
    }

    #[test]
    fn test_generated_values_fit_and_are_nonzero() {
        for strategy in [
            HashStrategy::ThreadLocalXorShift,
            HashStrategy::Random,
            HashStrategy::Sequential,
            HashStrategy::AddressBased,
        ] {
            for i in 0..1000usize {
                let hash = strategy.generate(0x1000 + i * 16);
                assert_ne!(hash, NO_HASH);
                assert_eq!(hash & !MarkWord::hash_mask(), 0);
            }
        }
    }

    #[test]
    fn test_xorshift_spreads() {
        let values: HashSet<u32> = (0..1000)
            .map(|_| HashStrategy::ThreadLocalXorShift.generate(0))
            .collect();
        assert!(values.len() > 990);
    }

    #[test]
    fn test_address_based_is_deterministic() {
        let a = HashStrategy::AddressBased.generate(0x7000_1000);
        let b = HashStrategy::AddressBased.generate(0x7000_1000);
        let c = HashStrategy::AddressBased.generate(0x7000_1010);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&HashStrategy::AddressBased).expect("serialize");
        assert_eq!(json, "\"address_based\"");
    }
}
