//! Size Oracle
//!
//! Object size in words, from the layout helper wherever possible:
//!
//! - fixed instance: size straight from the helper
//! - array: `align_up(header + length << log2 esize, min alignment)`
//! - irregular or slow-path instance: the descriptor's [`ObjectSizing`]
//!
//! The result always agrees with the virtual computation. With
//! `verify_sizes` on, array sizes are recomputed through the descriptor and
//! compared; a mismatch is only accepted when the collector's
//! [`CopyRacePolicy`] says the length may be changing under a concurrent
//! copy.
//!
//! [`ObjectSizing`]: crate::object::descriptor::ObjectSizing

use crate::logging::{log_event, HeaderEvent};
use crate::model::ObjectModel;
use crate::object::descriptor::TypeDescriptor;
use crate::object::header::ObjectRef;
use crate::util::Alignment;
use crate::{assert_context, fatal};

/// Collector hook deciding which array size mismatches are benign
///
/// Some collectors publish a copy's length before the elements (or shrink
/// the source while slicing large arrays), so a reader racing with the copy
/// can see a length that does not match the virtual size.
pub trait CopyRacePolicy: Send + Sync {
    /// `obj`'s length may be mutated by a concurrent copy right now
    fn may_mutate_length(&self, obj: ObjectRef) -> bool;
}

/// Default policy: no mismatch is benign
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverTolerate;

impl CopyRacePolicy for NeverTolerate {
    fn may_mutate_length(&self, _obj: ObjectRef) -> bool {
        false
    }
}

impl<F> CopyRacePolicy for F
where
    F: Fn(ObjectRef) -> bool + Send + Sync,
{
    fn may_mutate_length(&self, obj: ObjectRef) -> bool {
        self(obj)
    }
}

impl ObjectRef {
    /// Size in words
    #[inline]
    pub fn size(self) -> usize {
        size_of(self)
    }
}

/// Size of `obj` in words
#[inline]
pub fn size_of(obj: ObjectRef) -> usize {
    let ty = obj.type_ref();
    size_given_type(obj, &ty)
}

/// Size of `obj` in words, with its type already in hand
pub fn size_given_type(obj: ObjectRef, ty: &TypeDescriptor) -> usize {
    let model = ObjectModel::global();
    let alignment = model.config().object_alignment;
    let layout = ty.layout_helper();

    let words = if layout.is_instance() {
        if layout.needs_slow_path() {
            ty.sizing().size_in_words(obj, ty)
        } else {
            layout.instance_size_bytes() >> Alignment::LOG_WORD
        }
    } else if layout.is_array() {
        let length = obj.array_length() as usize;
        let bytes = (length << layout.log2_element_size()) + layout.array_header_bytes();
        let words = Alignment::align_up(bytes, alignment) >> Alignment::LOG_WORD;

        if model.config().verify_sizes {
            verify_array_size(obj, ty, words);
        }
        words
    } else {
        ty.sizing().size_in_words(obj, ty)
    };

    assert_context!(
        words > 0,
        "non-positive size {} for {:?} of type {}",
        words,
        obj,
        ty.name()
    );
    assert_context!(
        Alignment::is_aligned(words * Alignment::WORD, alignment),
        "size {} words of {:?} is not a multiple of the {}-byte alignment",
        words,
        obj,
        alignment
    );

    words
}

fn verify_array_size(obj: ObjectRef, ty: &TypeDescriptor, fast_words: usize) {
    let slow_words = ty.sizing().size_in_words(obj, ty);
    if slow_words == fast_words {
        return;
    }

    if ObjectModel::global().race_policy().may_mutate_length(obj) {
        log::debug!(
            "tolerating size mismatch for {:?}: fast {} vs slow {} words",
            obj,
            fast_words,
            slow_words
        );
        log_event(HeaderEvent::LengthRaceTolerated {
            address: obj.address(),
            fast_words,
            slow_words,
        });
    } else {
        fatal!(
            "size mismatch for {:?} of type {}: fast path {} words, virtual {} words",
            obj,
            ty.name(),
            fast_words,
            slow_words
        );
    }
}
