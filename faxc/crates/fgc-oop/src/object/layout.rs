//! Layout Helper - compact size summary of a type
//!
//! A signed 32-bit value cached in every type descriptor so the size oracle
//! can size most objects without virtual dispatch:
//!
//! ```text
//! > 0  instance:  [ size in bytes (word aligned)              | slow:1 ]
//! < 0  array:     [ tag:2 | header bytes:8 | element kind:8 | log2 esize:8 ]
//! = 0  neutral:   irregular shape, always sized by the descriptor
//! ```
//!
//! Array tags are `10` (object array) and `11` (primitive array), so every
//! array helper has the sign bit set.

use serde::{Deserialize, Serialize};
use std::fmt;

const SLOW_PATH_BIT: i32 = 1;

const TAG_SHIFT: u32 = 30;
const HEADER_SHIFT: u32 = 16;
const KIND_SHIFT: u32 = 8;
const LOG2_SHIFT: u32 = 0;
const BYTE_MASK: u32 = 0xFF;

const OBJ_ARRAY_TAG: u32 = 0b10;
const PRIM_ARRAY_TAG: u32 = 0b11;

/// Element type of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementKind {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Short = 4,
    Int = 5,
    Float = 6,
    Long = 7,
    Double = 8,
    /// Reference slot; width depends on reference compression
    Object = 9,
}

impl ElementKind {
    /// log2 of the element width in bytes
    ///
    /// `reference_bytes` is the width of a reference slot (4 or 8).
    pub const fn log2_size(self, reference_bytes: usize) -> u32 {
        match self {
            ElementKind::Boolean | ElementKind::Byte => 0,
            ElementKind::Char | ElementKind::Short => 1,
            ElementKind::Int | ElementKind::Float => 2,
            ElementKind::Long | ElementKind::Double => 3,
            ElementKind::Object => reference_bytes.trailing_zeros(),
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => ElementKind::Boolean,
            2 => ElementKind::Byte,
            3 => ElementKind::Char,
            4 => ElementKind::Short,
            5 => ElementKind::Int,
            6 => ElementKind::Float,
            7 => ElementKind::Long,
            8 => ElementKind::Double,
            9 => ElementKind::Object,
            _ => return None,
        })
    }
}

/// Layout helper value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutHelper(i32);

impl LayoutHelper {
    /// Irregular shape
    pub const NEUTRAL: LayoutHelper = LayoutHelper(0);

    /// Fixed-size instance of `size_bytes`
    ///
    /// `size_bytes` must be positive, word aligned and below 2^31.
    pub fn instance(size_bytes: usize, slow_path: bool) -> Self {
        crate::assert_context!(
            size_bytes > 0
                && size_bytes <= i32::MAX as usize
                && size_bytes % crate::util::Alignment::WORD == 0,
            "instance size {} must be positive and word aligned",
            size_bytes
        );
        let flag = if slow_path { SLOW_PATH_BIT } else { 0 };
        LayoutHelper(size_bytes as i32 | flag)
    }

    /// Array of `element` with `header_bytes` before element 0
    pub fn array(element: ElementKind, log2_element_size: u32, header_bytes: usize) -> Self {
        crate::assert_context!(
            header_bytes <= BYTE_MASK as usize && log2_element_size <= 3,
            "array layout out of range: header {} bytes, log2 esize {}",
            header_bytes,
            log2_element_size
        );
        let tag = match element {
            ElementKind::Object => OBJ_ARRAY_TAG,
            _ => PRIM_ARRAY_TAG,
        };
        let raw = (tag << TAG_SHIFT)
            | ((header_bytes as u32) << HEADER_SHIFT)
            | ((element as u32) << KIND_SHIFT)
            | (log2_element_size << LOG2_SHIFT);
        LayoutHelper(raw as i32)
    }

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        LayoutHelper(raw)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn is_instance(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_array(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn is_neutral(self) -> bool {
        self.0 == 0
    }

    /// Instance whose size must come from the descriptor
    #[inline]
    pub const fn needs_slow_path(self) -> bool {
        self.is_instance() && self.0 & SLOW_PATH_BIT != 0
    }

    /// Instance size in bytes (instances only)
    #[inline]
    pub const fn instance_size_bytes(self) -> usize {
        (self.0 & !SLOW_PATH_BIT) as usize
    }

    #[inline]
    const fn array_field(self, shift: u32) -> u32 {
        ((self.0 as u32) >> shift) & BYTE_MASK
    }

    #[inline]
    pub const fn is_obj_array(self) -> bool {
        self.is_array() && (self.0 as u32) >> TAG_SHIFT == OBJ_ARRAY_TAG
    }

    #[inline]
    pub const fn is_primitive_array(self) -> bool {
        self.is_array() && (self.0 as u32) >> TAG_SHIFT == PRIM_ARRAY_TAG
    }

    /// Bytes before element 0 (arrays only)
    #[inline]
    pub const fn array_header_bytes(self) -> usize {
        self.array_field(HEADER_SHIFT) as usize
    }

    /// log2 of the element width (arrays only)
    #[inline]
    pub const fn log2_element_size(self) -> u32 {
        self.array_field(LOG2_SHIFT)
    }

    /// Element kind (arrays only)
    pub fn element_kind(self) -> Option<ElementKind> {
        if self.is_array() {
            ElementKind::from_u8(self.array_field(KIND_SHIFT) as u8)
        } else {
            None
        }
    }
}

impl fmt::Debug for LayoutHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_instance() {
            write!(
                f,
                "LayoutHelper(instance {} bytes{})",
                self.instance_size_bytes(),
                if self.needs_slow_path() { ", slow" } else { "" }
            )
        } else if self.is_array() {
            write!(
                f,
                "LayoutHelper(array {:?}, header {} bytes, log2 esize {})",
                self.element_kind(),
                self.array_header_bytes(),
                self.log2_element_size()
            )
        } else {
            write!(f, "LayoutHelper(neutral)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_helper() {
        let lh = LayoutHelper::instance(40, false);
        assert!(lh.is_instance());
        assert!(!lh.needs_slow_path());
        assert_eq!(lh.instance_size_bytes(), 40);

        let slow = LayoutHelper::instance(40, true);
        assert!(slow.needs_slow_path());
        assert_eq!(slow.instance_size_bytes(), 40);
    }

    #[test]
    fn test_array_helpers_are_negative() {
        let ints = LayoutHelper::array(ElementKind::Int, 2, 16);
        assert!(ints.raw() < 0);
        assert!(ints.is_primitive_array());
        assert!(!ints.is_obj_array());
        assert_eq!(ints.array_header_bytes(), 16);
        assert_eq!(ints.log2_element_size(), 2);
        assert_eq!(ints.element_kind(), Some(ElementKind::Int));

        let objs = LayoutHelper::array(ElementKind::Object, 3, 24);
        assert!(objs.raw() < 0);
        assert!(objs.is_obj_array());
        assert_eq!(objs.array_header_bytes(), 24);
        assert_eq!(objs.log2_element_size(), 3);
    }

    #[test]
    fn test_neutral() {
        assert!(LayoutHelper::NEUTRAL.is_neutral());
        assert!(!LayoutHelper::NEUTRAL.is_array());
        assert!(!LayoutHelper::NEUTRAL.is_instance());
        assert_eq!(LayoutHelper::NEUTRAL.element_kind(), None);
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(ElementKind::Boolean.log2_size(8), 0);
        assert_eq!(ElementKind::Char.log2_size(8), 1);
        assert_eq!(ElementKind::Float.log2_size(8), 2);
        assert_eq!(ElementKind::Double.log2_size(8), 3);
        assert_eq!(ElementKind::Object.log2_size(4), 2);
        assert_eq!(ElementKind::Object.log2_size(8), 3);
    }

    #[test]
    #[should_panic(expected = "word aligned")]
    fn test_instance_rejects_unaligned() {
        LayoutHelper::instance(13, false);
    }
}
