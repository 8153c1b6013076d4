//! Type Pointer and Reference Encoding
//!
//! Both the type word of the header and reference fields can be stored
//! either full width or as a 32-bit narrow value:
//!
//! ```text
//! narrow = (addr - base) >> shift      0 = null
//! addr   = base + (narrow << shift)
//! ```
//!
//! `base` sits one granule below the encoded region so that the first
//! address of the region never encodes as null. Mode, base and shift are
//! fixed when the [`ObjectModel`](crate::ObjectModel) is installed.

use crate::error::{HeaderError, Result};
use crate::object::descriptor::TypeRef;
use crate::object::header::ObjectRef;
use crate::util::Alignment;

/// Base-and-shift codec shared by type pointers and references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrowCodec {
    base: usize,
    shift: u32,
}

impl NarrowCodec {
    /// Codec for addresses inside a region starting at `region_base`
    ///
    /// `region_base` must be at least one granule (`1 << shift`) above zero.
    pub fn for_region(region_base: usize, shift: u32) -> Result<Self> {
        let granule = 1usize << shift;
        if region_base < granule || !Alignment::is_aligned(region_base, granule) {
            return Err(HeaderError::AlignmentError {
                address: region_base,
                alignment: granule,
            });
        }
        Ok(Self {
            base: region_base - granule,
            shift,
        })
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    #[inline]
    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Encode, reporting addresses the narrow form cannot represent
    pub fn try_encode(&self, addr: usize) -> Result<u32> {
        if addr == 0 {
            return Ok(0);
        }
        let overflow = HeaderError::NarrowOverflow {
            address: addr,
            base: self.base,
            shift: self.shift,
        };
        if addr <= self.base || !Alignment::is_aligned(addr - self.base, 1 << self.shift) {
            return Err(overflow);
        }
        u32::try_from((addr - self.base) >> self.shift).map_err(|_| overflow)
    }

    /// Encode an address known to lie in the region; fatal otherwise
    #[inline]
    pub fn encode(&self, addr: usize) -> u32 {
        match self.try_encode(addr) {
            Ok(narrow) => narrow,
            Err(err) => crate::fatal!("{}", err),
        }
    }

    #[inline]
    pub fn decode(&self, narrow: u32) -> usize {
        if narrow == 0 {
            0
        } else {
            self.base + ((narrow as usize) << self.shift)
        }
    }
}

/// Type pointer representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePointerCodec {
    /// Full-width descriptor address
    Full,
    /// 32-bit offset into the type space
    Compressed(NarrowCodec),
}

impl TypePointerCodec {
    #[inline]
    pub fn is_compressed(&self) -> bool {
        matches!(self, TypePointerCodec::Compressed(_))
    }

    /// Raw header value for `ty`
    #[inline]
    pub fn encode(&self, ty: TypeRef) -> usize {
        match self {
            TypePointerCodec::Full => ty.address(),
            TypePointerCodec::Compressed(codec) => codec.encode(ty.address()) as usize,
        }
    }

    /// Decode a raw header value that may still be null
    #[inline]
    pub fn decode_nullable(&self, raw: usize) -> Option<TypeRef> {
        let addr = match self {
            TypePointerCodec::Full => raw,
            TypePointerCodec::Compressed(codec) => codec.decode(raw as u32),
        };
        // SAFETY: non-null type words are only ever written from TypeRefs.
        unsafe { TypeRef::from_address(addr) }
    }

    /// Decode the type of a fully initialized object; fatal on null
    #[inline]
    pub fn decode(&self, raw: usize) -> TypeRef {
        match self.decode_nullable(raw) {
            Some(ty) => ty,
            None => crate::fatal!("null type pointer on an initialized object"),
        }
    }
}

/// Reference field representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceCodec {
    Full,
    /// 32-bit offset from the heap base
    Compressed(NarrowCodec),
}

impl ReferenceCodec {
    /// Width of a reference slot in bytes
    #[inline]
    pub fn slot_bytes(&self) -> usize {
        match self {
            ReferenceCodec::Full => Alignment::WORD,
            ReferenceCodec::Compressed(_) => 4,
        }
    }

    #[inline]
    pub fn encode(&self, obj: Option<ObjectRef>) -> usize {
        let addr = obj.map_or(0, ObjectRef::address);
        match self {
            ReferenceCodec::Full => addr,
            ReferenceCodec::Compressed(codec) => codec.encode(addr) as usize,
        }
    }

    #[inline]
    pub fn decode(&self, raw: usize) -> Option<ObjectRef> {
        let addr = match self {
            ReferenceCodec::Full => raw,
            ReferenceCodec::Compressed(codec) => codec.decode(raw as u32),
        };
        // SAFETY: reference slots hold null or object addresses.
        unsafe { ObjectRef::from_address(addr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_narrow_null() {
        let codec = NarrowCodec::for_region(0x1_0000_0000, 3).expect("codec");
        assert_eq!(codec.encode(0), 0);
        assert_eq!(codec.decode(0), 0);
    }

    #[test]
    fn test_region_start_is_not_null() {
        let codec = NarrowCodec::for_region(0x1_0000_0000, 3).expect("codec");
        assert_eq!(codec.encode(0x1_0000_0000), 1);
        assert_eq!(codec.decode(1), 0x1_0000_0000);
    }

    #[test]
    fn test_narrow_round_trip() {
        let base = 0x7f00_0000_0000usize;
        let codec = NarrowCodec::for_region(base, 3).expect("codec");
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let addr = base + (rng.gen_range(0..(1usize << 34)) & !7);
            let narrow = codec.encode(addr);
            assert_ne!(narrow, 0);
            assert_eq!(codec.decode(narrow), addr);
        }
    }

    #[test]
    fn test_try_encode_rejects_out_of_range() {
        let base = 0x1_0000_0000usize;
        let codec = NarrowCodec::for_region(base, 0).expect("codec");

        assert!(codec.try_encode(base - 8).is_err());
        assert!(codec.try_encode(base + (1usize << 32)).is_err());
        assert!(matches!(
            codec.try_encode(base - 1),
            Err(HeaderError::NarrowOverflow { .. })
        ));
    }

    #[test]
    fn test_misaligned_region_rejected() {
        assert!(NarrowCodec::for_region(0, 3).is_err());
        assert!(NarrowCodec::for_region(0x1004, 3).is_err());
    }

    #[test]
    fn test_reference_slot_width() {
        assert_eq!(ReferenceCodec::Full.slot_bytes(), Alignment::WORD);
        let codec = NarrowCodec::for_region(0x1_0000_0000, 3).expect("codec");
        assert_eq!(ReferenceCodec::Compressed(codec).slot_bytes(), 4);
        assert_eq!(ReferenceCodec::Compressed(codec).decode(0), None);
    }
}
