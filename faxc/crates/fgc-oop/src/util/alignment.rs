//! Alignment Utilities
//!
//! Helper functions for header and object alignment. Every size the oracle
//! returns and every address the forwarding protocol encodes goes through
//! these helpers, so they are `const` and branch-free.

/// Alignment - utility for alignment operations
pub struct Alignment;

impl Alignment {
    /// Align value up to boundary
    ///
    /// `alignment` must be a power of two.
    ///
    /// # Examples
    /// ```
    /// use fgc_oop::util::Alignment;
    /// assert_eq!(Alignment::align_up(100, 8), 104);
    /// assert_eq!(Alignment::align_up(64, 8), 64);
    /// ```
    #[inline]
    pub const fn align_up(value: usize, alignment: usize) -> usize {
        (value + alignment - 1) & !(alignment - 1)
    }

    /// Align value down to boundary
    #[inline]
    pub const fn align_down(value: usize, alignment: usize) -> usize {
        value & !(alignment - 1)
    }

    /// Check if value is aligned
    #[inline]
    pub const fn is_aligned(value: usize, alignment: usize) -> bool {
        value & (alignment - 1) == 0
    }

    /// Get alignment padding needed
    #[inline]
    pub const fn padding(value: usize, alignment: usize) -> usize {
        Self::align_up(value, alignment) - value
    }

    /// Machine word size in bytes (the unit sizes are reported in)
    pub const WORD: usize = std::mem::size_of::<usize>();

    /// log2 of [`Alignment::WORD`]
    pub const LOG_WORD: u32 = Self::WORD.trailing_zeros();

    /// Default minimum object alignment (8 bytes)
    pub const DEFAULT: usize = 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_down() {
        assert_eq!(Alignment::align_up(0, 8), 0);
        assert_eq!(Alignment::align_up(1, 8), 8);
        assert_eq!(Alignment::align_up(17, 16), 32);
        assert_eq!(Alignment::align_down(17, 16), 16);
        assert_eq!(Alignment::padding(20, 8), 4);
    }

    #[test]
    fn test_is_aligned() {
        assert!(Alignment::is_aligned(0x1000, 8));
        assert!(!Alignment::is_aligned(0x1004, 8));
        assert!(Alignment::is_aligned(0x1004, 4));
    }

    #[test]
    fn test_word_constants() {
        assert_eq!(1usize << Alignment::LOG_WORD, Alignment::WORD);
    }
}
