//! Configuration Module - Header Layout Parameters
//!
//! Manages the process-wide parameters of the object header layer. The
//! configuration is installed once through [`crate::init_with_config`] before
//! the first header is created and never changes afterwards, so readers need
//! no synchronization beyond the one-time publication of the model.

use crate::object::hash::HashStrategy;
use crate::util::constants::{DEFAULT_NARROW_SHIFT, DEFAULT_TYPE_SPACE_SIZE, KB};
use crate::util::Alignment;
use serde::{Deserialize, Serialize};

/// Smallest object alignment; forwarding pointers keep their tag in the
/// low three bits of the target address
pub const MIN_OBJECT_ALIGNMENT: usize = 8;

/// Main configuration for the object header layer
///
/// # Examples
///
/// ```rust
/// use fgc_oop::HeaderConfig;
///
/// // Use default configuration
/// let config = HeaderConfig::default();
///
/// // Full-width type pointers, 16-byte objects
/// let config = HeaderConfig {
///     compressed_type_pointers: false,
///     object_alignment: 16,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// Store type pointers as 32-bit offsets into the type space
    ///
    /// Requires a 64-bit target.
    /// Default: true on 64-bit targets
    pub compressed_type_pointers: bool,

    /// Bytes reserved for type descriptors
    ///
    /// With compression this must fit the narrow range (`4GB << shift`,
    /// less one granule).
    /// Default: 16MB
    pub type_space_size: usize,

    /// Shift applied to narrow type pointers
    ///
    /// Default: 3
    pub type_pointer_shift: u32,

    /// Store reference fields as 32-bit offsets from `heap_base`
    ///
    /// Requires `heap_base`/`heap_size` describing the heap collaborator's
    /// address range.
    /// Default: false
    pub compressed_references: bool,

    /// Lowest heap address (compressed references only)
    pub heap_base: usize,

    /// Heap size in bytes (compressed references only)
    pub heap_size: usize,

    /// Shift applied to narrow references
    ///
    /// Must not exceed log2(`object_alignment`).
    /// Default: 3
    pub reference_shift: u32,

    /// Minimum object alignment in bytes
    ///
    /// Every object size is a multiple of this.
    /// Default: 8
    pub object_alignment: usize,

    /// How fresh identity hashes are generated
    ///
    /// Default: thread-local xor-shift
    pub hash_strategy: HashStrategy,

    /// Cross-check array sizes against the slow path
    ///
    /// Default: on in debug builds
    pub verify_sizes: bool,

    /// Echo structured header events to the console
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        HeaderConfig {
            // Type pointers
            compressed_type_pointers: cfg!(target_pointer_width = "64"),
            type_space_size: DEFAULT_TYPE_SPACE_SIZE,
            type_pointer_shift: DEFAULT_NARROW_SHIFT,

            // References
            compressed_references: false,
            heap_base: 0,
            heap_size: 0,
            reference_shift: DEFAULT_NARROW_SHIFT,

            // Layout
            object_alignment: Alignment::DEFAULT,
            hash_strategy: HashStrategy::default(),

            // Debug
            verify_sizes: cfg!(debug_assertions),
            verbose: false,
        }
    }
}

impl HeaderConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fgc_oop::HeaderConfig;
    ///
    /// let config = HeaderConfig {
    ///     object_alignment: 12, // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Alignment validation
        if !self.object_alignment.is_power_of_two()
            || self.object_alignment < MIN_OBJECT_ALIGNMENT
            || self.object_alignment > 256
        {
            return Err(ConfigError::InvalidAlignment(format!(
                "object_alignment must be a power of two between {} and 256, got {}",
                MIN_OBJECT_ALIGNMENT, self.object_alignment
            )));
        }

        let compressing = self.compressed_type_pointers || self.compressed_references;
        if compressing && cfg!(not(target_pointer_width = "64")) {
            return Err(ConfigError::InvalidCompression(
                "pointer compression requires a 64-bit target".to_string(),
            ));
        }

        // Type space validation
        if self.type_space_size < 4 * KB {
            return Err(ConfigError::InvalidTypeSpace(
                "type_space_size must be at least 4KB".to_string(),
            ));
        }

        if self.compressed_type_pointers {
            if self.type_pointer_shift > 8 {
                return Err(ConfigError::InvalidCompression(
                    "type_pointer_shift must be <= 8".to_string(),
                ));
            }
            if (self.type_space_size as u64) > usable_narrow_range(self.type_pointer_shift) {
                return Err(ConfigError::InvalidTypeSpace(format!(
                    "type_space_size {} exceeds the narrow range for shift {}",
                    self.type_space_size, self.type_pointer_shift
                )));
            }
        }

        // Reference compression validation
        if self.compressed_references {
            if self.heap_base == 0 || self.heap_size == 0 {
                return Err(ConfigError::InvalidHeapRange(
                    "compressed_references requires heap_base and heap_size".to_string(),
                ));
            }
            if !Alignment::is_aligned(self.heap_base, self.object_alignment) {
                return Err(ConfigError::InvalidHeapRange(format!(
                    "heap_base {:#x} is not aligned to {} bytes",
                    self.heap_base, self.object_alignment
                )));
            }
            if self.reference_shift > self.object_alignment.trailing_zeros() {
                return Err(ConfigError::InvalidCompression(format!(
                    "reference_shift {} exceeds log2(object_alignment) {}",
                    self.reference_shift,
                    self.object_alignment.trailing_zeros()
                )));
            }
            if (self.heap_size as u64) > usable_narrow_range(self.reference_shift) {
                return Err(ConfigError::InvalidHeapRange(format!(
                    "heap_size {} exceeds the narrow range for shift {}",
                    self.heap_size, self.reference_shift
                )));
            }
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - FGC_OOP_COMPRESSED_TYPES
    /// - FGC_OOP_COMPRESSED_REFS
    /// - FGC_OOP_HEAP_BASE (hex with `0x` prefix, or decimal)
    /// - FGC_OOP_HEAP_SIZE
    /// - FGC_OOP_OBJECT_ALIGNMENT
    /// - FGC_OOP_HASH (`xorshift`, `random`, `sequential`, `address`)
    /// - FGC_OOP_VERIFY
    /// - FGC_OOP_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FGC_OOP_COMPRESSED_TYPES") {
            config.compressed_type_pointers = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("FGC_OOP_COMPRESSED_REFS") {
            config.compressed_references = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("FGC_OOP_HEAP_BASE") {
            if let Some(base) = parse_address(&val) {
                config.heap_base = base;
            }
        }

        if let Ok(val) = std::env::var("FGC_OOP_HEAP_SIZE") {
            if let Some(size) = parse_address(&val) {
                config.heap_size = size;
            }
        }

        if let Ok(val) = std::env::var("FGC_OOP_OBJECT_ALIGNMENT") {
            if let Ok(alignment) = val.parse::<usize>() {
                config.object_alignment = alignment;
            }
        }

        if let Ok(val) = std::env::var("FGC_OOP_HASH") {
            if let Some(strategy) = HashStrategy::from_name(&val) {
                config.hash_strategy = strategy;
            }
        }

        if let Ok(val) = std::env::var("FGC_OOP_VERIFY") {
            config.verify_sizes = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("FGC_OOP_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        config
    }

    /// Parse configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Minimum object alignment expressed in words
    pub fn object_alignment_words(&self) -> usize {
        self.object_alignment / Alignment::WORD
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid object alignment: {0}")]
    InvalidAlignment(String),

    #[error("Invalid type space: {0}")]
    InvalidTypeSpace(String),

    #[error("Invalid compression setting: {0}")]
    InvalidCompression(String),

    #[error("Invalid heap range: {0}")]
    InvalidHeapRange(String),

    #[error("Unparseable configuration: {0}")]
    Parse(String),
}

// ============================================================================
// HELPERS
// ============================================================================

/// Bytes addressable by a 32-bit narrow value with the given shift
///
/// Narrow 0 is null, so one granule below the region is given up.
fn usable_narrow_range(shift: u32) -> u64 {
    ((1u64 << 32) << shift) - (1u64 << shift)
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

fn parse_address(val: &str) -> Option<usize> {
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse::<usize>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HeaderConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.compressed_references);
        assert_eq!(config.object_alignment, 8);
        assert_eq!(config.object_alignment_words(), 1);
    }

    #[test]
    fn test_invalid_alignment() {
        let config = HeaderConfig {
            object_alignment: 12,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAlignment(_))
        ));
    }

    #[test]
    fn test_alignment_below_forwarding_tag_rejected() {
        for object_alignment in [1, 2, 4] {
            let config = HeaderConfig {
                object_alignment,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidAlignment(_))),
                "alignment {} accepted",
                object_alignment
            );
        }

        let config = HeaderConfig {
            object_alignment: MIN_OBJECT_ALIGNMENT,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compressed_references_need_heap_range() {
        let config = HeaderConfig {
            compressed_references: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeapRange(_))
        ));

        let config = HeaderConfig {
            compressed_references: true,
            heap_base: 0x8000_0000,
            heap_size: 64 * 1024 * 1024,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reference_shift_bounded_by_alignment() {
        let config = HeaderConfig {
            compressed_references: true,
            heap_base: 0x8000_0000,
            heap_size: 1024 * 1024,
            reference_shift: 4,
            object_alignment: 8,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCompression(_))
        ));
    }

    #[test]
    fn test_from_json_partial() {
        let config = HeaderConfig::from_json(
            r#"{ "compressed_type_pointers": false, "object_alignment": 16 }"#,
        )
        .expect("partial JSON should parse");

        assert!(!config.compressed_type_pointers);
        assert_eq!(config.object_alignment, 16);
        assert_eq!(config.type_space_size, DEFAULT_TYPE_SPACE_SIZE);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            HeaderConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x1000"), Some(0x1000));
        assert_eq!(parse_address("4096"), Some(4096));
        assert_eq!(parse_address("zz"), None);
    }
}
