//! Util Module - Shared Utilities
//!
//! Utilities and helper functions used throughout the header layer.

pub mod alignment;
pub mod atomic;
pub mod debug;

pub use alignment::Alignment;
pub use atomic::{AtomicUtils, MemOrder};
pub use debug::format_address;

/// Constants for the header layer
pub mod constants {
    /// 1 Kilobyte
    pub const KB: usize = 1024;
    /// 1 Megabyte
    pub const MB: usize = 1024 * 1024;

    /// Default type space reservation: 16MB
    pub const DEFAULT_TYPE_SPACE_SIZE: usize = 16 * MB;

    /// Default shift for narrow pointers (8-byte granules)
    pub const DEFAULT_NARROW_SHIFT: u32 = 3;
}
