//! Error Module - Header Layer Error Types
//!
//! Header operations themselves never return recoverable errors: a contended
//! CAS is reported as a value, a benign race is tolerated, and corruption is
//! fatal. `HeaderError` therefore only covers bootstrap and setup paths:
//!
//! ## Setup Errors
//! - `Configuration` - Invalid configuration
//! - `AlreadyInitialized` / `NotInitialized` - Object model lifecycle misuse
//!
//! ## Space Errors
//! - `TypeSpaceExhausted` - No room left for another type descriptor
//! - `ArenaExhausted` - Heap arena full
//! - `Reservation` - The OS refused a mapping
//!
//! ## Address Errors
//! - `InvalidAddress` - Null or out-of-range address
//! - `AlignmentError` - Address violates the object alignment
//! - `NarrowOverflow` - Address does not fit the compressed encoding
//!
//! Invariant violations go through [`assert_context!`](crate::assert_context)
//! and [`fatal!`](crate::fatal), which log and then panic.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for header layer setup
///
/// # Examples
///
/// ```rust
/// use fgc_oop::error::HeaderError;
///
/// fn handle_error(err: HeaderError) {
///     match err {
///         HeaderError::TypeSpaceExhausted { requested, available } => {
///             eprintln!("type space full: requested {}, available {}", requested, available);
///         }
///         _ => eprintln!("other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Configuration error
    ///
    /// **When returned:** `HeaderConfig::validate` rejected the configuration
    ///
    /// **Recovery strategy:** Fix the configuration or fall back to defaults
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The object model was already installed for this process
    ///
    /// **When returned:** `init_with_config` called a second time
    ///
    /// **Recovery strategy:** Use `ObjectModel::global()`
    #[error("Object model already initialized")]
    AlreadyInitialized,

    /// The object model has not been installed yet
    ///
    /// **When returned:** Model-dependent call before `init`
    #[error("Object model not initialized")]
    NotInitialized,

    /// Type space exhausted
    ///
    /// **When returned:** Defining a descriptor would overflow the reserved
    /// type space (and, with compression, the narrow encoding range)
    ///
    /// **Recovery strategy:** Reserve a larger type space at startup
    #[error("Type space exhausted: requested {requested} bytes, available {available} bytes")]
    TypeSpaceExhausted { requested: usize, available: usize },

    /// Heap arena exhausted
    #[error("Arena exhausted: requested {requested} bytes, available {available} bytes")]
    ArenaExhausted { requested: usize, available: usize },

    /// Memory reservation failed
    ///
    /// **When returned:** The OS refused the anonymous mapping
    #[error("Memory reservation failed: {0}")]
    Reservation(#[from] std::io::Error),

    /// Invalid address
    ///
    /// **When returned:** Null or out-of-range address handed to a setup call
    #[error("Invalid address: {address:#x}")]
    InvalidAddress { address: usize },

    /// Alignment error
    #[error("Alignment error: address {address:#x} is not aligned to {alignment} bytes")]
    AlignmentError { address: usize, alignment: usize },

    /// Address cannot be represented as a narrow (compressed) value
    #[error("Narrow encoding overflow: address {address:#x} with base {base:#x} and shift {shift}")]
    NarrowOverflow {
        address: usize,
        base: usize,
        shift: u32,
    },

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl HeaderError {
    /// Check if this error is recoverable by retrying with more resources
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HeaderError::TypeSpaceExhausted { .. } | HeaderError::ArenaExhausted { .. }
        )
    }

    /// Check if this error indicates a caller bug rather than an environment problem
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            HeaderError::AlreadyInitialized
                | HeaderError::NotInitialized
                | HeaderError::InvalidAddress { .. }
                | HeaderError::AlignmentError { .. }
                | HeaderError::InvalidArgument(_)
        )
    }
}

/// Result type alias for header layer setup
pub type Result<T> = std::result::Result<T, HeaderError>;

/// Assertion for header invariants
///
/// Logs the violation through `log::error!` and panics. Used for conditions
/// that mean the heap is corrupt or the caller broke a contract; continuing
/// would spread the corruption.
#[macro_export]
macro_rules! assert_context {
    ($cond:expr, $context:expr) => {
        if !$cond {
            $crate::fatal!("assertion `{}` failed: {}", stringify!($cond), $context);
        }
    };
    ($cond:expr, $context:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::fatal!(
                "assertion `{}` failed: {}",
                stringify!($cond),
                format!($context, $($arg)*)
            );
        }
    };
}

/// Report an unrecoverable header invariant violation
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::__log::error!("fatal header invariant violation: {}", message);
        panic!("fatal header invariant violation: {}", message);
    }};
}
